//! Guarded lending operations for the operator account.
//!
//! Borrow and withdraw are checked against a fresh snapshot before any
//! transaction is sent. Amounts are in whole underlying units (e.g. USDC).

use crate::error::RiskError;
use crate::health::RiskEngine;
use crate::limits::{evaluate_withdraw, BorrowDecision, BorrowRejection};
use crate::metrics::HealthMetrics;
use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use std::sync::Arc;
use tectonic_chain::units::decimal_to_units;
use tectonic_chain::{ChainError, LendingOperations, TxReceipt, REPAY_ALL};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl From<tectonic_chain::UnitsError> for ServiceError {
    fn from(e: tectonic_chain::UnitsError) -> Self {
        Self::Risk(e.into())
    }
}

/// Result of a guarded operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    Executed {
        receipt: TxReceipt,
        /// `None` when the post-operation refresh failed
        metrics_after: Option<HealthMetrics>,
    },
    Rejected {
        reason: BorrowRejection,
    },
}

impl OperationOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed { .. })
    }

    pub fn receipt(&self) -> Option<&TxReceipt> {
        match self {
            Self::Executed { receipt, .. } => Some(receipt),
            Self::Rejected { .. } => None,
        }
    }
}

/// Supply, borrow, repay and withdraw with risk checks.
#[derive(Debug, Clone)]
pub struct LendingService {
    engine: RiskEngine,
    ops: Arc<dyn LendingOperations>,
}

impl LendingService {
    pub fn new(engine: RiskEngine, ops: Arc<dyn LendingOperations>) -> Self {
        Self { engine, ops }
    }

    pub fn engine(&self) -> &RiskEngine {
        &self.engine
    }

    fn operator(&self, operation: &'static str) -> Result<Address, ServiceError> {
        self.ops
            .operator()
            .ok_or(ServiceError::Chain(ChainError::MissingSigner(operation)))
    }

    fn to_units(&self, amount: Decimal) -> Result<U256, ServiceError> {
        Ok(decimal_to_units(amount, self.engine.market_config().underlying_decimals)?)
    }

    fn to_usd(&self, amount: Decimal) -> Result<Decimal, ServiceError> {
        amount
            .checked_mul(self.engine.market_config().underlying_price_usd)
            .ok_or(ServiceError::Risk(RiskError::Overflow("amount in usd")))
    }

    async fn executed(&self, account: Address, receipt: TxReceipt) -> OperationOutcome {
        let metrics_after = match self.engine.health_metrics(account).await {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(account = %account, error = %e, "Post-operation refresh failed");
                None
            }
        };
        OperationOutcome::Executed {
            receipt,
            metrics_after,
        }
    }

    /// Supply underlying, optionally enabling it as collateral.
    ///
    /// A failed `enterMarkets` is logged; the supply stands.
    #[instrument(skip(self))]
    pub async fn supply(
        &self,
        amount: Decimal,
        use_as_collateral: bool,
    ) -> Result<OperationOutcome, ServiceError> {
        let account = self.operator("supply")?;
        if amount <= Decimal::ZERO {
            return Ok(OperationOutcome::Rejected {
                reason: BorrowRejection::InvalidAmount(amount),
            });
        }

        info!(account = %account, amount = %amount, "Supplying");
        let receipt = self.ops.supply(self.to_units(amount)?).await?;

        if use_as_collateral {
            let market = self.engine.source().market();
            match self.ops.enter_markets(&[market]).await {
                Ok(Some(r)) => info!(tx = %r.transaction_hash, "Market enabled as collateral"),
                Ok(None) => debug!("Market already enabled as collateral"),
                Err(e) => warn!(error = %e, "Could not enable market as collateral"),
            }
        }

        Ok(self.executed(account, receipt).await)
    }

    /// Borrow if the evaluator approves.
    #[instrument(skip(self))]
    pub async fn borrow(&self, amount: Decimal) -> Result<OperationOutcome, ServiceError> {
        let account = self.operator("borrow")?;
        let usd = self.to_usd(amount)?;

        if let BorrowDecision::Rejected(reason) = self.engine.can_borrow_safely(usd, account).await? {
            warn!(account = %account, amount = %amount, reason = %reason, "Borrow rejected");
            return Ok(OperationOutcome::Rejected { reason });
        }

        info!(account = %account, amount = %amount, "Borrowing");
        let receipt = self.ops.borrow(self.to_units(amount)?).await?;
        Ok(self.executed(account, receipt).await)
    }

    /// Repay `amount`, or the whole borrow when `None`.
    #[instrument(skip(self))]
    pub async fn repay(&self, amount: Option<Decimal>) -> Result<OperationOutcome, ServiceError> {
        let account = self.operator("repay")?;
        let units = match amount {
            None => REPAY_ALL,
            Some(a) if a <= Decimal::ZERO => {
                return Ok(OperationOutcome::Rejected {
                    reason: BorrowRejection::InvalidAmount(a),
                })
            }
            Some(a) => self.to_units(a)?,
        };

        info!(account = %account, amount = ?amount, "Repaying");
        let receipt = self.ops.repay(units).await?;
        Ok(self.executed(account, receipt).await)
    }

    /// Withdraw `amount`, or all supplied underlying when `None`, if the
    /// position stays above the critical threshold.
    #[instrument(skip(self))]
    pub async fn withdraw(&self, amount: Option<Decimal>) -> Result<OperationOutcome, ServiceError> {
        let account = self.operator("withdraw")?;
        let metrics = self.engine.health_metrics(account).await?;
        let market = self.engine.market_config();

        let amount = match amount {
            Some(a) => a,
            None => metrics
                .underlying_usd
                .checked_div(market.underlying_price_usd)
                .unwrap_or(Decimal::ZERO),
        };
        if amount <= Decimal::ZERO {
            return Ok(OperationOutcome::Rejected {
                reason: BorrowRejection::InvalidAmount(amount),
            });
        }

        let decision = evaluate_withdraw(
            &metrics,
            self.to_usd(amount)?,
            market.collateral_factor,
            self.engine.risk_config(),
        );
        if let BorrowDecision::Rejected(reason) = decision {
            warn!(account = %account, amount = %amount, reason = %reason, "Withdraw rejected");
            return Ok(OperationOutcome::Rejected { reason });
        }

        info!(account = %account, amount = %amount, "Withdrawing");
        let receipt = self.ops.withdraw(self.to_units(amount)?).await?;
        Ok(self.executed(account, receipt).await)
    }
}
