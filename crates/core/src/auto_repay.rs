//! Auto-repay: swap another asset into the borrow asset and repay when a
//! position turns CRITICAL.
//!
//! The flow runs strictly in order and never retries:
//!
//! ```text
//! Analyze -> Swap -> Repay -> Refresh
//! ```
//!
//! Repay goes through `repayBorrow`, which settles the signer's own borrow,
//! so only the operator account can be auto-repaid.
//!
//! There is no rollback. A swap that succeeds followed by a repay that fails
//! leaves swapped funds in the operator wallet; the result reports this via
//! [`AutoRepayResult::needs_manual_follow_up`].

use crate::config::StrategyConfig;
use crate::error::RiskError;
use crate::health::RiskEngine;
use crate::strategy::StrategyAction;
use alloy::primitives::{Address, B256};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::sync::Arc;
use tectonic_api::{SwapExecutor, SwapRequest};
use tectonic_chain::LendingOperations;
use tracing::{error, info, instrument, warn};

/// Step at which an auto-repay attempt stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoRepayStep {
    Analyze,
    Swap,
    Repay,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutoRepayResult {
    pub success: bool,
    /// On-chain repay was executed
    pub action_taken: bool,
    pub repay_amount_usd: Option<Decimal>,
    pub swap_tx_hash: Option<B256>,
    pub repay_tx_hash: Option<B256>,
    pub new_health_factor: Option<Decimal>,
    pub failed_step: Option<AutoRepayStep>,
    pub error_message: Option<String>,
}

impl AutoRepayResult {
    fn skipped(reason: &str) -> Self {
        Self {
            success: true,
            action_taken: false,
            repay_amount_usd: None,
            swap_tx_hash: None,
            repay_tx_hash: None,
            new_health_factor: None,
            failed_step: None,
            error_message: Some(format!("No action needed: {reason}")),
        }
    }

    fn failed(step: AutoRepayStep, message: String) -> Self {
        Self {
            success: false,
            failed_step: Some(step),
            error_message: Some(message),
            ..Self::skipped("")
        }
    }

    /// Swapped funds were not used to repay.
    pub fn needs_manual_follow_up(&self) -> bool {
        self.swap_tx_hash.is_some() && self.repay_tx_hash.is_none()
    }
}

/// Runs the auto-repay flow for positions on one market.
#[derive(Debug)]
pub struct AutoRepayer {
    engine: RiskEngine,
    ops: Arc<dyn LendingOperations>,
    strategy: StrategyConfig,
    swap: RwLock<Option<Arc<dyn SwapExecutor>>>,
}

impl AutoRepayer {
    pub fn new(
        engine: RiskEngine,
        ops: Arc<dyn LendingOperations>,
        strategy: StrategyConfig,
    ) -> Result<Self, RiskError> {
        strategy.validate(engine.risk_config())?;
        Ok(Self {
            engine,
            ops,
            strategy,
            swap: RwLock::new(None),
        })
    }

    pub fn with_swap_executor(self, executor: Arc<dyn SwapExecutor>) -> Self {
        self.set_swap_executor(executor);
        self
    }

    /// Register or replace the swap executor.
    pub fn set_swap_executor(&self, executor: Arc<dyn SwapExecutor>) {
        info!(executor = executor.executor_id(), "Swap executor registered");
        *self.swap.write() = Some(executor);
    }

    pub fn engine(&self) -> &RiskEngine {
        &self.engine
    }

    pub fn strategy(&self) -> &StrategyConfig {
        &self.strategy
    }

    /// The signer repays its own borrow, so that is the only account served.
    pub fn can_repay_for(&self, account: Address) -> bool {
        self.ops.operator() == Some(account)
    }

    /// Repay part of the borrow if the position is CRITICAL.
    ///
    /// `source_amount` fixes how much of `source_asset` to sell; `None` lets
    /// the executor buy exactly the repay amount.
    #[instrument(skip(self))]
    pub async fn auto_repay_if_critical(
        &self,
        account: Address,
        source_asset: &str,
        source_amount: Option<Decimal>,
    ) -> AutoRepayResult {
        if !self.can_repay_for(account) {
            warn!(account = %account, operator = ?self.ops.operator(), "Auto-repay refused for non-operator account");
            return AutoRepayResult::failed(
                AutoRepayStep::Analyze,
                format!("Account {account} is not the operator"),
            );
        }

        let (metrics, rec) = match self.engine.recommend(account, &self.strategy).await {
            Ok(r) => r,
            Err(e) => {
                error!(account = %account, error = %e, "Auto-repay analysis failed");
                return AutoRepayResult::failed(AutoRepayStep::Analyze, format!("Analysis failed: {e}"));
            }
        };

        if rec.action != StrategyAction::Repay {
            return AutoRepayResult::skipped(&rec.reason);
        }

        let suggested = rec
            .suggested_amount
            .unwrap_or(metrics.total_borrow_usd * dec!(0.1));
        if suggested <= Decimal::ZERO {
            return AutoRepayResult::failed(
                AutoRepayStep::Analyze,
                format!("Suggested repay amount {suggested} is not positive"),
            );
        }
        info!(
            account = %account,
            hf = %metrics.health_factor,
            suggested_usd = %suggested,
            "Position critical, starting auto-repay"
        );

        // Clone out so the lock is not held across the swap
        let executor = self.swap.read().clone();
        let Some(executor) = executor else {
            warn!(account = %account, "No swap executor configured, auto-repay skipped");
            return AutoRepayResult::failed(
                AutoRepayStep::Swap,
                "Swap executor not configured".to_string(),
            );
        };

        let to_asset = self.engine.market_config().underlying_symbol.clone();
        let request = SwapRequest {
            from_asset: source_asset.to_string(),
            to_asset: to_asset.clone(),
            amount_in: source_amount,
            amount_out_desired: suggested,
            recipient: account,
        };
        let outcome = match executor.swap(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(account = %account, error = %e, "Auto-repay swap failed");
                return AutoRepayResult::failed(AutoRepayStep::Swap, format!("Swap failed: {e}"));
            }
        };
        let swap_tx_hash = Some(outcome.tx_hash());

        let repay_usd = match outcome.amount_out() {
            Some(out) if out < suggested => out,
            _ => suggested,
        };
        info!(
            tx = %outcome.tx_hash(),
            received = ?outcome.amount_out(),
            repay_usd = %repay_usd,
            "Swap {} -> {} complete",
            source_asset,
            to_asset
        );
        if repay_usd <= Decimal::ZERO {
            return AutoRepayResult {
                swap_tx_hash,
                ..AutoRepayResult::failed(
                    AutoRepayStep::Swap,
                    format!("Swap {source_asset} -> {to_asset} returned no output"),
                )
            };
        }

        let repay_result = match self.engine.usd_to_units(repay_usd) {
            Ok(units) => self.ops.repay(units).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        let receipt = match repay_result {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(account = %account, swap_tx = ?swap_tx_hash, error = %e, "Auto-repay repay failed");
                return AutoRepayResult {
                    swap_tx_hash,
                    ..AutoRepayResult::failed(AutoRepayStep::Repay, format!("Repay failed: {e}"))
                };
            }
        };

        let mut result = AutoRepayResult {
            success: true,
            action_taken: true,
            repay_amount_usd: Some(repay_usd),
            swap_tx_hash,
            repay_tx_hash: Some(receipt.transaction_hash),
            new_health_factor: None,
            failed_step: None,
            error_message: None,
        };

        match self.engine.health_metrics(account).await {
            Ok(after) => {
                info!(
                    account = %account,
                    hf_before = %metrics.health_factor,
                    hf_after = %after.health_factor,
                    status = %after.status,
                    "Auto-repay complete"
                );
                result.new_health_factor = Some(after.health_factor);
            }
            Err(e) => {
                warn!(account = %account, error = %e, "Repay confirmed but refresh failed");
                result.failed_step = Some(AutoRepayStep::Refresh);
                result.error_message = Some(format!("Refresh failed: {e}"));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MarketConfig, RiskConfig};
    use crate::testing::{operator, usdc, MockOps, MockSource, MockSwap};
    use alloy::primitives::U256;
    use tectonic_api::SwapOutcome;

    /// 131.25 USDC supplied (105 collateral) against 100 borrowed, HF 1.05.
    fn critical_position() -> Arc<MockSource> {
        Arc::new(
            MockSource::new()
                .with_supplied(U256::from(131_250_000u64))
                .with_borrow(usdc(100)),
        )
    }

    fn repayer(source: Arc<MockSource>, ops: Arc<MockOps>) -> AutoRepayer {
        let engine =
            RiskEngine::new(source, RiskConfig::default(), MarketConfig::default()).unwrap();
        AutoRepayer::new(engine, ops, StrategyConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_no_swap_executor() {
        let source = critical_position();
        let ops = Arc::new(MockOps::new(source.clone()));
        let result = repayer(source, ops.clone())
            .auto_repay_if_critical(operator(), "CRO", None)
            .await;

        assert!(!result.success);
        assert!(!result.action_taken);
        assert_eq!(result.failed_step, Some(AutoRepayStep::Swap));
        assert_eq!(result.error_message.as_deref(), Some("Swap executor not configured"));
        assert!(!ops.called("repay"));
    }

    #[tokio::test]
    async fn test_healthy_position_takes_no_action() {
        let source = Arc::new(MockSource::new().with_supplied(usdc(500)).with_borrow(usdc(100)));
        let ops = Arc::new(MockOps::new(source.clone()));
        let swap = Arc::new(MockSwap::returning(SwapOutcome::Submitted(B256::ZERO)));
        let result = repayer(source, ops.clone())
            .with_swap_executor(swap.clone())
            .auto_repay_if_critical(operator(), "CRO", None)
            .await;

        assert!(result.success);
        assert!(!result.action_taken);
        assert_eq!(
            result.error_message.as_deref(),
            Some("No action needed: Position is healthy")
        );
        assert!(swap.requests().is_empty());
        assert!(ops.calls().is_empty());
    }

    #[tokio::test]
    async fn test_full_flow() {
        let source = critical_position();
        let ops = Arc::new(MockOps::new(source.clone()));
        let swap = Arc::new(MockSwap::returning(SwapOutcome::Submitted(B256::repeat_byte(9))));
        let result = repayer(source.clone(), ops.clone())
            .with_swap_executor(swap.clone())
            .auto_repay_if_critical(operator(), "CRO", None)
            .await;

        assert!(result.success, "{result:?}");
        assert!(result.action_taken);
        // borrow 100 * (1.2 - 1.05) / 5 = 3
        assert_eq!(result.repay_amount_usd, Some(Decimal::from(3)));
        assert_eq!(ops.calls(), vec![("repay", usdc(3))]);
        assert_eq!(source.borrow(), usdc(97));
        assert_eq!(result.swap_tx_hash, Some(B256::repeat_byte(9)));
        assert!(result.new_health_factor.unwrap() > Decimal::new(105, 2));
        assert!(!result.needs_manual_follow_up());

        let request = &swap.requests()[0];
        assert_eq!(request.from_asset, "CRO");
        assert_eq!(request.to_asset, "USDC");
        assert_eq!(request.amount_in, None);
    }

    #[tokio::test]
    async fn test_repay_capped_at_swap_output() {
        let source = critical_position();
        let ops = Arc::new(MockOps::new(source.clone()));
        let swap = Arc::new(MockSwap::returning(SwapOutcome::Filled {
            tx_hash: B256::repeat_byte(1),
            amount_out: Decimal::from(2),
        }));
        let result = repayer(source, ops.clone())
            .with_swap_executor(swap)
            .auto_repay_if_critical(operator(), "CRO", Some(Decimal::from(20)))
            .await;

        assert_eq!(result.repay_amount_usd, Some(Decimal::from(2)));
        assert_eq!(ops.calls(), vec![("repay", usdc(2))]);
    }

    #[tokio::test]
    async fn test_swap_failure_aborts() {
        let source = critical_position();
        let ops = Arc::new(MockOps::new(source.clone()));
        let result = repayer(source, ops.clone())
            .with_swap_executor(Arc::new(MockSwap::failing("no liquidity")))
            .auto_repay_if_critical(operator(), "CRO", None)
            .await;

        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("Swap failed: no liquidity"));
        assert!(!ops.called("repay"));
        assert!(!result.needs_manual_follow_up());
    }

    #[tokio::test]
    async fn test_repay_failure_keeps_swap_hash() {
        let source = critical_position();
        let ops = Arc::new(MockOps::new(source.clone()));
        ops.fail_on("repay");
        let result = repayer(source, ops)
            .with_swap_executor(Arc::new(MockSwap::returning(SwapOutcome::Submitted(
                B256::repeat_byte(5),
            ))))
            .auto_repay_if_critical(operator(), "CRO", None)
            .await;

        assert!(!result.success);
        assert_eq!(result.failed_step, Some(AutoRepayStep::Repay));
        assert_eq!(result.swap_tx_hash, Some(B256::repeat_byte(5)));
        assert!(result.error_message.as_deref().unwrap().starts_with("Repay failed:"));
        assert!(result.needs_manual_follow_up());
    }

    #[tokio::test]
    async fn test_analysis_failure() {
        let source = critical_position();
        source.fail_reads(true);
        let ops = Arc::new(MockOps::new(source.clone()));
        let result = repayer(source, ops)
            .auto_repay_if_critical(operator(), "CRO", None)
            .await;
        assert!(!result.success);
        assert_eq!(result.failed_step, Some(AutoRepayStep::Analyze));
    }

    #[tokio::test]
    async fn test_non_operator_account_refused() {
        let borrower = Address::repeat_byte(0x11);
        let source = Arc::new(
            MockSource::new()
                .held_by(borrower)
                .with_supplied(U256::from(131_250_000u64))
                .with_borrow(usdc(100)),
        );
        let ops = Arc::new(MockOps::new(source.clone()));
        let swap = Arc::new(MockSwap::returning(SwapOutcome::Submitted(B256::ZERO)));
        let repayer = repayer(source.clone(), ops.clone()).with_swap_executor(swap.clone());
        assert!(!repayer.can_repay_for(borrower));
        assert!(repayer.can_repay_for(operator()));

        let result = repayer.auto_repay_if_critical(borrower, "CRO", None).await;
        assert!(!result.success);
        assert!(!result.action_taken);
        assert_eq!(result.failed_step, Some(AutoRepayStep::Analyze));
        assert!(result.error_message.as_deref().unwrap().ends_with("is not the operator"));
        assert!(swap.requests().is_empty());
        assert!(ops.calls().is_empty());
        assert_eq!(source.borrow(), usdc(100));
    }

    #[tokio::test]
    async fn test_swap_recipient_is_repaid_account() {
        let source = critical_position();
        let ops = Arc::new(MockOps::new(source.clone()));
        let swap = Arc::new(MockSwap::returning(SwapOutcome::Submitted(B256::ZERO)));
        repayer(source.clone(), ops)
            .with_swap_executor(swap.clone())
            .auto_repay_if_critical(operator(), "CRO", None)
            .await;
        assert_eq!(swap.requests()[0].recipient, operator());
        assert!(source.queried().iter().all(|a| *a == operator()));
    }

    #[test]
    fn test_target_below_critical_rejected() {
        let source = critical_position();
        let ops = Arc::new(MockOps::new(source.clone()));
        let engine =
            RiskEngine::new(source, RiskConfig::default(), MarketConfig::default()).unwrap();
        let strategy = StrategyConfig {
            target_health_factor: Decimal::new(105, 2),
            ..Default::default()
        };
        let err = AutoRepayer::new(engine, ops, strategy).unwrap_err();
        assert!(matches!(err, RiskError::Config(_)));
    }
}
