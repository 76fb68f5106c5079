//! Borrow and withdraw guards.
//!
//! The `evaluate_*` functions are pure and work on a captured snapshot;
//! the `can_*_safely` methods fetch a fresh one first.

use crate::config::RiskConfig;
use crate::error::RiskError;
use crate::health::RiskEngine;
use crate::metrics::{HealthMetrics, RiskStatus};
use alloy::primitives::Address;
use rust_decimal::Decimal;
use std::fmt;
use tracing::{debug, instrument};

/// Why a borrow or withdraw was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BorrowRejection {
    InvalidAmount(Decimal),
    ExceedsSafeLimit {
        requested: Decimal,
        safe_limit: Decimal,
    },
    /// Outstanding debt with no collateral backing it.
    NoCollateral,
    WouldBreachCritical {
        projected: Decimal,
        critical: Decimal,
    },
    PositionAtRisk {
        status: RiskStatus,
    },
    ExceedsSupplied {
        requested: Decimal,
        supplied: Decimal,
    },
}

impl fmt::Display for BorrowRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAmount(amount) => write!(f, "Amount ${amount} is not a valid amount"),
            Self::ExceedsSafeLimit {
                requested,
                safe_limit,
            } => write!(
                f,
                "Borrow amount ${:.2} exceeds safe limit ${:.2}",
                requested, safe_limit
            ),
            Self::NoCollateral => f.write_str("Position has outstanding borrow but no collateral"),
            Self::WouldBreachCritical {
                projected,
                critical,
            } => write!(
                f,
                "Operation would push HF to {:.2} (below critical threshold {})",
                projected, critical
            ),
            Self::PositionAtRisk { status } => write!(
                f,
                "Position status is {status}, borrowing is not recommended"
            ),
            Self::ExceedsSupplied {
                requested,
                supplied,
            } => write!(
                f,
                "Withdraw amount ${:.2} exceeds supplied ${:.2}",
                requested, supplied
            ),
        }
    }
}

/// Outcome of a borrow or withdraw check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BorrowDecision {
    Approved,
    Rejected(BorrowRejection),
}

impl BorrowDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }

    pub fn rejection(&self) -> Option<&BorrowRejection> {
        match self {
            Self::Approved => None,
            Self::Rejected(r) => Some(r),
        }
    }

    pub fn reason(&self) -> String {
        match self {
            Self::Approved => "Borrow is within safe limits".to_string(),
            Self::Rejected(r) => r.to_string(),
        }
    }
}

/// Decide whether borrowing `amount_usd` more is safe.
///
/// Checks short-circuit in order: amount validity, safe limit, projected
/// HF, current status.
pub fn evaluate_borrow(metrics: &HealthMetrics, amount_usd: Decimal, cfg: &RiskConfig) -> BorrowDecision {
    if amount_usd.is_sign_negative() {
        return BorrowDecision::Rejected(BorrowRejection::InvalidAmount(amount_usd));
    }

    if amount_usd > metrics.safe_borrow_limit_usd {
        return BorrowDecision::Rejected(BorrowRejection::ExceedsSafeLimit {
            requested: amount_usd,
            safe_limit: metrics.safe_borrow_limit_usd,
        });
    }

    if metrics.has_debt() {
        if metrics.total_collateral_usd.is_zero() {
            return BorrowDecision::Rejected(BorrowRejection::NoCollateral);
        }
        let projected = metrics
            .total_borrow_usd
            .checked_add(amount_usd)
            .and_then(|debt| metrics.total_collateral_usd.checked_div(debt))
            .unwrap_or(Decimal::ZERO);
        if projected < cfg.critical_threshold {
            return BorrowDecision::Rejected(BorrowRejection::WouldBreachCritical {
                projected,
                critical: cfg.critical_threshold,
            });
        }
    }

    if !metrics.status.allows_new_borrow() {
        return BorrowDecision::Rejected(BorrowRejection::PositionAtRisk {
            status: metrics.status,
        });
    }

    BorrowDecision::Approved
}

/// Decide whether withdrawing `amount_usd` of supplied underlying is safe.
pub fn evaluate_withdraw(
    metrics: &HealthMetrics,
    amount_usd: Decimal,
    collateral_factor: Decimal,
    cfg: &RiskConfig,
) -> BorrowDecision {
    if amount_usd.is_sign_negative() {
        return BorrowDecision::Rejected(BorrowRejection::InvalidAmount(amount_usd));
    }
    if amount_usd > metrics.underlying_usd {
        return BorrowDecision::Rejected(BorrowRejection::ExceedsSupplied {
            requested: amount_usd,
            supplied: metrics.underlying_usd,
        });
    }
    if !metrics.has_debt() {
        return BorrowDecision::Approved;
    }

    let projected = (metrics.underlying_usd - amount_usd)
        .checked_mul(collateral_factor)
        .and_then(|c| c.checked_div(metrics.total_borrow_usd))
        .unwrap_or(Decimal::ZERO);
    if projected < cfg.critical_threshold {
        return BorrowDecision::Rejected(BorrowRejection::WouldBreachCritical {
            projected,
            critical: cfg.critical_threshold,
        });
    }
    BorrowDecision::Approved
}

impl RiskEngine {
    /// Check a prospective borrow against a fresh snapshot.
    #[instrument(skip(self))]
    pub async fn can_borrow_safely(
        &self,
        amount_usd: Decimal,
        account: Address,
    ) -> Result<BorrowDecision, RiskError> {
        let metrics = self.health_metrics(account).await?;
        let decision = evaluate_borrow(&metrics, amount_usd, self.risk_config());
        debug!(account = %account, amount = %amount_usd, reason = %decision.reason(), "Borrow check");
        Ok(decision)
    }

    /// Check a prospective withdraw against a fresh snapshot.
    #[instrument(skip(self))]
    pub async fn can_withdraw_safely(
        &self,
        amount_usd: Decimal,
        account: Address,
    ) -> Result<BorrowDecision, RiskError> {
        let metrics = self.health_metrics(account).await?;
        Ok(evaluate_withdraw(
            &metrics,
            amount_usd,
            self.market_config().collateral_factor,
            self.risk_config(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketConfig;
    use crate::metrics::{health_factor, CollateralPricing};
    use crate::testing::{operator, usdc, MockSource};
    use alloy::primitives::U256;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tectonic_chain::units::WAD;

    fn snapshot(collateral: Decimal, borrow: Decimal, safe: Decimal) -> HealthMetrics {
        let cfg = RiskConfig::default();
        let hf = health_factor(collateral, borrow);
        HealthMetrics {
            account: Address::ZERO,
            health_factor: hf,
            status: RiskStatus::classify(hf, &cfg),
            total_collateral_usd: collateral,
            total_borrow_usd: borrow,
            available_liquidity_usd: safe,
            safe_borrow_limit_usd: safe,
            max_borrow_limit_usd: safe,
            shortfall_usd: Decimal::ZERO,
            underlying_usd: collateral / dec!(0.8),
            collateral_pricing: CollateralPricing::ExchangeRate,
            observed_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_rejects_above_safe_limit() {
        let source = MockSource::new().with_liquidity(WAD * U256::from(1000));
        let engine =
            RiskEngine::new(Arc::new(source), RiskConfig::default(), MarketConfig::default()).unwrap();

        let decision = engine.can_borrow_safely(dec!(760), operator()).await.unwrap();
        assert_eq!(
            decision,
            BorrowDecision::Rejected(BorrowRejection::ExceedsSafeLimit {
                requested: dec!(760),
                safe_limit: dec!(750),
            })
        );
        assert!(decision.reason().contains("750"));

        let ok = engine.can_borrow_safely(dec!(700), operator()).await.unwrap();
        assert!(ok.is_approved());
        assert_eq!(ok.reason(), "Borrow is within safe limits");
    }

    #[test]
    fn test_negative_amount() {
        let m = snapshot(dec!(100), Decimal::ZERO, dec!(50));
        assert!(matches!(
            evaluate_borrow(&m, dec!(-1), &RiskConfig::default()),
            BorrowDecision::Rejected(BorrowRejection::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_projected_hf_breach() {
        // 200 / (150 + 40) = 1.05 < 1.1
        let m = snapshot(dec!(200), dec!(150), dec!(50));
        let decision = evaluate_borrow(&m, dec!(40), &RiskConfig::default());
        match decision {
            BorrowDecision::Rejected(BorrowRejection::WouldBreachCritical { projected, .. }) => {
                assert_eq!(projected.round_dp(2), dec!(1.05));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(evaluate_borrow(&m, dec!(10), &RiskConfig::default()).is_approved());
    }

    #[test]
    fn test_zero_collateral_with_debt() {
        let m = snapshot(Decimal::ZERO, dec!(10), dec!(5));
        assert_eq!(
            evaluate_borrow(&m, dec!(1), &RiskConfig::default()),
            BorrowDecision::Rejected(BorrowRejection::NoCollateral)
        );
    }

    #[test]
    fn test_critical_position_rejects_zero_borrow() {
        let m = snapshot(dec!(105), dec!(100), dec!(5));
        assert_eq!(m.status, RiskStatus::Critical);
        assert!(matches!(
            evaluate_borrow(&m, Decimal::ZERO, &RiskConfig::default()),
            BorrowDecision::Rejected(_)
        ));
    }

    #[test]
    fn test_withdraw_guard() {
        let cfg = RiskConfig::default();
        // 125 underlying, 100 collateral, 50 borrow
        let m = snapshot(dec!(100), dec!(50), dec!(20));
        assert!(evaluate_withdraw(&m, dec!(40), dec!(0.8), &cfg).is_approved());
        // (125 - 60) * 0.8 / 50 = 1.04
        assert!(matches!(
            evaluate_withdraw(&m, dec!(60), dec!(0.8), &cfg),
            BorrowDecision::Rejected(BorrowRejection::WouldBreachCritical { .. })
        ));
        assert!(matches!(
            evaluate_withdraw(&m, dec!(200), dec!(0.8), &cfg),
            BorrowDecision::Rejected(BorrowRejection::ExceedsSupplied { .. })
        ));

        let no_debt = snapshot(dec!(100), Decimal::ZERO, dec!(80));
        assert!(evaluate_withdraw(&no_debt, dec!(125), dec!(0.8), &cfg).is_approved());
    }

    #[tokio::test]
    async fn test_withdraw_via_engine() {
        let source = MockSource::new().with_supplied(usdc(125)).with_borrow(usdc(50));
        let engine =
            RiskEngine::new(Arc::new(source), RiskConfig::default(), MarketConfig::default()).unwrap();
        assert!(engine.can_withdraw_safely(dec!(10), operator()).await.unwrap().is_approved());
        assert!(!engine.can_withdraw_safely(dec!(100), operator()).await.unwrap().is_approved());
    }

    proptest! {
        #[test]
        fn prop_never_approves_at_critical_or_worse(
            collateral in 0u64..10_000,
            borrow in 1u64..10_000,
            safe in 0u64..10_000,
            amount in 0u64..10_000,
        ) {
            let m = snapshot(Decimal::from(collateral), Decimal::from(borrow), Decimal::from(safe));
            let decision = evaluate_borrow(&m, Decimal::from(amount), &RiskConfig::default());
            if m.status >= RiskStatus::Critical {
                prop_assert!(!decision.is_approved());
            }
        }
    }
}
