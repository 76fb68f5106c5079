//! Remediation recommendations.

use crate::config::{RepaySizing, RiskConfig, StrategyConfig};
use crate::error::RiskError;
use crate::health::RiskEngine;
use crate::metrics::{health_factor, HealthMetrics, RiskStatus};
use alloy::primitives::Address;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::instrument;

/// Suggested next step for a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyAction {
    None,
    Repay,
    Withdraw,
    Deposit,
    EmergencyLiquidate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyRecommendation {
    pub action: StrategyAction,
    /// 0 (nothing to do) to 5 (act now)
    pub priority: u8,
    pub reason: String,
    /// USD
    pub suggested_amount: Option<Decimal>,
    pub estimated_hf_after: Option<Decimal>,
}

impl StrategyRecommendation {
    fn new(action: StrategyAction, priority: u8, reason: impl Into<String>) -> Self {
        Self {
            action,
            priority,
            reason: reason.into(),
            suggested_amount: None,
            estimated_hf_after: None,
        }
    }

    fn with_hf_after(mut self, hf: Decimal) -> Self {
        self.estimated_hf_after = Some(hf);
        self
    }
}

/// Recommend an action for a captured snapshot.
pub fn recommend_from(
    metrics: &HealthMetrics,
    strategy: &StrategyConfig,
    risk: &RiskConfig,
) -> StrategyRecommendation {
    if !metrics.has_position() {
        return StrategyRecommendation::new(StrategyAction::None, 0, "No active position");
    }

    let hf = metrics.health_factor;
    match metrics.status {
        RiskStatus::Liquidatable => StrategyRecommendation::new(
            StrategyAction::EmergencyLiquidate,
            5,
            "Health factor < 1.0; position can be liquidated at any moment",
        )
        .with_hf_after(hf),
        RiskStatus::Critical => {
            let repay = repay_amount(metrics, strategy);
            let remaining = (metrics.total_borrow_usd - repay).max(Decimal::ZERO);
            let mut rec = StrategyRecommendation::new(
                StrategyAction::Repay,
                4,
                format!(
                    "Health factor < {}; recommend immediate repayment",
                    risk.critical_threshold
                ),
            )
            .with_hf_after(health_factor(metrics.total_collateral_usd, remaining));
            rec.suggested_amount = Some(repay);
            rec
        }
        RiskStatus::Warning => StrategyRecommendation::new(
            StrategyAction::None,
            2,
            format!(
                "Health factor between {} and {}; monitor closely",
                risk.critical_threshold, risk.warning_threshold
            ),
        )
        .with_hf_after(hf),
        RiskStatus::Healthy => {
            StrategyRecommendation::new(StrategyAction::None, 0, "Position is healthy").with_hf_after(hf)
        }
    }
}

/// USD to repay so the position moves back towards the target HF.
///
/// `Heuristic` repays `borrow * (target - hf) / 5`, a rough rule of thumb
/// that undershoots for low collateral factors. `Exact` solves
/// `collateral / (borrow - repay) = target`. Both are floored at
/// `min_repay_usd` and capped at the outstanding borrow.
pub fn repay_amount(metrics: &HealthMetrics, strategy: &StrategyConfig) -> Decimal {
    let borrow = metrics.total_borrow_usd;
    let target = strategy.target_health_factor;
    if borrow.is_zero() || metrics.health_factor >= target {
        return Decimal::ZERO;
    }

    let raw = match strategy.repay_sizing {
        RepaySizing::Heuristic => {
            let gap = target - metrics.health_factor;
            borrow * (gap / dec!(5))
        }
        RepaySizing::Exact => {
            let supported = metrics
                .total_collateral_usd
                .checked_div(target)
                .unwrap_or(Decimal::ZERO);
            borrow - supported
        }
    };

    raw.max(strategy.min_repay_usd).min(borrow)
}

impl RiskEngine {
    /// Fetch a snapshot and recommend an action for it.
    #[instrument(skip(self, strategy))]
    pub async fn recommend(
        &self,
        account: Address,
        strategy: &StrategyConfig,
    ) -> Result<(HealthMetrics, StrategyRecommendation), RiskError> {
        let metrics = self.health_metrics(account).await?;
        let rec = recommend_from(&metrics, strategy, self.risk_config());
        Ok((metrics, rec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::CollateralPricing;

    fn snapshot(collateral: Decimal, borrow: Decimal) -> HealthMetrics {
        let hf = health_factor(collateral, borrow);
        HealthMetrics {
            account: Address::ZERO,
            health_factor: hf,
            status: RiskStatus::classify(hf, &RiskConfig::default()),
            total_collateral_usd: collateral,
            total_borrow_usd: borrow,
            available_liquidity_usd: Decimal::ZERO,
            safe_borrow_limit_usd: Decimal::ZERO,
            max_borrow_limit_usd: Decimal::ZERO,
            shortfall_usd: Decimal::ZERO,
            underlying_usd: collateral,
            collateral_pricing: CollateralPricing::ExchangeRate,
            observed_at: chrono::Utc::now(),
        }
    }

    fn recommend(collateral: Decimal, borrow: Decimal) -> StrategyRecommendation {
        recommend_from(
            &snapshot(collateral, borrow),
            &StrategyConfig::default(),
            &RiskConfig::default(),
        )
    }

    #[test]
    fn test_no_position() {
        let rec = recommend(Decimal::ZERO, Decimal::ZERO);
        assert_eq!(rec.action, StrategyAction::None);
        assert_eq!(rec.priority, 0);
        assert_eq!(rec.reason, "No active position");
    }

    #[test]
    fn test_liquidatable() {
        let rec = recommend(dec!(50), dec!(60));
        assert_eq!(rec.action, StrategyAction::EmergencyLiquidate);
        assert_eq!(rec.priority, 5);
    }

    #[test]
    fn test_critical_heuristic_repay() {
        // hf = 1.05, gap 0.15, repay = 100 * 0.03 = 3
        let rec = recommend(dec!(105), dec!(100));
        assert_eq!(rec.action, StrategyAction::Repay);
        assert_eq!(rec.priority, 4);
        assert_eq!(rec.reason, "Health factor < 1.1; recommend immediate repayment");
        assert_eq!(rec.suggested_amount, Some(dec!(3)));
        assert!(rec.estimated_hf_after.unwrap() > dec!(1.05));
    }

    #[test]
    fn test_heuristic_floor() {
        // hf = 1.09, repay = 10 * 0.022 = 0.22, floored to 1
        let rec = recommend(dec!(10.9), dec!(10));
        assert_eq!(rec.suggested_amount, Some(Decimal::ONE));
    }

    #[test]
    fn test_exact_repay_reaches_target() {
        let strategy = StrategyConfig {
            repay_sizing: RepaySizing::Exact,
            ..Default::default()
        };
        let metrics = snapshot(dec!(105), dec!(100));
        let repay = repay_amount(&metrics, &strategy);
        assert_eq!(repay, dec!(12.5));
        let rec = recommend_from(&metrics, &strategy, &RiskConfig::default());
        assert_eq!(rec.estimated_hf_after, Some(dec!(1.2)));
    }

    #[test]
    fn test_warning_and_healthy() {
        let warning = recommend(dec!(100), dec!(90));
        assert_eq!(warning.action, StrategyAction::None);
        assert_eq!(warning.priority, 2);
        assert_eq!(warning.reason, "Health factor between 1.1 and 1.2; monitor closely");

        let healthy = recommend(dec!(200), dec!(50));
        assert_eq!(healthy.priority, 0);
        assert_eq!(healthy.reason, "Position is healthy");
    }

    #[test]
    fn test_action_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&StrategyAction::EmergencyLiquidate).unwrap(),
            "\"EMERGENCY_LIQUIDATE\""
        );
    }
}
