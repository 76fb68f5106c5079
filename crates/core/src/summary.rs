//! Serializable position overview.

use crate::config::StrategyConfig;
use crate::error::RiskError;
use crate::health::RiskEngine;
use crate::metrics::{HealthMetrics, RiskStatus};
use crate::strategy::{recommend_from, StrategyAction, StrategyRecommendation};
use alloy::primitives::Address;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationSummary {
    pub action: StrategyAction,
    pub priority: u8,
    pub reason: String,
}

/// Position overview for dashboards and logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionSummary {
    pub account: Address,
    pub supplied_usd: Decimal,
    pub borrowed_usd: Decimal,
    /// `None` when there is no debt
    pub health_factor: Option<Decimal>,
    pub health_status: RiskStatus,
    pub recommendation: RecommendationSummary,
    /// Remaining borrowing power minus shortfall; negative when under water
    pub liquidation_buffer_usd: Decimal,
    pub safe_borrow_limit_usd: Decimal,
    pub collateral_enabled: bool,
    pub degraded: bool,
}

impl PositionSummary {
    pub fn new(
        metrics: &HealthMetrics,
        recommendation: &StrategyRecommendation,
        collateral_enabled: bool,
    ) -> Self {
        let health_factor = metrics.has_debt().then_some(metrics.health_factor);
        Self {
            account: metrics.account,
            supplied_usd: metrics.underlying_usd,
            borrowed_usd: metrics.total_borrow_usd,
            health_factor,
            health_status: metrics.status,
            recommendation: RecommendationSummary {
                action: recommendation.action,
                priority: recommendation.priority,
                reason: recommendation.reason.clone(),
            },
            liquidation_buffer_usd: metrics.available_liquidity_usd - metrics.shortfall_usd,
            safe_borrow_limit_usd: metrics.safe_borrow_limit_usd,
            collateral_enabled,
            degraded: metrics.is_degraded(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

impl RiskEngine {
    /// Metrics, recommendation and collateral flag in one record.
    pub async fn position_summary(
        &self,
        account: Address,
        strategy: &StrategyConfig,
    ) -> Result<PositionSummary, RiskError> {
        let (metrics, collateral_enabled) =
            tokio::try_join!(self.health_metrics(account), self.collateral_enabled(account))?;
        let rec = recommend_from(&metrics, strategy, self.risk_config());
        Ok(PositionSummary::new(&metrics, &rec, collateral_enabled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MarketConfig, RiskConfig};
    use crate::metrics::NO_DEBT_HEALTH_FACTOR;
    use crate::testing::{operator, usdc, MockSource};
    use alloy::primitives::U256;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_summary_json() {
        let source = Arc::new(MockSource::new().with_supplied(usdc(125)).with_borrow(usdc(90)));
        source.enter_market();
        let engine =
            RiskEngine::new(source, RiskConfig::default(), MarketConfig::default()).unwrap();

        let summary = engine
            .position_summary(operator(), &StrategyConfig::default())
            .await
            .unwrap();
        assert_eq!(summary.supplied_usd, dec!(125));
        assert_eq!(summary.health_status, RiskStatus::Warning);
        assert!(summary.collateral_enabled);

        let json = summary.to_json().unwrap();
        assert_eq!(json["health_status"], "WARNING");
        assert_eq!(json["recommendation"]["action"], "NONE");
        assert_eq!(json["recommendation"]["priority"], 2);
    }

    #[tokio::test]
    async fn test_no_debt_has_no_health_factor() {
        let source = Arc::new(MockSource::new().with_supplied(usdc(10)));
        let engine =
            RiskEngine::new(source, RiskConfig::default(), MarketConfig::default()).unwrap();
        let summary = engine
            .position_summary(operator(), &StrategyConfig::default())
            .await
            .unwrap();
        assert_eq!(summary.health_factor, None);
        assert!(!summary.collateral_enabled);
    }

    #[tokio::test]
    async fn test_debt_at_sentinel_value_keeps_health_factor() {
        // 12487.5 supplied is 9990 collateral against 10 borrowed
        let source = Arc::new(
            MockSource::new()
                .with_supplied(U256::from(12_487_500_000u64))
                .with_borrow(usdc(10)),
        );
        let engine =
            RiskEngine::new(source, RiskConfig::default(), MarketConfig::default()).unwrap();
        let summary = engine
            .position_summary(operator(), &StrategyConfig::default())
            .await
            .unwrap();
        assert_eq!(summary.health_factor, Some(NO_DEBT_HEALTH_FACTOR));
        assert_eq!(summary.borrowed_usd, dec!(10));
    }
}
