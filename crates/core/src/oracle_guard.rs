//! Cross-check of the protocol oracle against an external price feed.

use crate::config::MarketConfig;
use alloy::primitives::Address;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tectonic_api::PriceFeed;
use tectonic_chain::units::units_to_decimal;
use tectonic_chain::ProtocolOracle;
use tracing::{info, instrument, warn};

/// Outcome of one oracle validation. Feed failures are reported here
/// rather than as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OraclePriceCheck {
    pub market: Address,
    pub symbol: String,
    pub oracle_price_usd: Option<Decimal>,
    pub reference_price_usd: Option<Decimal>,
    /// |oracle - reference| / reference
    pub deviation: Option<Decimal>,
    pub max_deviation: Decimal,
    pub valid: bool,
    pub error: Option<String>,
}

/// Validates the protocol price of one market's underlying.
#[derive(Debug, Clone)]
pub struct OracleGuard {
    oracle: Arc<dyn ProtocolOracle>,
    feed: Arc<dyn PriceFeed>,
    market: Address,
    symbol: String,
    decimals: u8,
    max_deviation: Decimal,
}

impl OracleGuard {
    pub fn new(
        oracle: Arc<dyn ProtocolOracle>,
        feed: Arc<dyn PriceFeed>,
        market: Address,
        config: &MarketConfig,
    ) -> Self {
        Self {
            oracle,
            feed,
            market,
            symbol: config.underlying_symbol.clone(),
            decimals: config.underlying_decimals,
            max_deviation: config.max_oracle_deviation,
        }
    }

    /// Oracle prices are scaled by `1e(36 - decimals)`.
    fn oracle_scale(&self) -> u8 {
        36u8.saturating_sub(self.decimals)
    }

    #[instrument(skip(self), fields(market = %self.market, symbol = %self.symbol))]
    pub async fn check(&self) -> OraclePriceCheck {
        let mut check = OraclePriceCheck {
            market: self.market,
            symbol: self.symbol.clone(),
            oracle_price_usd: None,
            reference_price_usd: None,
            deviation: None,
            max_deviation: self.max_deviation,
            valid: false,
            error: None,
        };

        let (oracle, reference) = tokio::join!(
            self.oracle.underlying_price(self.market),
            self.feed.usd_price(&self.symbol),
        );

        let oracle = match oracle
            .map_err(|e| e.to_string())
            .and_then(|raw| units_to_decimal(raw, self.oracle_scale()).map_err(|e| e.to_string()))
        {
            Ok(price) => price,
            Err(e) => {
                warn!(error = %e, "Protocol oracle price unavailable");
                check.error = Some(format!("Oracle query failed: {e}"));
                return check;
            }
        };
        check.oracle_price_usd = Some(oracle);

        let reference = match reference {
            Ok(price) => price,
            Err(e) => {
                warn!(feed = self.feed.feed_id(), error = %e, "Reference price unavailable");
                check.error = Some(format!("Reference price failed: {e}"));
                return check;
            }
        };
        check.reference_price_usd = Some(reference);

        let Some(deviation) = (oracle - reference).abs().checked_div(reference) else {
            check.error = Some("Reference price is zero".to_string());
            return check;
        };
        check.deviation = Some(deviation);
        check.valid = deviation <= self.max_deviation;

        if check.valid {
            info!(oracle = %oracle, reference = %reference, deviation = %deviation, "Oracle price valid");
        } else {
            warn!(
                oracle = %oracle,
                reference = %reference,
                deviation = %deviation,
                max = %self.max_deviation,
                "Oracle price deviates from reference"
            );
            check.error = Some(format!(
                "Oracle price {oracle} deviates {deviation} from reference {reference}"
            ));
        }
        check
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{market, MockFeed, MockOracle};
    use alloy::primitives::U256;
    use rust_decimal_macros::dec;
    use tectonic_chain::units::pow10;

    fn guard(oracle: Option<U256>, feed: Option<Decimal>) -> OracleGuard {
        OracleGuard::new(
            Arc::new(MockOracle { price: oracle }),
            Arc::new(MockFeed { price: feed }),
            market(),
            &MarketConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_price_within_tolerance() {
        // $1.00 for a 6-decimal asset is 1e30
        let check = guard(Some(pow10(30)), Some(dec!(0.98))).check().await;
        assert_eq!(check.oracle_price_usd, Some(dec!(1)));
        assert!(check.valid, "{check:?}");
        assert!(check.error.is_none());
    }

    #[tokio::test]
    async fn test_price_deviation() {
        let check = guard(Some(pow10(30)), Some(dec!(0.9))).check().await;
        assert!(!check.valid);
        assert!(check.deviation.unwrap() > dec!(0.05));
    }

    #[tokio::test]
    async fn test_feed_failure_reported() {
        let check = guard(Some(pow10(30)), None).check().await;
        assert!(!check.valid);
        assert!(check.error.unwrap().starts_with("Reference price failed"));

        let check = guard(None, Some(dec!(1))).check().await;
        assert!(check.error.unwrap().starts_with("Oracle query failed"));
    }

    #[tokio::test]
    async fn test_zero_reference() {
        let check = guard(Some(pow10(30)), Some(Decimal::ZERO)).check().await;
        assert!(!check.valid);
        assert_eq!(check.error.as_deref(), Some("Reference price is zero"));
    }
}
