//! Risk engine: turns raw chain state into [`HealthMetrics`].
//!
//! The engine holds no position state. Every call re-reads the data source,
//! so two calls may disagree if the chain moved in between. Callers that
//! need one consistent view capture a snapshot and use the pure functions
//! in [`crate::limits`] and [`crate::strategy`].

use crate::config::{MarketConfig, RiskConfig};
use crate::error::RiskError;
use crate::metrics::{floor_dust, health_factor, CollateralPricing, HealthMetrics, RiskStatus};
use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use std::sync::Arc;
use tectonic_chain::units::{decimal_to_units, units_to_decimal, wad_to_decimal, WAD};
use tectonic_chain::PositionDataSource;
use tracing::{debug, instrument, warn};

/// Health computation over one lending market.
#[derive(Debug, Clone)]
pub struct RiskEngine {
    source: Arc<dyn PositionDataSource>,
    risk: RiskConfig,
    market: MarketConfig,
}

impl RiskEngine {
    /// Create an engine, rejecting out-of-domain configuration.
    pub fn new(
        source: Arc<dyn PositionDataSource>,
        risk: RiskConfig,
        market: MarketConfig,
    ) -> Result<Self, RiskError> {
        risk.validate()?;
        market.validate()?;
        Ok(Self {
            source,
            risk,
            market,
        })
    }

    /// Replace the collateral factor, e.g. with the on-chain value.
    pub fn with_collateral_factor(mut self, collateral_factor: Decimal) -> Result<Self, RiskError> {
        let market = MarketConfig {
            collateral_factor,
            ..self.market
        };
        market.validate()?;
        self.market = market;
        Ok(self)
    }

    pub fn risk_config(&self) -> &RiskConfig {
        &self.risk
    }

    pub fn market_config(&self) -> &MarketConfig {
        &self.market
    }

    pub fn source(&self) -> &Arc<dyn PositionDataSource> {
        &self.source
    }

    /// Compute a fresh health snapshot for `account`.
    #[instrument(skip(self), fields(market = %self.source.market()))]
    pub async fn health_metrics(&self, account: Address) -> Result<HealthMetrics, RiskError> {
        let liquidity = self.source.account_liquidity(account).await?;
        if !liquidity.is_ok() {
            let code = u64::try_from(liquidity.error).unwrap_or(u64::MAX);
            return Err(RiskError::LiquidityQuery(code));
        }
        let available = wad_to_decimal(liquidity.liquidity)?;
        let shortfall = wad_to_decimal(liquidity.shortfall)?;

        let (supplied, borrowed) = tokio::try_join!(
            self.source.supplied_balance(account),
            self.source.borrow_balance(account),
        )?;

        let (underlying_units, collateral_pricing) = match self.source.exchange_rate().await {
            Ok(rate) => {
                let scaled = supplied
                    .checked_mul(rate)
                    .ok_or(RiskError::Overflow("supplied underlying"))?;
                (scaled / WAD, CollateralPricing::ExchangeRate)
            }
            Err(e) => {
                warn!(
                    account = %account,
                    error = %e,
                    "Exchange rate unavailable, valuing collateral 1:1"
                );
                (supplied, CollateralPricing::OneToOneFallback)
            }
        };

        let dust = self.risk.dust_threshold_usd;
        let underlying_usd = floor_dust(self.to_usd(underlying_units, "collateral value")?, dust);
        let total_borrow_usd = floor_dust(self.to_usd(borrowed, "borrow value")?, dust);

        let total_collateral_usd = underlying_usd
            .checked_mul(self.market.collateral_factor)
            .ok_or(RiskError::Overflow("collateral after factor"))?;

        let hf = health_factor(total_collateral_usd, total_borrow_usd);
        let status = RiskStatus::classify(hf, &self.risk);

        let safe = available
            .checked_mul(self.risk.safety_ltv)
            .ok_or(RiskError::Overflow("safe borrow limit"))?;

        let metrics = HealthMetrics {
            account,
            health_factor: hf,
            status,
            total_collateral_usd,
            total_borrow_usd,
            available_liquidity_usd: available,
            safe_borrow_limit_usd: floor_dust(safe, dust),
            max_borrow_limit_usd: floor_dust(available, dust),
            shortfall_usd: floor_dust(shortfall, dust),
            underlying_usd,
            collateral_pricing,
            observed_at: chrono::Utc::now(),
        };

        debug!(
            account = %account,
            hf = %metrics.health_factor,
            status = %metrics.status,
            collateral_usd = %metrics.total_collateral_usd,
            borrow_usd = %metrics.total_borrow_usd,
            "Computed health metrics"
        );
        Ok(metrics)
    }

    pub async fn health_status(&self, account: Address) -> Result<RiskStatus, RiskError> {
        Ok(self.health_metrics(account).await?.status)
    }

    /// Safe borrow limit in underlying raw units and in USD.
    pub async fn safe_borrow_limit(&self, account: Address) -> Result<(U256, Decimal), RiskError> {
        let usd = self.health_metrics(account).await?.safe_borrow_limit_usd;
        Ok((self.usd_to_units(usd)?, usd))
    }

    /// Whether the account has entered this market as collateral.
    pub async fn collateral_enabled(&self, account: Address) -> Result<bool, RiskError> {
        let market = self.source.market();
        let entered = self.source.entered_markets(account).await?;
        Ok(entered.contains(&market))
    }

    /// Convert a USD amount into underlying raw units at the configured price.
    pub fn usd_to_units(&self, usd: Decimal) -> Result<U256, RiskError> {
        if self.market.underlying_price_usd.is_zero() {
            return Ok(U256::ZERO);
        }
        let amount = usd
            .checked_div(self.market.underlying_price_usd)
            .ok_or(RiskError::Overflow("usd to underlying"))?;
        Ok(decimal_to_units(amount, self.market.underlying_decimals)?)
    }

    /// Value underlying raw units in USD.
    pub fn to_usd(&self, units: U256, what: &'static str) -> Result<Decimal, RiskError> {
        units_to_decimal(units, self.market.underlying_decimals)?
            .checked_mul(self.market.underlying_price_usd)
            .ok_or(RiskError::Overflow(what))
    }
}
