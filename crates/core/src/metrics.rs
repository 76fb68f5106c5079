//! Health metrics and risk classification.
//!
//! ```text
//! HF = collateral_usd * collateral_factor / borrow_usd
//!
//!        LIQUIDATABLE   |   CRITICAL   |   WARNING   |   HEALTHY
//!   ----------------- 1.0 ----------- 1.1 --------- 1.2 ------------->  HF
//! ```
//!
//! A threshold value itself belongs to the better tier.

use crate::config::RiskConfig;
use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Health factor reported for a position with no debt.
pub const NO_DEBT_HEALTH_FACTOR: Decimal = dec!(999);

/// HF below which the protocol may liquidate.
pub const LIQUIDATION_THRESHOLD: Decimal = Decimal::ONE;

/// Risk tier, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskStatus {
    Healthy,
    Warning,
    Critical,
    Liquidatable,
}

impl RiskStatus {
    /// Classify a health factor against the configured thresholds.
    pub fn classify(health_factor: Decimal, cfg: &RiskConfig) -> Self {
        if health_factor < LIQUIDATION_THRESHOLD {
            Self::Liquidatable
        } else if health_factor < cfg.critical_threshold {
            Self::Critical
        } else if health_factor < cfg.warning_threshold {
            Self::Warning
        } else {
            Self::Healthy
        }
    }

    /// New borrows are refused at CRITICAL or worse.
    pub fn allows_new_borrow(self) -> bool {
        self < Self::Critical
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Liquidatable => "LIQUIDATABLE",
        }
    }
}

impl fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How supplied tTokens were valued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollateralPricing {
    /// Live `exchangeRateStored`
    ExchangeRate,
    /// Exchange rate unavailable, 1 tToken = 1 underlying assumed
    OneToOneFallback,
}

/// Point-in-time view of one account's position.
///
/// USD amounts are non-negative and already dust-floored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthMetrics {
    pub account: Address,
    /// Sentinel [`NO_DEBT_HEALTH_FACTOR`] when there is no debt
    pub health_factor: Decimal,
    pub status: RiskStatus,
    /// Supplied value after the collateral factor
    pub total_collateral_usd: Decimal,
    pub total_borrow_usd: Decimal,
    pub available_liquidity_usd: Decimal,
    /// `available_liquidity_usd * safety_ltv`
    pub safe_borrow_limit_usd: Decimal,
    pub max_borrow_limit_usd: Decimal,
    pub shortfall_usd: Decimal,
    /// Supplied value before the collateral factor
    pub underlying_usd: Decimal,
    pub collateral_pricing: CollateralPricing,
    pub observed_at: DateTime<Utc>,
}

impl HealthMetrics {
    pub fn has_debt(&self) -> bool {
        !self.total_borrow_usd.is_zero()
    }

    /// Any collateral or debt at all.
    pub fn has_position(&self) -> bool {
        self.has_debt() || !self.total_collateral_usd.is_zero()
    }

    /// Collateral was valued without the live exchange rate.
    pub fn is_degraded(&self) -> bool {
        self.collateral_pricing == CollateralPricing::OneToOneFallback
    }
}

/// Values below the threshold become exactly zero.
pub fn floor_dust(value: Decimal, threshold: Decimal) -> Decimal {
    if value < threshold {
        Decimal::ZERO
    } else {
        value
    }
}

/// Collateral over borrow, or the no-debt sentinel when borrow is zero.
pub fn health_factor(collateral_usd: Decimal, borrow_usd: Decimal) -> Decimal {
    if borrow_usd.is_zero() {
        return NO_DEBT_HEALTH_FACTOR;
    }
    collateral_usd.checked_div(borrow_usd).unwrap_or(Decimal::MAX)
}
