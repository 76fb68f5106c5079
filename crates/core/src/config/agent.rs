//! Agent configuration with profile support.
//!
//! Provides explicit configuration for the risk engine, strategy and
//! monitor, with profiles (default, conservative, aggressive) and TOML
//! file loading.

use super::network::NetworkConfig;
use crate::error::RiskError;
use alloy::primitives::Address;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure containing all agent parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Health thresholds and borrow safety margin
    #[serde(default)]
    pub risk: RiskConfig,

    /// Parameters of the monitored market
    #[serde(default)]
    pub market: MarketConfig,

    /// Remediation strategy
    #[serde(default)]
    pub strategy: StrategyConfig,

    /// Polling monitor
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Chain endpoints and contract addresses
    #[serde(default)]
    pub network: NetworkConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Risk classification thresholds.
///
/// All values are decimals; HF below 1.0 is always liquidatable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskConfig {
    /// Fraction of available liquidity considered safe to borrow
    #[serde(default = "default_safety_ltv")]
    pub safety_ltv: Decimal,

    /// USD amounts below this are treated as zero
    #[serde(default = "default_dust_threshold")]
    pub dust_threshold_usd: Decimal,

    /// HF below this is WARNING
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: Decimal,

    /// HF below this is CRITICAL
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: Decimal,
}

fn default_safety_ltv() -> Decimal {
    dec!(0.75)
}
fn default_dust_threshold() -> Decimal {
    dec!(0.01)
}
fn default_warning_threshold() -> Decimal {
    dec!(1.2)
}
fn default_critical_threshold() -> Decimal {
    dec!(1.1)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            safety_ltv: default_safety_ltv(),
            dust_threshold_usd: default_dust_threshold(),
            warning_threshold: default_warning_threshold(),
            critical_threshold: default_critical_threshold(),
        }
    }
}

impl RiskConfig {
    /// Reject values outside their domains.
    pub fn validate(&self) -> Result<(), RiskError> {
        if self.safety_ltv <= Decimal::ZERO || self.safety_ltv > Decimal::ONE {
            return Err(RiskError::Config(format!(
                "safety_ltv must be in (0, 1], got {}",
                self.safety_ltv
            )));
        }
        if self.dust_threshold_usd.is_sign_negative() {
            return Err(RiskError::Config(format!(
                "dust_threshold_usd must be non-negative, got {}",
                self.dust_threshold_usd
            )));
        }
        if self.critical_threshold < Decimal::ONE {
            return Err(RiskError::Config(format!(
                "critical_threshold must be at least 1.0, got {}",
                self.critical_threshold
            )));
        }
        if self.critical_threshold > self.warning_threshold {
            return Err(RiskError::Config(format!(
                "critical_threshold {} exceeds warning_threshold {}",
                self.critical_threshold, self.warning_threshold
            )));
        }
        Ok(())
    }
}

/// Static parameters of the monitored market.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketConfig {
    /// Symbol of the underlying asset
    #[serde(default = "default_underlying_symbol")]
    pub underlying_symbol: String,

    /// Decimals of the underlying asset
    #[serde(default = "default_underlying_decimals")]
    pub underlying_decimals: u8,

    /// USD price of one underlying unit
    #[serde(default = "default_underlying_price")]
    pub underlying_price_usd: Decimal,

    /// Collateral factor applied to supplied value
    #[serde(default = "default_collateral_factor")]
    pub collateral_factor: Decimal,

    /// Replace the collateral factor with the on-chain value at startup
    #[serde(default = "default_refresh_collateral_factor")]
    pub refresh_collateral_factor: bool,

    /// Maximum tolerated oracle deviation from the reference price
    #[serde(default = "default_max_oracle_deviation")]
    pub max_oracle_deviation: Decimal,
}

fn default_underlying_symbol() -> String {
    "USDC".to_string()
}
fn default_underlying_decimals() -> u8 {
    6
}
fn default_underlying_price() -> Decimal {
    Decimal::ONE
}
fn default_collateral_factor() -> Decimal {
    dec!(0.80)
}
fn default_refresh_collateral_factor() -> bool {
    true
}
fn default_max_oracle_deviation() -> Decimal {
    dec!(0.05)
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            underlying_symbol: default_underlying_symbol(),
            underlying_decimals: default_underlying_decimals(),
            underlying_price_usd: default_underlying_price(),
            collateral_factor: default_collateral_factor(),
            refresh_collateral_factor: default_refresh_collateral_factor(),
            max_oracle_deviation: default_max_oracle_deviation(),
        }
    }
}

impl MarketConfig {
    pub fn validate(&self) -> Result<(), RiskError> {
        if self.collateral_factor.is_sign_negative() || self.collateral_factor > Decimal::ONE {
            return Err(RiskError::Config(format!(
                "collateral_factor must be in [0, 1], got {}",
                self.collateral_factor
            )));
        }
        if self.underlying_price_usd.is_sign_negative() {
            return Err(RiskError::Config(format!(
                "underlying_price_usd must be non-negative, got {}",
                self.underlying_price_usd
            )));
        }
        if self.underlying_decimals > 36 {
            return Err(RiskError::Config(format!(
                "underlying_decimals {} is out of range",
                self.underlying_decimals
            )));
        }
        Ok(())
    }
}

/// How the REPAY recommendation is sized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepaySizing {
    /// borrow * (target - hf) / 5, floored at the minimum repay
    #[default]
    Heuristic,
    /// Solve collateral / (borrow - repay) = target
    Exact,
}

/// Remediation strategy parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyConfig {
    /// HF the REPAY sizing aims for
    #[serde(default = "default_target_hf")]
    pub target_health_factor: Decimal,

    #[serde(default)]
    pub repay_sizing: RepaySizing,

    /// Smallest repay ever suggested (USD)
    #[serde(default = "default_min_repay")]
    pub min_repay_usd: Decimal,

    /// Run auto-repay when the monitor sees CRITICAL
    #[serde(default)]
    pub auto_repay: bool,

    /// Asset swapped into the borrow asset for auto-repay
    #[serde(default = "default_source_asset")]
    pub source_asset: String,
}

fn default_target_hf() -> Decimal {
    dec!(1.2)
}
fn default_min_repay() -> Decimal {
    Decimal::ONE
}
fn default_source_asset() -> String {
    "CRO".to_string()
}

impl StrategyConfig {
    /// The target must not sit below the critical threshold, or a CRITICAL
    /// position would be sized to a zero repay.
    pub fn validate(&self, risk: &RiskConfig) -> Result<(), RiskError> {
        if self.target_health_factor < risk.critical_threshold {
            return Err(RiskError::Config(format!(
                "target_health_factor {} is below critical_threshold {}",
                self.target_health_factor, risk.critical_threshold
            )));
        }
        if self.min_repay_usd.is_sign_negative() {
            return Err(RiskError::Config(format!(
                "min_repay_usd must be non-negative, got {}",
                self.min_repay_usd
            )));
        }
        Ok(())
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            target_health_factor: default_target_hf(),
            repay_sizing: RepaySizing::default(),
            min_repay_usd: default_min_repay(),
            auto_repay: false,
            source_asset: default_source_asset(),
        }
    }
}

/// Polling monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    /// Poll interval (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Accounts to watch; the operator address is added when a signer is set
    #[serde(default)]
    pub accounts: Vec<Address>,

    /// Maximum accounts polled concurrently
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_poll_interval() -> u64 {
    30
}
fn default_max_concurrent() -> usize {
    4
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            accounts: Vec::new(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            risk: RiskConfig::default(),
            market: MarketConfig::default(),
            strategy: StrategyConfig::default(),
            monitor: MonitorConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self, RiskError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RiskError::Config(format!("cannot read {path}: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML, expanding `${VAR}` in network strings.
    pub fn from_toml(content: &str) -> Result<Self, RiskError> {
        let mut config: Self =
            toml::from_str(content).map_err(|e| RiskError::Config(e.to_string()))?;
        config.network.expand_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// Wider margins: lower borrow share, earlier warnings.
    pub fn conservative() -> Self {
        Self {
            profile: "conservative".to_string(),
            risk: RiskConfig {
                safety_ltv: dec!(0.6),
                dust_threshold_usd: dec!(0.01),
                warning_threshold: dec!(1.35),
                critical_threshold: dec!(1.2),
            },
            strategy: StrategyConfig {
                target_health_factor: dec!(1.35),
                repay_sizing: RepaySizing::Exact,
                ..Default::default()
            },
            monitor: MonitorConfig {
                poll_interval_secs: 15,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Thin margins for capital efficiency.
    pub fn aggressive() -> Self {
        Self {
            profile: "aggressive".to_string(),
            risk: RiskConfig {
                safety_ltv: dec!(0.9),
                dust_threshold_usd: dec!(0.01),
                warning_threshold: dec!(1.1),
                critical_threshold: dec!(1.03),
            },
            strategy: StrategyConfig {
                target_health_factor: dec!(1.1),
                auto_repay: true,
                ..Default::default()
            },
            monitor: MonitorConfig {
                poll_interval_secs: 10,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Select configuration from the environment.
    ///
    /// `AGENT_CONFIG` names a TOML file; otherwise `AGENT_PROFILE` selects
    /// a built-in profile (default, conservative, aggressive).
    pub fn from_env() -> Result<Self, RiskError> {
        if let Ok(path) = std::env::var("AGENT_CONFIG") {
            return Self::from_file(&path);
        }
        let profile = std::env::var("AGENT_PROFILE").unwrap_or_else(|_| "default".to_string());
        let mut config = Self::profile(&profile);
        config.network.expand_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// Built-in profile by name, falling back to default.
    pub fn profile(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "conservative" | "safe" => Self::conservative(),
            "aggressive" | "aggro" => Self::aggressive(),
            _ => Self::default(),
        }
    }

    pub fn validate(&self) -> Result<(), RiskError> {
        self.risk.validate()?;
        self.market.validate()?;
        self.strategy.validate(&self.risk)
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Agent configuration loaded");
        tracing::info!(
            safety_ltv = %self.risk.safety_ltv,
            dust_threshold = %self.risk.dust_threshold_usd,
            warning_hf = %self.risk.warning_threshold,
            critical_hf = %self.risk.critical_threshold,
            "Risk thresholds"
        );
        tracing::info!(
            underlying = %self.market.underlying_symbol,
            collateral_factor = %self.market.collateral_factor,
            refresh_cf = self.market.refresh_collateral_factor,
            "Market parameters"
        );
        tracing::info!(
            target_hf = %self.strategy.target_health_factor,
            sizing = ?self.strategy.repay_sizing,
            auto_repay = self.strategy.auto_repay,
            source_asset = %self.strategy.source_asset,
            "Strategy parameters"
        );
        tracing::info!(
            network = %self.network.name,
            chain_id = self.network.chain_id,
            rpc_count = self.network.rpc_urls.len(),
            accounts = self.monitor.accounts.len(),
            poll_secs = self.monitor.poll_interval_secs,
            "Network and monitor"
        );
    }
}
