//! Tectonic risk engine.
//!
//! This crate provides the position health logic of the agent:
//! - Health metrics and HEALTHY/WARNING/CRITICAL/LIQUIDATABLE classification
//! - Safe-borrow and safe-withdraw evaluation
//! - Position monitoring with observer hooks and a polling loop
//! - Remediation recommendations and the auto-repay flow
//! - Guarded lending operations and an oracle price cross-check
//!
//! All chain access goes through the traits in `tectonic_chain::protocol`.

mod auto_repay;
pub mod config;
mod error;
mod health;
mod limits;
mod metrics;
mod monitor;
mod oracle_guard;
mod service;
mod strategy;
mod summary;

#[cfg(test)]
mod testing;

pub use auto_repay::{AutoRepayResult, AutoRepayStep, AutoRepayer};
pub use config::{AgentConfig, MarketConfig, MonitorConfig, NetworkConfig, RepaySizing, RiskConfig, StrategyConfig};
pub use error::RiskError;
pub use health::RiskEngine;
pub use limits::{evaluate_borrow, evaluate_withdraw, BorrowDecision, BorrowRejection};
pub use metrics::{
    floor_dust, health_factor, CollateralPricing, HealthMetrics, RiskStatus, LIQUIDATION_THRESHOLD,
    NO_DEBT_HEALTH_FACTOR,
};
pub use monitor::{AccountPoll, HealthObserver, PositionMonitor};
pub use oracle_guard::{OracleGuard, OraclePriceCheck};
pub use service::{LendingService, OperationOutcome, ServiceError};
pub use strategy::{recommend_from, repay_amount, StrategyAction, StrategyRecommendation};
pub use summary::{PositionSummary, RecommendationSummary};
