//! Configuration for the Tectonic risk agent.
//!
//! This module provides:
//! - Agent runtime configuration (profiles, thresholds, strategy, monitor)
//! - Network configuration (RPC endpoints, Tectonic addresses)
//!
//! Configuration is explicit: callers build an [`AgentConfig`] and pass
//! its sections to the components that need them.

mod agent;
mod network;

pub use agent::{AgentConfig, MarketConfig, MonitorConfig, RepaySizing, RiskConfig, StrategyConfig};
pub use network::{NetworkConfig, TectonicConfig, RPC_ENV_VAR};
