//! Tectonic agent clients for external services.
//!
//! This crate provides:
//! - Swap execution: the [`SwapExecutor`] trait and a VVS Finance router executor
//! - Reference prices: the [`PriceFeed`] trait and a CoinGecko client

mod price;
pub mod swap;

pub use price::{CoinGeckoClient, PriceFeed};
pub use swap::{
    SwapExecutor, SwapOutcome, SwapRequest, TokenInfo, TokenRegistry, VvsAddresses, VvsSwapper,
};
