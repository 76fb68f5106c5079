//! Tectonic chain interaction layer.
//!
//! This crate provides:
//! - Provider management with endpoint probing and chain-id verification
//! - Contract bindings for the Tectonic core, tTokens, ERC-20 and the price oracle
//! - Transaction signing and sending
//! - Fixed-point unit conversions between `U256` and `Decimal`
//! - Protocol traits consumed by the risk engine, with the live Tectonic client
//!
//! Targets Cronos EVM (chain id 25) by default.

mod contracts;
mod error;
pub mod protocol;
mod provider;
mod signer;
pub mod units;

pub use contracts::{ITToken, ITectonicCore, ITectonicOracle, IERC20};
pub use error::ChainError;
pub use protocol::{
    AccountLiquidity, LendingOperations, PositionDataSource, ProtocolOracle, TectonicAddresses,
    TectonicClient, TxReceipt, REPAY_ALL,
};
pub use provider::ProviderManager;
pub use signer::TransactionSender;
pub use units::UnitsError;

/// Cronos mainnet chain id.
pub const CRONOS_MAINNET_CHAIN_ID: u64 = 25;

/// Cronos testnet chain id.
pub const CRONOS_TESTNET_CHAIN_ID: u64 = 338;
