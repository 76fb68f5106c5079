//! Protocol abstraction layer.
//!
//! The risk engine depends only on these traits, so it can be driven by the
//! live [`TectonicClient`] or by an in-memory double in tests.
//!
//! - [`PositionDataSource`]: read-only position queries
//! - [`LendingOperations`]: state-changing market operations
//! - [`ProtocolOracle`]: the protocol's own price oracle

mod tectonic;

pub use tectonic::{TectonicAddresses, TectonicClient};

use crate::error::ChainError;
use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde::Serialize;
use smallvec::SmallVec;
use std::fmt::Debug;

/// Repay amount meaning "the whole outstanding borrow".
pub const REPAY_ALL: U256 = U256::MAX;

/// Snapshot of `getAccountLiquidity`, USD values scaled by 1e18.
///
/// At most one of `liquidity` and `shortfall` is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountLiquidity {
    /// Compound error code, zero on success
    pub error: U256,
    /// Remaining borrowing power
    pub liquidity: U256,
    /// Amount by which the account is under water
    pub shortfall: U256,
}

impl AccountLiquidity {
    pub fn is_ok(&self) -> bool {
        self.error.is_zero()
    }
}

/// Confirmed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TxReceipt {
    /// true when the transaction executed successfully
    pub status: bool,
    pub transaction_hash: B256,
    pub gas_used: u64,
}

impl TxReceipt {
    /// Turn a failed status into [`ChainError::Reverted`].
    pub fn ensure_success(self, operation: &'static str) -> Result<Self, ChainError> {
        if self.status {
            Ok(self)
        } else {
            Err(ChainError::Reverted {
                operation,
                tx_hash: self.transaction_hash,
            })
        }
    }
}

/// Read-only position queries against one lending market.
#[async_trait]
pub trait PositionDataSource: Send + Sync + Debug {
    /// The tToken market this source reads.
    fn market(&self) -> Address;

    /// Account-wide liquidity computed by the core.
    async fn account_liquidity(&self, account: Address) -> Result<AccountLiquidity, ChainError>;

    /// tToken balance (raw units).
    async fn supplied_balance(&self, account: Address) -> Result<U256, ChainError>;

    /// Current borrow including accrued interest (underlying raw units).
    async fn borrow_balance(&self, account: Address) -> Result<U256, ChainError>;

    /// tToken to underlying exchange rate, 1e18-scaled.
    async fn exchange_rate(&self) -> Result<U256, ChainError>;

    /// Markets the account has entered as collateral.
    async fn entered_markets(&self, account: Address) -> Result<SmallVec<[Address; 4]>, ChainError>;
}

/// State-changing operations on one lending market, signed by the
/// operator key.
#[async_trait]
pub trait LendingOperations: Send + Sync + Debug {
    /// Address that signs the operations, if any.
    fn operator(&self) -> Option<Address>;

    /// Supply underlying (mints tTokens).
    async fn supply(&self, amount: U256) -> Result<TxReceipt, ChainError>;

    /// Enable the given markets as collateral. Already entered markets are
    /// skipped; returns `None` when there is nothing to do.
    async fn enter_markets(&self, markets: &[Address]) -> Result<Option<TxReceipt>, ChainError>;

    async fn borrow(&self, amount: U256) -> Result<TxReceipt, ChainError>;

    /// Repay borrow; [`REPAY_ALL`] repays everything.
    async fn repay(&self, amount: U256) -> Result<TxReceipt, ChainError>;

    /// Redeem an amount of underlying.
    async fn withdraw(&self, amount: U256) -> Result<TxReceipt, ChainError>;
}

/// The protocol's price oracle.
#[async_trait]
pub trait ProtocolOracle: Send + Sync + Debug {
    /// Price of a market's underlying, scaled by `1e(36 - underlying decimals)`.
    async fn underlying_price(&self, market: Address) -> Result<U256, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_success() {
        let receipt = TxReceipt {
            status: true,
            transaction_hash: B256::repeat_byte(1),
            gas_used: 21_000,
        };
        assert_eq!(receipt.ensure_success("mint").unwrap(), receipt);
    }

    #[test]
    fn test_receipt_revert() {
        let receipt = TxReceipt {
            status: false,
            transaction_hash: B256::repeat_byte(2),
            gas_used: 50_000,
        };
        match receipt.ensure_success("borrow") {
            Err(ChainError::Reverted { operation, tx_hash }) => {
                assert_eq!(operation, "borrow");
                assert_eq!(tx_hash, B256::repeat_byte(2));
            }
            other => panic!("expected revert, got {other:?}"),
        }
    }

    #[test]
    fn test_liquidity_error_flag() {
        let snapshot = AccountLiquidity {
            error: U256::from(3),
            liquidity: U256::ZERO,
            shortfall: U256::ZERO,
        };
        assert!(!snapshot.is_ok());
    }
}
