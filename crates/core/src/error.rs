//! Error taxonomy for the risk engine.

use tectonic_chain::{ChainError, UnitsError};
use thiserror::Error;

/// Failures while computing or acting on position health.
///
/// Policy outcomes (a rejected borrow, a skipped repay) are values, not
/// errors; see `BorrowDecision` and `AutoRepayResult`.
#[derive(Debug, Error)]
pub enum RiskError {
    /// A chain read failed; the position's health is unknown.
    #[error("position data unavailable: {0}")]
    DataSource(#[from] ChainError),

    /// The core could not compute account liquidity.
    #[error("account liquidity query returned error code {0}")]
    LiquidityQuery(u64),

    #[error(transparent)]
    Units(#[from] UnitsError),

    /// Decimal arithmetic left the representable range.
    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RiskError {
    /// Whether the same query could succeed on a later poll.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::DataSource(e) => e.is_transient(),
            Self::LiquidityQuery(_) => true,
            _ => false,
        }
    }
}
