//! Error taxonomy for chain access.

use alloy::primitives::B256;
use thiserror::Error;

/// Errors raised while reading from or writing to the chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport, decoding or node-side failure.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Malformed RPC endpoint.
    #[error("invalid rpc url {url}: {reason}")]
    InvalidRpcUrl { url: String, reason: String },

    /// The protocol returned a non-zero Compound-style error code on the
    /// pre-flight static call.
    #[error("{operation} rejected by protocol with error code {code}")]
    ProtocolRejected { operation: &'static str, code: u64 },

    /// The transaction was mined but its status is not success.
    #[error("{operation} reverted in tx {tx_hash}")]
    Reverted {
        operation: &'static str,
        tx_hash: B256,
    },

    /// A write was requested on a read-only client.
    #[error("no signer configured for {0}")]
    MissingSigner(&'static str),

    /// The connected node or deployment does not match the configuration.
    #[error("deployment mismatch: {0}")]
    Deployment(String),

    #[error("invalid private key: {0}")]
    InvalidKey(String),
}

impl ChainError {
    /// Wrap any displayable transport error.
    pub fn rpc(err: impl std::fmt::Display) -> Self {
        Self::Rpc(err.to_string())
    }

    /// Whether repeating the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}

/// Parse an RPC endpoint for `ProviderBuilder::on_http`.
pub(crate) fn parse_url(url: &str) -> Result<reqwest::Url, ChainError> {
    url.parse::<reqwest::Url>().map_err(|e| ChainError::InvalidRpcUrl {
        url: url.to_string(),
        reason: format!("{e}"),
    })
}
