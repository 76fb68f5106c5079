//! RPC endpoint selection and connection checks.
//! Uses Alloy providers for type-safe RPC interactions.

use crate::error::{parse_url, ChainError};
use alloy::providers::{Provider, ProviderBuilder};
use tracing::{debug, info, warn};

/// Holds the RPC endpoint the agent talks to.
///
/// Providers are built per call from the URL, so the manager is cheap to
/// clone and share between tasks.
#[derive(Debug, Clone)]
pub struct ProviderManager {
    rpc_url: String,
    chain_id: u64,
}

impl ProviderManager {
    /// Connect to the first candidate endpoint that answers with the
    /// expected chain id.
    ///
    /// Candidates are tried in order, duplicates skipped.
    pub async fn connect(candidates: &[String], expected_chain_id: u64) -> Result<Self, ChainError> {
        let mut seen: Vec<&str> = Vec::with_capacity(candidates.len());
        let mut last_error = None;

        for url in candidates.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
            if seen.contains(&url) {
                continue;
            }
            seen.push(url);

            match Self::probe(url).await {
                Ok((chain_id, block)) if chain_id == expected_chain_id => {
                    info!(rpc = url, chain_id, block, "Provider connection verified");
                    return Ok(Self {
                        rpc_url: url.to_string(),
                        chain_id,
                    });
                }
                Ok((chain_id, _)) => {
                    warn!(rpc = url, chain_id, expected = expected_chain_id, "Chain id mismatch, skipping endpoint");
                    last_error = Some(ChainError::Deployment(format!(
                        "{url} reports chain id {chain_id}, expected {expected_chain_id}"
                    )));
                }
                Err(e) => {
                    warn!(rpc = url, error = %e, "RPC endpoint unavailable");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ChainError::Deployment("no RPC endpoints configured".into())))
    }

    /// Use an endpoint without probing it.
    pub fn new(rpc_url: impl Into<String>, chain_id: u64) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            chain_id,
        }
    }

    async fn probe(url: &str) -> Result<(u64, u64), ChainError> {
        let provider = ProviderBuilder::new().on_http(parse_url(url)?);
        let chain_id = provider.get_chain_id().await.map_err(ChainError::rpc)?;
        let block = provider.get_block_number().await.map_err(ChainError::rpc)?;
        Ok((chain_id, block))
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Get current block number.
    pub async fn block_number(&self) -> Result<u64, ChainError> {
        let provider = ProviderBuilder::new().on_http(parse_url(&self.rpc_url)?);
        provider.get_block_number().await.map_err(ChainError::rpc)
    }

    /// Check if provider is healthy.
    pub async fn health_check(&self) -> Result<bool, ChainError> {
        let block = self.block_number().await?;
        debug!(block = block, "Provider health check passed");
        Ok(block > 0)
    }
}
