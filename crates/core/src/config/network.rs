//! Chain configuration (RPC endpoints and Tectonic deployment).

use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use tectonic_chain::TectonicAddresses;

/// Environment variable that prepends an RPC endpoint.
pub const RPC_ENV_VAR: &str = "CRONOS_RPC";

/// Network endpoints and deployment addresses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Network name (for logging/identification)
    #[serde(default = "default_network_name")]
    pub name: String,

    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// RPC endpoints in priority order; `${VAR}` is expanded
    #[serde(default = "default_rpc_urls")]
    pub rpc_urls: Vec<String>,

    #[serde(default)]
    pub tectonic: TectonicConfig,
}

/// Tectonic deployment addresses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TectonicConfig {
    #[serde(default = "default_core")]
    pub core: Address,
    #[serde(default = "default_market")]
    pub market: Address,
    #[serde(default = "default_underlying")]
    pub underlying: Address,
    /// TONIC governance token
    #[serde(default = "default_tonic")]
    pub tonic: Address,
}

fn default_network_name() -> String {
    "cronos-mainnet".to_string()
}
fn default_chain_id() -> u64 {
    tectonic_chain::CRONOS_MAINNET_CHAIN_ID
}
fn default_rpc_urls() -> Vec<String> {
    vec![
        "https://evm.cronos.org".to_string(),
        "https://cronos-evm.publicnode.com".to_string(),
        "https://cronos.blockpi.network/v1/rpc/public".to_string(),
    ]
}
fn default_core() -> Address {
    TectonicAddresses::cronos_mainnet_usdc().core
}
fn default_market() -> Address {
    TectonicAddresses::cronos_mainnet_usdc().market
}
fn default_underlying() -> Address {
    TectonicAddresses::cronos_mainnet_usdc().underlying
}
fn default_tonic() -> Address {
    address!("DD73dEa10ABC2Bff99c60882EC5b2B81Bb1Dc5B2")
}

impl Default for TectonicConfig {
    fn default() -> Self {
        Self {
            core: default_core(),
            market: default_market(),
            underlying: default_underlying(),
            tonic: default_tonic(),
        }
    }
}

impl TectonicConfig {
    pub fn addresses(&self) -> TectonicAddresses {
        TectonicAddresses {
            core: self.core,
            market: self.market,
            underlying: self.underlying,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: default_network_name(),
            chain_id: default_chain_id(),
            rpc_urls: default_rpc_urls(),
            tectonic: TectonicConfig::default(),
        }
    }
}

impl NetworkConfig {
    /// Expand environment variables in RPC URLs.
    pub fn expand_env_vars(&mut self) {
        for url in &mut self.rpc_urls {
            *url = expand_env(url);
        }
    }

    /// Endpoints to try, `CRONOS_RPC` first when set. Unexpanded or empty
    /// entries are dropped.
    pub fn rpc_candidates(&self) -> Vec<String> {
        let mut candidates = Vec::with_capacity(self.rpc_urls.len() + 1);
        if let Ok(url) = std::env::var(RPC_ENV_VAR) {
            candidates.push(url);
        }
        candidates.extend(self.rpc_urls.iter().cloned());

        let mut unique: Vec<String> = Vec::with_capacity(candidates.len());
        for url in candidates {
            let url = url.trim().to_string();
            if url.is_empty() || url.contains("${") || unique.contains(&url) {
                continue;
            }
            unique.push(url);
        }
        unique
    }
}

/// Expand ${VAR_NAME} patterns with environment variable values.
fn expand_env(s: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return s.to_string();
    };
    let mut result = s.to_string();

    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }

    result
}
