//! Swap execution abstractions.
//!
//! The auto-repay flow only needs "turn some of asset A into amount X of
//! asset B", so the seam is a single [`SwapExecutor`] trait. Executors can
//! report either just the transaction hash or the hash plus the filled
//! output amount.
//!
//! # Supported Executors
//!
//! - `vvs`: VVS Finance router (Uniswap V2 fork) on Cronos

mod vvs;

pub use vvs::{VvsAddresses, VvsSwapper};

use alloy::primitives::{address, Address, B256};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt::Debug;

/// A request to acquire `amount_out_desired` of `to_asset`.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapRequest {
    /// Symbol of the asset to sell, e.g. "CRO"
    pub from_asset: String,
    /// Symbol of the asset to buy, e.g. "USDC"
    pub to_asset: String,
    /// Exact input to sell; `None` asks the executor to buy exactly
    /// `amount_out_desired`
    pub amount_in: Option<Decimal>,
    /// Output the caller needs
    pub amount_out_desired: Decimal,
    /// Receiver of the output
    pub recipient: Address,
}

/// Result of a submitted swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    /// Only the transaction hash is known.
    Submitted(B256),
    /// Hash and the output amount the swap is known to deliver.
    Filled { tx_hash: B256, amount_out: Decimal },
}

impl SwapOutcome {
    pub fn tx_hash(&self) -> B256 {
        match self {
            Self::Submitted(hash) | Self::Filled { tx_hash: hash, .. } => *hash,
        }
    }

    pub fn amount_out(&self) -> Option<Decimal> {
        match self {
            Self::Submitted(_) => None,
            Self::Filled { amount_out, .. } => Some(*amount_out),
        }
    }
}

/// Executes swaps on behalf of the agent.
#[async_trait]
pub trait SwapExecutor: Send + Sync + Debug {
    /// Executor identifier (e.g., "vvs").
    fn executor_id(&self) -> &str;

    async fn swap(&self, request: SwapRequest) -> Result<SwapOutcome>;
}

/// Token metadata known to the swap layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInfo {
    pub address: Address,
    pub decimals: u8,
    /// Native gas token (no ERC-20 contract)
    pub native: bool,
}

/// Symbol to token lookup.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: HashMap<String, TokenInfo>,
}

impl TokenRegistry {
    /// Tokens with VVS liquidity on Cronos mainnet.
    pub fn cronos_mainnet() -> Self {
        Self::default()
            .with_token("CRO", TokenInfo { address: Address::ZERO, decimals: 18, native: true })
            .with_token("WCRO", erc20(address!("5C7F8A570d578ED84E63fdFA7b1eE72dEae1AE23"), 18))
            .with_token("USDC", erc20(address!("c21223249CA28397B4B6541dfFaEcC539BfF0c59"), 6))
            .with_token("USDT", erc20(address!("66e428c3f67a68878562e79A0234c1F83c208770"), 6))
            .with_token("DAI", erc20(address!("F2001B145b43032AAF5Ee2884e456CCd805F677D"), 18))
            .with_token("WBTC", erc20(address!("062E66477Faf219F25E27e6b5C67602625781309"), 8))
            .with_token("WETH", erc20(address!("e44Fd7fCb2b1581822D0c862B68222998a0c299a"), 18))
    }

    /// Register or replace a token, symbols are case-insensitive.
    pub fn with_token(mut self, symbol: &str, info: TokenInfo) -> Self {
        self.tokens.insert(symbol.to_uppercase(), info);
        self
    }

    pub fn get(&self, symbol: &str) -> Option<&TokenInfo> {
        self.tokens.get(&symbol.to_uppercase())
    }

    /// Look up a symbol or fail with the list of known symbols.
    pub fn resolve(&self, symbol: &str) -> Result<TokenInfo> {
        self.get(symbol).copied().ok_or_else(|| {
            let mut known: Vec<&str> = self.tokens.keys().map(String::as_str).collect();
            known.sort_unstable();
            anyhow::anyhow!("Unknown token '{}'. Known tokens: {}", symbol, known.join(", "))
        })
    }
}

fn erc20(address: Address, decimals: u8) -> TokenInfo {
    TokenInfo {
        address,
        decimals,
        native: false,
    }
}
