//! VVS Finance swap executor.
//!
//! VVS is a Uniswap V2 fork. Quotes come from the router's
//! `getAmountsOut` / `getAmountsIn`; paths are tried direct first, then
//! routed through WCRO. Native CRO is supported on either side.

use super::{SwapExecutor, SwapOutcome, SwapRequest, TokenInfo, TokenRegistry};
use alloy::primitives::{address, Address, Bytes, U256};
use alloy::providers::ProviderBuilder;
use alloy::sol;
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tectonic_chain::units::{apply_basis_points, apply_basis_points_up, decimal_to_units, units_to_decimal};
use tectonic_chain::{TransactionSender, IERC20};
use tracing::{debug, info, instrument};

sol! {
    /// VVS router (UniswapV2Router02 subset)
    #[sol(rpc)]
    interface IVvsRouter {
        function getAmountsOut(uint256 amountIn, address[] calldata path) external view returns (uint256[] memory amounts);
        function getAmountsIn(uint256 amountOut, address[] calldata path) external view returns (uint256[] memory amounts);
        function swapExactETHForTokens(uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external payable returns (uint256[] memory amounts);
        function swapETHForExactTokens(uint256 amountOut, address[] calldata path, address to, uint256 deadline) external payable returns (uint256[] memory amounts);
        function swapExactTokensForETH(uint256 amountIn, uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts);
        function swapTokensForExactETH(uint256 amountOut, uint256 amountInMax, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts);
        function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts);
        function swapTokensForExactTokens(uint256 amountOut, uint256 amountInMax, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts);
    }
}

/// VVS contract addresses.
#[derive(Debug, Clone, Copy)]
pub struct VvsAddresses {
    pub router: Address,
    pub wcro: Address,
}

impl VvsAddresses {
    /// Cronos mainnet deployment.
    pub fn cronos_mainnet() -> Self {
        Self {
            router: address!("145863Eb42Cf62847A6Ca784e6416C1682b1b2Ae"),
            wcro: address!("5C7F8A570d578ED84E63fdFA7b1eE72dEae1AE23"),
        }
    }
}

/// Default slippage tolerance (1%).
const DEFAULT_SLIPPAGE_BPS: u16 = 100;

/// Default deadline offset in seconds.
const DEFAULT_DEADLINE_SECS: i64 = 300;

/// Which side of the trade is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwapKind {
    ExactIn,
    ExactOut,
}

/// Swap executor backed by the VVS router.
#[derive(Debug)]
pub struct VvsSwapper {
    rpc_url: String,
    addresses: VvsAddresses,
    sender: Arc<TransactionSender>,
    tokens: TokenRegistry,
    slippage_bps: u16,
    deadline_secs: i64,
    /// Working path per (from, to) pair
    path_cache: DashMap<(Address, Address), Vec<Address>>,
}

impl VvsSwapper {
    pub fn new(rpc_url: impl Into<String>, sender: Arc<TransactionSender>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            addresses: VvsAddresses::cronos_mainnet(),
            sender,
            tokens: TokenRegistry::cronos_mainnet(),
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
            deadline_secs: DEFAULT_DEADLINE_SECS,
            path_cache: DashMap::new(),
        }
    }

    pub fn with_addresses(mut self, addresses: VvsAddresses) -> Self {
        self.addresses = addresses;
        self
    }

    pub fn with_tokens(mut self, tokens: TokenRegistry) -> Self {
        self.tokens = tokens;
        self
    }

    /// Set slippage tolerance in basis points (100 = 1%).
    pub fn with_slippage_bps(mut self, slippage_bps: u16) -> Self {
        self.slippage_bps = slippage_bps;
        self
    }

    /// Candidate paths, preferring the direct pair.
    fn candidate_paths(&self, from: &TokenInfo, to: &TokenInfo) -> Vec<Vec<Address>> {
        let wcro = self.addresses.wcro;
        match (from.native, to.native) {
            (true, false) => vec![vec![wcro, to.address]],
            (false, true) => vec![vec![from.address, wcro]],
            _ => {
                let mut paths = vec![vec![from.address, to.address]];
                if from.address != wcro && to.address != wcro {
                    paths.push(vec![from.address, wcro, to.address]);
                }
                paths
            }
        }
    }

    /// Quote along the first working path. Returns the path and the
    /// router's amounts array.
    async fn quote(
        &self,
        from: &TokenInfo,
        to: &TokenInfo,
        amount: U256,
        kind: SwapKind,
    ) -> Result<(Vec<Address>, Vec<U256>)> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let router = IVvsRouter::new(self.addresses.router, &provider);

        let key = (from.address, to.address);
        let mut candidates = self.candidate_paths(from, to);
        if let Some(cached) = self.path_cache.get(&key) {
            candidates.retain(|p| p != cached.value());
            candidates.insert(0, cached.value().clone());
        }

        for path in candidates {
            let quoted = match kind {
                SwapKind::ExactIn => router
                    .getAmountsOut(amount, path.clone())
                    .call()
                    .await
                    .map(|r| r.amounts),
                SwapKind::ExactOut => router
                    .getAmountsIn(amount, path.clone())
                    .call()
                    .await
                    .map(|r| r.amounts),
            };
            match quoted {
                Ok(amounts) if amounts.len() == path.len() => {
                    debug!(hops = path.len() - 1, "Found working VVS path");
                    self.path_cache.insert(key, path.clone());
                    return Ok((path, amounts));
                }
                Ok(_) => debug!("Router returned malformed amounts"),
                Err(e) => debug!(error = %e, "Path not available"),
            }
        }

        anyhow::bail!("No valid VVS path from {:?} to {:?}", from.address, to.address)
    }

    async fn ensure_allowance(&self, token: Address, required: U256) -> Result<()> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let erc20 = IERC20::new(token, &provider);
        let current = erc20
            .allowance(self.sender.address, self.addresses.router)
            .call()
            .await?
            ._0;
        if current >= required {
            return Ok(());
        }
        let calldata = IERC20::approveCall {
            spender: self.addresses.router,
            amount: required,
        }
        .abi_encode();
        self.sender
            .send(token, calldata.into(), U256::ZERO, "approve")
            .await?;
        Ok(())
    }

    fn deadline(&self) -> U256 {
        let now = chrono::Utc::now().timestamp();
        U256::from((now + self.deadline_secs).max(0) as u64)
    }
}

/// Calldata and native value for a router call.
#[allow(clippy::too_many_arguments)]
fn encode_swap(
    from: &TokenInfo,
    to: &TokenInfo,
    kind: SwapKind,
    amount_in: U256,
    amount_out: U256,
    path: Vec<Address>,
    recipient: Address,
    deadline: U256,
) -> (Bytes, U256) {
    let calldata = match (kind, from.native, to.native) {
        (SwapKind::ExactIn, true, _) => IVvsRouter::swapExactETHForTokensCall {
            amountOutMin: amount_out,
            path,
            to: recipient,
            deadline,
        }
        .abi_encode(),
        (SwapKind::ExactOut, true, _) => IVvsRouter::swapETHForExactTokensCall {
            amountOut: amount_out,
            path,
            to: recipient,
            deadline,
        }
        .abi_encode(),
        (SwapKind::ExactIn, false, true) => IVvsRouter::swapExactTokensForETHCall {
            amountIn: amount_in,
            amountOutMin: amount_out,
            path,
            to: recipient,
            deadline,
        }
        .abi_encode(),
        (SwapKind::ExactOut, false, true) => IVvsRouter::swapTokensForExactETHCall {
            amountOut: amount_out,
            amountInMax: amount_in,
            path,
            to: recipient,
            deadline,
        }
        .abi_encode(),
        (SwapKind::ExactIn, false, false) => IVvsRouter::swapExactTokensForTokensCall {
            amountIn: amount_in,
            amountOutMin: amount_out,
            path,
            to: recipient,
            deadline,
        }
        .abi_encode(),
        (SwapKind::ExactOut, false, false) => IVvsRouter::swapTokensForExactTokensCall {
            amountOut: amount_out,
            amountInMax: amount_in,
            path,
            to: recipient,
            deadline,
        }
        .abi_encode(),
    };
    let value = if from.native { amount_in } else { U256::ZERO };
    (calldata.into(), value)
}

#[async_trait]
impl SwapExecutor for VvsSwapper {
    fn executor_id(&self) -> &str {
        "vvs"
    }

    #[instrument(skip(self), fields(from = %request.from_asset, to = %request.to_asset))]
    async fn swap(&self, request: SwapRequest) -> Result<SwapOutcome> {
        let from = self.tokens.resolve(&request.from_asset)?;
        let to = self.tokens.resolve(&request.to_asset)?;
        if from.address == to.address {
            anyhow::bail!("From and to tokens are identical; nothing to swap");
        }

        // Exact-input when the caller fixed the input, exact-output otherwise.
        let (kind, amount_in, amount_out, path) = match request.amount_in {
            Some(amount_in) => {
                let amount_in = decimal_to_units(amount_in, from.decimals)
                    .context("invalid swap input amount")?;
                let (path, amounts) = self.quote(&from, &to, amount_in, SwapKind::ExactIn).await?;
                let expected = amounts.last().copied().unwrap_or_default();
                (SwapKind::ExactIn, amount_in, apply_basis_points(expected, self.slippage_bps), path)
            }
            None => {
                let amount_out = decimal_to_units(request.amount_out_desired, to.decimals)
                    .context("invalid swap output amount")?;
                let (path, amounts) = self.quote(&from, &to, amount_out, SwapKind::ExactOut).await?;
                let required = amounts.first().copied().unwrap_or_default();
                (SwapKind::ExactOut, apply_basis_points_up(required, self.slippage_bps), amount_out, path)
            }
        };

        if !from.native {
            self.ensure_allowance(from.address, amount_in).await?;
        }

        info!(
            router = %self.addresses.router,
            hops = path.len().saturating_sub(1),
            amount_in = %amount_in,
            amount_out = %amount_out,
            exact_output = kind == SwapKind::ExactOut,
            "Submitting VVS swap"
        );

        let (calldata, value) = encode_swap(&from, &to, kind, amount_in, amount_out, path, request.recipient, self.deadline());
        let receipt = self
            .sender
            .send(self.addresses.router, calldata, value, "swap")
            .await?;

        // Exact-output fills exactly; exact-input is guaranteed at least the minimum.
        let amount_out = units_to_decimal(amount_out, to.decimals)?;
        Ok(SwapOutcome::Filled {
            tx_hash: receipt.transaction_hash,
            amount_out,
        })
    }
}
