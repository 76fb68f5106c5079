//! Tectonic (Compound V2 fork) protocol implementation.
//!
//! Implements [`PositionDataSource`], [`LendingOperations`] and
//! [`ProtocolOracle`] for a single tToken market on Cronos.

use super::{AccountLiquidity, LendingOperations, PositionDataSource, ProtocolOracle, TxReceipt};
use crate::contracts::{IERC20, ITToken, ITectonicCore, ITectonicOracle};
use crate::error::{parse_url, ChainError};
use crate::provider::ProviderManager;
use crate::signer::TransactionSender;
use alloy::primitives::{address, Address, U256};
use alloy::providers::ProviderBuilder;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Contract addresses for one Tectonic market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TectonicAddresses {
    /// Core (comptroller)
    pub core: Address,
    /// tToken market, e.g. tUSDC
    pub market: Address,
    /// Underlying ERC-20, e.g. USDC
    pub underlying: Address,
}

impl TectonicAddresses {
    /// USDC market on Cronos mainnet.
    pub fn cronos_mainnet_usdc() -> Self {
        Self {
            core: address!("7De56Bd8b37827c51835e162c867848fE2403a48"),
            market: address!("B3bbf1bE947b245Aef26e3B6a9D777d7703F4c8e"),
            underlying: address!("c21223249CA28397B4B6541dfFaEcC539BfF0c59"),
        }
    }
}

/// Client for one Tectonic market.
///
/// Reads work without a signer; writes require [`TectonicClient::with_sender`].
#[derive(Debug)]
pub struct TectonicClient {
    provider: ProviderManager,
    addresses: TectonicAddresses,
    sender: Option<Arc<TransactionSender>>,
}

impl TectonicClient {
    /// Create a client using the addresses as given.
    pub fn new(provider: ProviderManager, addresses: TectonicAddresses) -> Self {
        Self {
            provider,
            addresses,
            sender: None,
        }
    }

    /// Create a client and verify the deployment.
    ///
    /// The core address is resolved from the market itself
    /// (`tectonicCore()`, then `comptroller()`), falling back to the
    /// configured one. The market's `underlying()` must match configuration.
    pub async fn connect(
        provider: ProviderManager,
        configured: TectonicAddresses,
    ) -> Result<Self, ChainError> {
        let mut client = Self::new(provider, configured);
        client.addresses.core = client.resolve_core().await;
        client.verify_underlying().await?;

        info!(
            core = %client.addresses.core,
            market = %client.addresses.market,
            underlying = %client.addresses.underlying,
            "Tectonic market verified"
        );
        Ok(client)
    }

    /// Attach a signer for state-changing operations.
    pub fn with_sender(mut self, sender: Arc<TransactionSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn addresses(&self) -> &TectonicAddresses {
        &self.addresses
    }

    pub fn provider(&self) -> &ProviderManager {
        &self.provider
    }

    fn http(&self) -> Result<impl alloy::providers::Provider, ChainError> {
        Ok(ProviderBuilder::new().on_http(parse_url(self.provider.rpc_url())?))
    }

    fn require_sender(&self, operation: &'static str) -> Result<&TransactionSender, ChainError> {
        self.sender
            .as_deref()
            .ok_or(ChainError::MissingSigner(operation))
    }

    async fn resolve_core(&self) -> Address {
        let configured = self.addresses.core;
        let provider = match self.http() {
            Ok(p) => p,
            Err(_) => return configured,
        };
        let ttoken = ITToken::new(self.addresses.market, &provider);

        match ttoken.tectonicCore().call().await {
            Ok(ret) if !ret._0.is_zero() => return ret._0,
            Ok(_) => {}
            Err(e) => debug!(error = %e, "tectonicCore() unavailable"),
        }
        match ttoken.comptroller().call().await {
            Ok(ret) if !ret._0.is_zero() => return ret._0,
            Ok(_) => {}
            Err(e) => debug!(error = %e, "comptroller() unavailable"),
        }

        warn!(core = %configured, "Could not resolve core from market, using configured address");
        configured
    }

    /// Check that the market wraps the configured underlying token.
    pub async fn verify_underlying(&self) -> Result<(), ChainError> {
        let provider = self.http()?;
        let ttoken = ITToken::new(self.addresses.market, &provider);
        let actual = ttoken.underlying().call().await.map_err(ChainError::rpc)?._0;
        if actual != self.addresses.underlying {
            return Err(ChainError::Deployment(format!(
                "market {} wraps {actual}, expected {}",
                self.addresses.market, self.addresses.underlying
            )));
        }
        Ok(())
    }

    /// Collateral factor mantissa (1e18-scaled) of the market.
    pub async fn collateral_factor(&self) -> Result<U256, ChainError> {
        let provider = self.http()?;
        let core = ITectonicCore::new(self.addresses.core, &provider);
        let market = core
            .markets(self.addresses.market)
            .call()
            .await
            .map_err(ChainError::rpc)?;
        if !market.isListed {
            return Err(ChainError::Deployment(format!(
                "market {} is not listed",
                self.addresses.market
            )));
        }
        Ok(market.collateralFactorMantissa)
    }

    /// Wallet balance of the underlying token.
    pub async fn underlying_balance(&self, account: Address) -> Result<U256, ChainError> {
        let provider = self.http()?;
        let token = IERC20::new(self.addresses.underlying, &provider);
        Ok(token.balanceOf(account).call().await.map_err(ChainError::rpc)?._0)
    }

    /// Approve exactly `required` when the current allowance is lower.
    async fn ensure_allowance(&self, sender: &TransactionSender, required: U256) -> Result<(), ChainError> {
        let provider = self.http()?;
        let token = IERC20::new(self.addresses.underlying, &provider);
        let current = token
            .allowance(sender.address, self.addresses.market)
            .call()
            .await
            .map_err(ChainError::rpc)?
            ._0;
        if current >= required {
            return Ok(());
        }

        debug!(current = %current, required = %required, "Raising allowance");
        let calldata = IERC20::approveCall {
            spender: self.addresses.market,
            amount: required,
        }
        .abi_encode();
        sender
            .send(self.addresses.underlying, calldata.into(), U256::ZERO, "approve")
            .await?;
        Ok(())
    }
}

/// Map a Compound error code to a result.
fn check_code(operation: &'static str, code: U256) -> Result<(), ChainError> {
    if code.is_zero() {
        Ok(())
    } else {
        Err(ChainError::ProtocolRejected {
            operation,
            code: code.saturating_to::<u64>(),
        })
    }
}

#[async_trait]
impl PositionDataSource for TectonicClient {
    fn market(&self) -> Address {
        self.addresses.market
    }

    async fn account_liquidity(&self, account: Address) -> Result<AccountLiquidity, ChainError> {
        let provider = self.http()?;
        let core = ITectonicCore::new(self.addresses.core, &provider);
        let ret = core
            .getAccountLiquidity(account)
            .call()
            .await
            .map_err(ChainError::rpc)?;
        Ok(AccountLiquidity {
            error: ret._0,
            liquidity: ret._1,
            shortfall: ret._2,
        })
    }

    async fn supplied_balance(&self, account: Address) -> Result<U256, ChainError> {
        let provider = self.http()?;
        let ttoken = ITToken::new(self.addresses.market, &provider);
        Ok(ttoken.balanceOf(account).call().await.map_err(ChainError::rpc)?._0)
    }

    async fn borrow_balance(&self, account: Address) -> Result<U256, ChainError> {
        let provider = self.http()?;
        let ttoken = ITToken::new(self.addresses.market, &provider);
        Ok(ttoken
            .borrowBalanceCurrent(account)
            .call()
            .await
            .map_err(ChainError::rpc)?
            ._0)
    }

    async fn exchange_rate(&self) -> Result<U256, ChainError> {
        let provider = self.http()?;
        let ttoken = ITToken::new(self.addresses.market, &provider);
        Ok(ttoken
            .exchangeRateStored()
            .call()
            .await
            .map_err(ChainError::rpc)?
            ._0)
    }

    async fn entered_markets(&self, account: Address) -> Result<SmallVec<[Address; 4]>, ChainError> {
        let provider = self.http()?;
        let core = ITectonicCore::new(self.addresses.core, &provider);
        let ret = core.getAssetsIn(account).call().await.map_err(ChainError::rpc)?;
        Ok(ret._0.into_iter().collect())
    }
}

#[async_trait]
impl LendingOperations for TectonicClient {
    fn operator(&self) -> Option<Address> {
        self.sender.as_ref().map(|s| s.address)
    }

    #[instrument(skip(self), fields(market = %self.addresses.market))]
    async fn supply(&self, amount: U256) -> Result<TxReceipt, ChainError> {
        let sender = self.require_sender("mint")?;
        self.ensure_allowance(sender, amount).await?;

        let provider = self.http()?;
        let ttoken = ITToken::new(self.addresses.market, &provider);
        let code = ttoken
            .mint(amount)
            .from(sender.address)
            .call()
            .await
            .map_err(ChainError::rpc)?
            ._0;
        check_code("mint", code)?;

        let calldata = ITToken::mintCall { mintAmount: amount }.abi_encode();
        sender
            .send(self.addresses.market, calldata.into(), U256::ZERO, "mint")
            .await
    }

    #[instrument(skip(self, markets), fields(count = markets.len()))]
    async fn enter_markets(&self, markets: &[Address]) -> Result<Option<TxReceipt>, ChainError> {
        let sender = self.require_sender("enterMarkets")?;
        let existing = self.entered_markets(sender.address).await?;
        let targets: Vec<Address> = markets
            .iter()
            .copied()
            .filter(|m| !existing.contains(m))
            .collect();
        if targets.is_empty() {
            debug!("All markets already entered");
            return Ok(None);
        }

        let provider = self.http()?;
        let core = ITectonicCore::new(self.addresses.core, &provider);
        let codes = core
            .enterMarkets(targets.clone())
            .from(sender.address)
            .call()
            .await
            .map_err(ChainError::rpc)?
            ._0;
        for code in codes {
            check_code("enterMarkets", code)?;
        }

        let calldata = ITectonicCore::enterMarketsCall { tTokens: targets }.abi_encode();
        sender
            .send(self.addresses.core, calldata.into(), U256::ZERO, "enterMarkets")
            .await
            .map(Some)
    }

    #[instrument(skip(self), fields(market = %self.addresses.market))]
    async fn borrow(&self, amount: U256) -> Result<TxReceipt, ChainError> {
        let sender = self.require_sender("borrow")?;
        let provider = self.http()?;
        let ttoken = ITToken::new(self.addresses.market, &provider);
        let code = ttoken
            .borrow(amount)
            .from(sender.address)
            .call()
            .await
            .map_err(ChainError::rpc)?
            ._0;
        check_code("borrow", code)?;

        let calldata = ITToken::borrowCall { borrowAmount: amount }.abi_encode();
        sender
            .send(self.addresses.market, calldata.into(), U256::ZERO, "borrow")
            .await
    }

    #[instrument(skip(self), fields(market = %self.addresses.market))]
    async fn repay(&self, amount: U256) -> Result<TxReceipt, ChainError> {
        let sender = self.require_sender("repayBorrow")?;
        self.ensure_allowance(sender, amount).await?;

        let provider = self.http()?;
        let ttoken = ITToken::new(self.addresses.market, &provider);
        let code = ttoken
            .repayBorrow(amount)
            .from(sender.address)
            .call()
            .await
            .map_err(ChainError::rpc)?
            ._0;
        check_code("repayBorrow", code)?;

        let calldata = ITToken::repayBorrowCall { repayAmount: amount }.abi_encode();
        sender
            .send(self.addresses.market, calldata.into(), U256::ZERO, "repayBorrow")
            .await
    }

    #[instrument(skip(self), fields(market = %self.addresses.market))]
    async fn withdraw(&self, amount: U256) -> Result<TxReceipt, ChainError> {
        let sender = self.require_sender("redeemUnderlying")?;
        let provider = self.http()?;
        let ttoken = ITToken::new(self.addresses.market, &provider);
        let code = ttoken
            .redeemUnderlying(amount)
            .from(sender.address)
            .call()
            .await
            .map_err(ChainError::rpc)?
            ._0;
        check_code("redeemUnderlying", code)?;

        let calldata = ITToken::redeemUnderlyingCall { redeemAmount: amount }.abi_encode();
        sender
            .send(self.addresses.market, calldata.into(), U256::ZERO, "redeemUnderlying")
            .await
    }
}

#[async_trait]
impl ProtocolOracle for TectonicClient {
    async fn underlying_price(&self, market: Address) -> Result<U256, ChainError> {
        let provider = self.http()?;
        let core = ITectonicCore::new(self.addresses.core, &provider);
        let oracle_address = core.oracle().call().await.map_err(ChainError::rpc)?._0;
        let oracle = ITectonicOracle::new(oracle_address, &provider);
        Ok(oracle
            .getUnderlyingPrice(market)
            .call()
            .await
            .map_err(ChainError::rpc)?
            ._0)
    }
}
