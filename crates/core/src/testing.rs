//! In-memory collaborators for unit tests.

use alloy::primitives::{Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use smallvec::SmallVec;
use std::sync::Arc;
use tectonic_api::{PriceFeed, SwapExecutor, SwapOutcome, SwapRequest};
use tectonic_chain::units::WAD;
use tectonic_chain::{
    AccountLiquidity, ChainError, LendingOperations, PositionDataSource, ProtocolOracle,
    TectonicAddresses, TxReceipt, REPAY_ALL,
};

/// Whole USDC to raw 6-decimal units.
pub fn usdc(amount: u64) -> U256 {
    U256::from(amount) * U256::from(1_000_000u64)
}

/// Signer account of [`MockOps`]; [`MockSource`] positions belong to it
/// unless [`MockSource::held_by`] says otherwise.
pub fn operator() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn market() -> Address {
    TectonicAddresses::cronos_mainnet_usdc().market
}

pub fn receipt(tag: u8) -> TxReceipt {
    TxReceipt {
        status: true,
        transaction_hash: B256::repeat_byte(tag),
        gas_used: 100_000,
    }
}

#[derive(Debug)]
struct SourceState {
    liquidity: AccountLiquidity,
    supplied: U256,
    borrow: U256,
    exchange_rate: Option<U256>,
    entered: SmallVec<[Address; 4]>,
    fail_reads: bool,
}

/// Position source backed by mutable in-memory state.
#[derive(Debug)]
pub struct MockSource {
    market: Address,
    holder: Address,
    queried: Mutex<Vec<Address>>,
    state: Mutex<SourceState>,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSource {
    /// Empty position with a 1:1 exchange rate.
    pub fn new() -> Self {
        Self {
            market: market(),
            holder: operator(),
            queried: Mutex::new(Vec::new()),
            state: Mutex::new(SourceState {
                liquidity: AccountLiquidity {
                    error: U256::ZERO,
                    liquidity: U256::ZERO,
                    shortfall: U256::ZERO,
                },
                supplied: U256::ZERO,
                borrow: U256::ZERO,
                exchange_rate: Some(WAD),
                entered: SmallVec::new(),
                fail_reads: false,
            }),
        }
    }

    /// Give the position to `holder`; other accounts read as empty.
    pub fn held_by(mut self, holder: Address) -> Self {
        self.holder = holder;
        self
    }

    /// Accounts passed to the position reads, in call order.
    pub fn queried(&self) -> Vec<Address> {
        self.queried.lock().clone()
    }

    pub fn with_liquidity(mut self, liquidity: U256) -> Self {
        self.state.get_mut().liquidity.liquidity = liquidity;
        self
    }

    pub fn with_shortfall(mut self, shortfall: U256) -> Self {
        self.state.get_mut().liquidity.shortfall = shortfall;
        self
    }

    pub fn with_liquidity_error(mut self, code: U256) -> Self {
        self.state.get_mut().liquidity.error = code;
        self
    }

    pub fn with_supplied(mut self, supplied: U256) -> Self {
        self.state.get_mut().supplied = supplied;
        self
    }

    pub fn with_borrow(mut self, borrow: U256) -> Self {
        self.state.get_mut().borrow = borrow;
        self
    }

    /// `None` makes `exchange_rate` fail.
    pub fn with_exchange_rate(mut self, rate: Option<U256>) -> Self {
        self.state.get_mut().exchange_rate = rate;
        self
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    pub fn enter_market(&self) {
        let mut state = self.state.lock();
        if !state.entered.contains(&self.market) {
            state.entered.push(self.market);
        }
    }

    pub fn set_borrow(&self, borrow: U256) {
        self.state.lock().borrow = borrow;
    }

    pub fn borrow(&self) -> U256 {
        self.state.lock().borrow
    }

    pub fn supplied(&self) -> U256 {
        self.state.lock().supplied
    }

    fn read<T>(&self, f: impl FnOnce(&SourceState) -> T) -> Result<T, ChainError> {
        let state = self.state.lock();
        if state.fail_reads {
            return Err(ChainError::rpc("connection refused"));
        }
        Ok(f(&state))
    }

    /// Read a per-account value; accounts other than the holder get `empty`.
    fn read_for<T>(
        &self,
        account: Address,
        empty: T,
        f: impl FnOnce(&SourceState) -> T,
    ) -> Result<T, ChainError> {
        self.queried.lock().push(account);
        let value = self.read(f)?;
        Ok(if account == self.holder { value } else { empty })
    }
}

#[async_trait]
impl PositionDataSource for MockSource {
    fn market(&self) -> Address {
        self.market
    }

    async fn account_liquidity(&self, account: Address) -> Result<AccountLiquidity, ChainError> {
        let empty = AccountLiquidity {
            error: U256::ZERO,
            liquidity: U256::ZERO,
            shortfall: U256::ZERO,
        };
        self.read_for(account, empty, |s| s.liquidity)
    }

    async fn supplied_balance(&self, account: Address) -> Result<U256, ChainError> {
        self.read_for(account, U256::ZERO, |s| s.supplied)
    }

    async fn borrow_balance(&self, account: Address) -> Result<U256, ChainError> {
        self.read_for(account, U256::ZERO, |s| s.borrow)
    }

    async fn exchange_rate(&self) -> Result<U256, ChainError> {
        self.read(|s| s.exchange_rate)?
            .ok_or_else(|| ChainError::rpc("exchangeRateStored reverted"))
    }

    async fn entered_markets(&self, account: Address) -> Result<SmallVec<[Address; 4]>, ChainError> {
        self.read_for(account, SmallVec::new(), |s| s.entered.clone())
    }
}

/// Lending operations signed by [`operator`] that apply their effect to a
/// [`MockSource`]. Like the real tToken calls they act on the signer's own
/// position.
#[derive(Debug)]
pub struct MockOps {
    source: Arc<MockSource>,
    operator: Option<Address>,
    calls: Mutex<Vec<(&'static str, U256)>>,
    failing: Mutex<Option<&'static str>>,
}

impl MockOps {
    pub fn new(source: Arc<MockSource>) -> Self {
        Self {
            source,
            operator: Some(operator()),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(None),
        }
    }

    /// Make the named operation fail with a protocol rejection.
    pub fn fail_on(&self, operation: &'static str) {
        *self.failing.lock() = Some(operation);
    }

    pub fn calls(&self) -> Vec<(&'static str, U256)> {
        self.calls.lock().clone()
    }

    pub fn called(&self, operation: &str) -> bool {
        self.calls.lock().iter().any(|(op, _)| *op == operation)
    }

    fn record(&self, operation: &'static str, amount: U256) -> Result<(), ChainError> {
        if *self.failing.lock() == Some(operation) {
            return Err(ChainError::ProtocolRejected { operation, code: 13 });
        }
        self.calls.lock().push((operation, amount));
        Ok(())
    }

    /// Apply `f` to the source position when it belongs to the operator.
    fn update(&self, f: impl FnOnce(&mut SourceState)) {
        if self.operator == Some(self.source.holder) {
            f(&mut *self.source.state.lock());
        }
    }
}

#[async_trait]
impl LendingOperations for MockOps {
    fn operator(&self) -> Option<Address> {
        self.operator
    }

    async fn supply(&self, amount: U256) -> Result<TxReceipt, ChainError> {
        self.record("supply", amount)?;
        self.update(|s| s.supplied = s.supplied.saturating_add(amount));
        Ok(receipt(1))
    }

    async fn enter_markets(&self, markets: &[Address]) -> Result<Option<TxReceipt>, ChainError> {
        if markets.iter().all(|m| self.source.read(|s| s.entered.contains(m)).unwrap_or(false)) {
            return Ok(None);
        }
        self.record("enter_markets", U256::from(markets.len()))?;
        self.update(|s| {
            if !s.entered.contains(&self.source.market) {
                s.entered.push(self.source.market);
            }
        });
        Ok(Some(receipt(2)))
    }

    async fn borrow(&self, amount: U256) -> Result<TxReceipt, ChainError> {
        self.record("borrow", amount)?;
        self.update(|s| s.borrow = s.borrow.saturating_add(amount));
        Ok(receipt(3))
    }

    async fn repay(&self, amount: U256) -> Result<TxReceipt, ChainError> {
        self.record("repay", amount)?;
        self.update(|s| {
            s.borrow = if amount == REPAY_ALL {
                U256::ZERO
            } else {
                s.borrow.saturating_sub(amount)
            }
        });
        Ok(receipt(4))
    }

    async fn withdraw(&self, amount: U256) -> Result<TxReceipt, ChainError> {
        self.record("withdraw", amount)?;
        self.update(|s| s.supplied = s.supplied.saturating_sub(amount));
        Ok(receipt(5))
    }
}

/// Swap executor returning a canned outcome.
#[derive(Debug)]
pub struct MockSwap {
    outcome: Mutex<Result<SwapOutcome, String>>,
    requests: Mutex<Vec<SwapRequest>>,
}

impl MockSwap {
    pub fn returning(outcome: SwapOutcome) -> Self {
        Self {
            outcome: Mutex::new(Ok(outcome)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Mutex::new(Err(message.to_string())),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<SwapRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl SwapExecutor for MockSwap {
    fn executor_id(&self) -> &str {
        "mock"
    }

    async fn swap(&self, request: SwapRequest) -> Result<SwapOutcome> {
        self.requests.lock().push(request);
        self.outcome.lock().clone().map_err(|e| anyhow::anyhow!(e))
    }
}

/// Protocol oracle with a fixed price.
#[derive(Debug)]
pub struct MockOracle {
    pub price: Option<U256>,
}

#[async_trait]
impl ProtocolOracle for MockOracle {
    async fn underlying_price(&self, _market: Address) -> Result<U256, ChainError> {
        self.price.ok_or_else(|| ChainError::rpc("oracle unavailable"))
    }
}

/// Reference price feed with a fixed quote.
#[derive(Debug)]
pub struct MockFeed {
    pub price: Option<Decimal>,
}

#[async_trait]
impl PriceFeed for MockFeed {
    fn feed_id(&self) -> &str {
        "mock"
    }

    async fn usd_price(&self, symbol: &str) -> Result<Decimal> {
        self.price
            .ok_or_else(|| anyhow::anyhow!("no quote for {}", symbol))
    }
}
