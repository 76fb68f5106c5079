//! Position monitoring.
//!
//! [`RiskEngine::monitor`] takes one snapshot and hands it to an observer.
//! [`PositionMonitor`] polls a set of accounts on an interval, logs status
//! transitions and optionally triggers auto-repay.

use crate::auto_repay::{AutoRepayResult, AutoRepayer};
use crate::config::MonitorConfig;
use crate::error::RiskError;
use crate::health::RiskEngine;
use crate::metrics::{HealthMetrics, RiskStatus};
use alloy::primitives::Address;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// Receives every health snapshot the monitor takes.
///
/// Called synchronously; errors and panics are logged and swallowed.
pub trait HealthObserver: Send + Sync {
    fn on_health(&self, metrics: &HealthMetrics) -> anyhow::Result<()>;
}

impl<F> HealthObserver for F
where
    F: Fn(&HealthMetrics) -> anyhow::Result<()> + Send + Sync,
{
    fn on_health(&self, metrics: &HealthMetrics) -> anyhow::Result<()> {
        self(metrics)
    }
}

fn notify(observer: &dyn HealthObserver, metrics: &HealthMetrics) {
    match catch_unwind(AssertUnwindSafe(|| observer.on_health(metrics))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(account = %metrics.account, error = %e, "Health observer failed"),
        Err(_) => error!(account = %metrics.account, "Health observer panicked"),
    }
}

fn log_snapshot(m: &HealthMetrics) {
    match m.status {
        RiskStatus::Healthy => info!(
            account = %m.account,
            hf = %m.health_factor,
            collateral_usd = %m.total_collateral_usd,
            borrow_usd = %m.total_borrow_usd,
            "Position health check"
        ),
        RiskStatus::Warning => info!(
            account = %m.account,
            hf = %m.health_factor,
            collateral_usd = %m.total_collateral_usd,
            borrow_usd = %m.total_borrow_usd,
            "Position approaching critical threshold"
        ),
        RiskStatus::Critical => warn!(
            account = %m.account,
            hf = %m.health_factor,
            borrow_usd = %m.total_borrow_usd,
            "Position below critical threshold, consider repaying"
        ),
        RiskStatus::Liquidatable => error!(
            account = %m.account,
            hf = %m.health_factor,
            shortfall_usd = %m.shortfall_usd,
            "Position is liquidatable"
        ),
    }
}

impl RiskEngine {
    /// Take a snapshot, log it, and pass it to `observer`.
    ///
    /// The returned metrics are the same whether or not the observer fails.
    #[instrument(skip(self, observer))]
    pub async fn monitor(
        &self,
        account: Address,
        observer: Option<&dyn HealthObserver>,
    ) -> Result<HealthMetrics, RiskError> {
        let metrics = self.health_metrics(account).await?;
        log_snapshot(&metrics);
        if let Some(observer) = observer {
            notify(observer, &metrics);
        }
        Ok(metrics)
    }
}

/// What one poll observed for one account.
#[derive(Debug)]
pub struct AccountPoll {
    pub account: Address,
    pub result: Result<HealthMetrics, RiskError>,
    /// Status seen on the previous successful poll
    pub previous: Option<RiskStatus>,
    pub auto_repay: Option<AutoRepayResult>,
}

impl AccountPoll {
    pub fn status(&self) -> Option<RiskStatus> {
        self.result.as_ref().ok().map(|m| m.status)
    }

    /// Status differs from the previous poll.
    pub fn transitioned(&self) -> bool {
        matches!((&self.result, self.previous), (Ok(m), prev) if prev != Some(m.status))
    }
}

/// Polls accounts until shut down.
pub struct PositionMonitor {
    engine: RiskEngine,
    accounts: Vec<Address>,
    config: MonitorConfig,
    repayer: Option<Arc<AutoRepayer>>,
    observer: Option<Arc<dyn HealthObserver>>,
    last_status: Mutex<HashMap<Address, RiskStatus>>,
}

impl std::fmt::Debug for PositionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionMonitor")
            .field("accounts", &self.accounts)
            .field("config", &self.config)
            .field("auto_repay", &self.repayer.is_some())
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl PositionMonitor {
    pub fn new(engine: RiskEngine, accounts: Vec<Address>, config: MonitorConfig) -> Self {
        let mut unique = Vec::with_capacity(accounts.len());
        for account in accounts {
            if !unique.contains(&account) {
                unique.push(account);
            }
        }
        Self {
            engine,
            accounts: unique,
            config,
            repayer: None,
            observer: None,
            last_status: Mutex::new(HashMap::new()),
        }
    }

    /// Run auto-repay when an account the repayer can act for turns CRITICAL.
    pub fn with_auto_repay(mut self, repayer: Arc<AutoRepayer>) -> Self {
        self.repayer = Some(repayer);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn HealthObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    /// Last status seen for `account`.
    pub fn last_status(&self, account: &Address) -> Option<RiskStatus> {
        self.last_status.lock().get(account).copied()
    }

    /// Poll on the configured interval until `shutdown` resolves.
    pub async fn run<S>(&self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        info!(
            accounts = self.accounts.len(),
            interval_secs = self.config.poll_interval().as_secs(),
            auto_repay = self.repayer.is_some(),
            "Starting position monitor"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping position monitor");
                    break;
                }
                _ = ticker.tick() => {
                    let polls = self.poll_once().await;
                    let failed = polls.iter().filter(|p| p.result.is_err()).count();
                    debug!(polled = polls.len(), failed, "Poll complete");
                }
            }
        }
    }

    /// Poll every account once with bounded concurrency.
    pub async fn poll_once(&self) -> Vec<AccountPoll> {
        stream::iter(self.accounts.iter().copied())
            .map(|account| self.poll_account(account))
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await
    }

    async fn poll_account(&self, account: Address) -> AccountPoll {
        let metrics = match self.engine.monitor(account, self.observer.as_deref()).await {
            Ok(m) => m,
            Err(e) => {
                warn!(account = %account, error = %e, retryable = e.is_retryable(), "Health poll failed");
                return AccountPoll {
                    account,
                    result: Err(e),
                    previous: self.last_status(&account),
                    auto_repay: None,
                };
            }
        };

        let status = metrics.status;
        let previous = self.last_status.lock().insert(account, status);
        if previous != Some(status) {
            log_transition(account, previous, status, &metrics);
        }

        let mut auto_repay = None;
        if status == RiskStatus::Critical && previous != Some(RiskStatus::Critical) {
            match &self.repayer {
                Some(repayer) if !repayer.can_repay_for(account) => {
                    debug!(account = %account, "Account is not the operator, auto-repay not attempted");
                }
                Some(repayer) => {
                    let source = repayer.strategy().source_asset.clone();
                    let outcome = repayer.auto_repay_if_critical(account, &source, None).await;
                    if outcome.needs_manual_follow_up() {
                        error!(account = %account, ?outcome, "Auto-repay left swapped funds unused");
                    }
                    auto_repay = Some(outcome);
                }
                None => {}
            }
        }

        AccountPoll {
            account,
            result: Ok(metrics),
            previous,
            auto_repay,
        }
    }
}

fn log_transition(
    account: Address,
    previous: Option<RiskStatus>,
    status: RiskStatus,
    metrics: &HealthMetrics,
) {
    match previous {
        None => info!(account = %account, status = %status, hf = %metrics.health_factor, "Tracking position"),
        Some(prev) if status > prev => warn!(
            account = %account,
            from = %prev,
            to = %status,
            hf = %metrics.health_factor,
            "Position health deteriorated"
        ),
        Some(prev) => info!(
            account = %account,
            from = %prev,
            to = %status,
            hf = %metrics.health_factor,
            "Position health improved"
        ),
    }
}
