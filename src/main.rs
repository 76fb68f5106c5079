//! Tectonic Risk Agent
//!
//! Watches Tectonic lending positions on Cronos EVM and reacts to risk.
//! Features:
//! - Health factor and safe borrow limit per account
//! - Status transition logging (HEALTHY/WARNING/CRITICAL/LIQUIDATABLE)
//! - Optional auto-repay through VVS Finance swaps
//! - Protocol oracle cross-check against CoinGecko at startup

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tectonic_api::{CoinGeckoClient, VvsSwapper};
use tectonic_chain::units::wad_to_decimal;
use tectonic_chain::{ProviderManager, TectonicClient, TransactionSender};
use tectonic_core::{AgentConfig, AutoRepayer, OracleGuard, PositionMonitor, RiskEngine};

/// Environment variable names.
mod env {
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tectonic_core=debug,tectonic_chain=debug")),
        )
        .init();

    // AGENT_CONFIG names a TOML file, otherwise AGENT_PROFILE selects a profile
    let config = AgentConfig::from_env()?;
    config.log_config();

    info!("Starting Tectonic risk agent");

    let provider =
        ProviderManager::connect(&config.network.rpc_candidates(), config.network.chain_id).await?;
    let mut client = TectonicClient::connect(provider, config.network.tectonic.addresses()).await?;

    // Transaction sender (only needed for auto-repay)
    let sender = match std::env::var(env::PRIVATE_KEY) {
        Ok(key) => Some(Arc::new(TransactionSender::new(
            &key,
            client.provider().rpc_url(),
            config.network.chain_id,
        )?)),
        Err(_) => {
            warn!("{} not set, running read-only", env::PRIVATE_KEY);
            None
        }
    };
    if let Some(sender) = &sender {
        client = client.with_sender(sender.clone());
    }
    let client = Arc::new(client);

    let mut engine = RiskEngine::new(client.clone(), config.risk.clone(), config.market.clone())?;
    if config.market.refresh_collateral_factor {
        match client.collateral_factor().await {
            Ok(mantissa) => {
                let factor = wad_to_decimal(mantissa)?;
                info!(collateral_factor = %factor, "Using on-chain collateral factor");
                engine = engine.with_collateral_factor(factor)?;
            }
            Err(e) => warn!(
                error = %e,
                configured = %config.market.collateral_factor,
                "Could not read collateral factor, using configured value"
            ),
        }
    }

    let guard = OracleGuard::new(
        client.clone(),
        Arc::new(CoinGeckoClient::new()),
        client.addresses().market,
        engine.market_config(),
    );
    let check = guard.check().await;
    if !check.valid {
        warn!(error = ?check.error, "Oracle price check did not pass");
    }

    let mut accounts = config.monitor.accounts.clone();
    if let Some(sender) = &sender {
        accounts.push(sender.address);
    }
    if accounts.is_empty() {
        anyhow::bail!("No accounts to monitor: set monitor.accounts or {}", env::PRIVATE_KEY);
    }

    let mut monitor = PositionMonitor::new(engine.clone(), accounts, config.monitor.clone());
    if config.strategy.auto_repay {
        match &sender {
            Some(sender) => {
                let swapper = Arc::new(VvsSwapper::new(client.provider().rpc_url(), sender.clone()));
                let repayer = AutoRepayer::new(engine, client.clone(), config.strategy.clone())?
                    .with_swap_executor(swapper);
                info!(operator = %sender.address, "Auto-repay enabled for the operator account");
                monitor = monitor.with_auto_repay(Arc::new(repayer));
            }
            None => warn!("Auto-repay enabled but no signer configured, disabling it"),
        }
    }

    monitor
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("Agent stopped");
    Ok(())
}

/// Print startup banner.
fn print_banner() {
    println!(
        r#"
    Tectonic Risk Agent v{}
    Cronos EVM (chain 25)
    "#,
        env!("CARGO_PKG_VERSION")
    );
}
