//! Island Rewards Server
//!
//! Proof-of-work gated Lightning payouts for Satoshi Stacker

use std::sync::Arc;
use std::time::Duration;

use island_rewards::{Config, RewardLedger, RewardService, WithdrawalMode, WithdrawalOrchestrator};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Island Rewards Server");

    let config = Config::load()?;

    let db_path = config.database_path();
    let ledger = Arc::new(
        RewardLedger::new(&db_path)?.with_rate_limit(config.rewards.max_claims_per_hour),
    );
    info!(
        "Claim ledger opened at {} ({} claims recorded)",
        db_path,
        ledger.total_claims()?
    );

    let withdrawals = WithdrawalOrchestrator::from_config(config.pull_payment_config());
    match withdrawals.mode() {
        WithdrawalMode::Dynamic => info!("Withdrawals: per-claim pull payments"),
        WithdrawalMode::Static => info!("Withdrawals: shared static pull payment"),
        WithdrawalMode::Disabled => {
            warn!("Withdrawals disabled: no BTCPay pull payment configuration found")
        }
    }

    let rewards = Arc::new(
        RewardService::new(
            ledger,
            withdrawals,
            Duration::from_secs(config.rewards.challenge_ttl_secs),
        )
        .with_max_pending(config.rewards.max_pending_challenges),
    );

    // Get server config from environment, falling back to config.toml
    let host = std::env::var("REWARDS_HOST").unwrap_or_else(|_| config.server.host.clone());
    let port: u16 = std::env::var("REWARDS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(config.server.port);

    island_rewards::server::run_server(&host, port, rewards).await?;

    Ok(())
}
