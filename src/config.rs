//! Configuration management
//!
//! Loads configuration from config.toml with support for:
//! - BTCPay Server store credentials or a static pull payment
//! - Server binding settings
//! - Claim ledger location
//! - Reward anti-abuse parameters
//!
//! Environment variables take precedence over file values when non-empty.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::claims::DEFAULT_MAX_PENDING_CHALLENGES;
use crate::ledger::DEFAULT_MAX_CLAIMS_PER_HOUR;
use crate::withdrawal::PullPaymentConfig;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub btcpay: BtcPayConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rewards: RewardsConfig,
}

/// BTCPay Server connection. Empty strings mean "not set".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BtcPayConfig {
    pub server_url: String,
    #[serde(default)]
    pub store_id: String,
    #[serde(default)]
    pub api_key: String,
    /// Shared pull payment used when no store credentials are configured
    #[serde(default)]
    pub pull_payment_id: String,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file holding the claim ledger
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "island-rewards.db".to_string(),
        }
    }
}

/// Rewards system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Claim attempts per hour before a pubkey is flagged
    pub max_claims_per_hour: u32,
    /// How long an issued challenge stays redeemable
    pub challenge_ttl_secs: u64,
    /// Always use the static pull payment, even with store credentials
    #[serde(default)]
    pub force_static_pull_payment: bool,
    /// Outstanding challenges kept across all players
    #[serde(default = "default_max_pending_challenges")]
    pub max_pending_challenges: usize,
}

fn default_max_pending_challenges() -> usize {
    DEFAULT_MAX_PENDING_CHALLENGES
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            max_claims_per_hour: DEFAULT_MAX_CLAIMS_PER_HOUR,
            challenge_ttl_secs: 300,
            force_static_pull_payment: false,
            max_pending_challenges: DEFAULT_MAX_PENDING_CHALLENGES,
        }
    }
}

fn env_or(name: &str, fallback: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ if !fallback.trim().is_empty() => Some(fallback.to_string()),
        _ => None,
    }
}

impl Config {
    /// Load from config.toml or use defaults
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Load from specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            Self::parse(&content).context("Failed to parse config file")
        } else {
            // Use embedded default config
            Self::parse(DEFAULT_CONFIG).context("Failed to parse default config")
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Pull-payment settings with BTCPAY_* environment overrides applied
    pub fn pull_payment_config(&self) -> PullPaymentConfig {
        PullPaymentConfig {
            server_url: env_or("BTCPAY_SERVER_URL", &self.btcpay.server_url).unwrap_or_default(),
            store_id: env_or("BTCPAY_STORE_ID", &self.btcpay.store_id),
            api_key: env_or("BTCPAY_API_KEY", &self.btcpay.api_key),
            pull_payment_id: env_or("BTCPAY_PULL_PAYMENT_ID", &self.btcpay.pull_payment_id),
            force_static: self.rewards.force_static_pull_payment,
        }
    }

    /// Ledger path, REWARDS_DB_PATH takes precedence
    pub fn database_path(&self) -> String {
        env_or("REWARDS_DB_PATH", &self.database.path).unwrap_or_else(|| DatabaseConfig::default().path)
    }
}

impl Default for Config {
    fn default() -> Self {
        // The embedded default config is validated by tests,
        // so this should never fail. Using a fallback for robustness.
        Self::parse(DEFAULT_CONFIG).unwrap_or_else(|_| Self {
            btcpay: BtcPayConfig::default(),
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig::default(),
            rewards: RewardsConfig::default(),
        })
    }
}
