//! Configuration Module
//!
//! This module defines all configuration structures for the ledger node.
//! Configuration is loaded from TOML files and parsed using serde.

use serde::Deserialize;
use std::fs;

/// Main configuration structure
///
/// Loaded from a TOML file (e.g., config/default.toml). Every section has defaults, so an
/// empty file is a valid configuration.
///
/// # Example TOML
/// ```toml
/// [settlement]
/// block_reward = 50
/// empty_blocks = "skip"
/// interval_ms = 5000
/// settle_on_submit = true
///
/// [accounts]
/// initial_balance = 500
///
/// [api]
/// host = "127.0.0.1"
/// port = 8545
/// operators = ["registrar"]
///
/// [[genesis_accounts]]
/// id = "faculty-1"
/// public_key = "04..."
/// balance = 1000
/// staked_balance = 100
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub settlement: SettlementConfig,
    pub accounts: AccountsConfig,
    pub api: ApiConfig,
    pub genesis_accounts: Vec<GenesisAccount>,
}

/// Whether a round with zero validated transfers still appends a block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyBlockPolicy {
    /// No block is produced; the chain only grows when something settles
    #[default]
    Skip,
    /// An empty block is appended (never rewarded)
    Append,
}

/// Settlement round configuration
///
/// # Fields
/// - `block_reward`: Credit minted to the validator of a block with at least one transfer
/// - `empty_blocks`: Policy for rounds where nothing validates
/// - `interval_ms`: Period of the background settlement loop (0 disables it)
/// - `settle_on_submit`: Run a round right after each accepted submission
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    pub block_reward: u64,
    pub empty_blocks: EmptyBlockPolicy,
    pub interval_ms: u64,
    pub settle_on_submit: bool,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            block_reward: 50,
            empty_blocks: EmptyBlockPolicy::Skip,
            interval_ms: 5000,
            settle_on_submit: true,
        }
    }
}

/// Account registration settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    /// Balance granted to every newly registered account
    pub initial_balance: u64,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self { initial_balance: 500 }
    }
}

/// API server configuration
///
/// # Fields
/// - `host`: IP address to bind to (e.g., "127.0.0.1" or "0.0.0.0")
/// - `port`: TCP port to listen on (e.g., 8545)
/// - `operators`: Caller ids allowed to run operator methods such as `resumeChain`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub operators: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8545,
            operators: Vec::new(),
        }
    }
}

/// Account seeded into the store at startup
#[derive(Debug, Clone, Deserialize)]
pub struct GenesisAccount {
    pub id: String,
    pub public_key: String,
    pub balance: u64,
    #[serde(default)]
    pub staked_balance: u64,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Returns
    /// * `Ok(Config)` if the file was successfully loaded and parsed
    /// * `Err` if the file couldn't be read or the TOML is invalid
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}
