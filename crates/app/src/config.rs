//! Configuration loading and validation for asset-stats.
//!
//! Configuration comes from a TOML file, with environment variables
//! (prefixed `ASSET_STATS_`) taking precedence over file values.
//!
//! | Section | Description |
//! |---------|-------------|
//! | `network` | Network passphrase used to derive asset contract IDs |
//! | `database` | SQLite database path and connection pool |
//! | `ingest` | Working-set batch size for incremental ingestion |
//! | `logging` | Log level and format |
//!
//! # Example Configuration
//!
//! ```toml
//! [network]
//! passphrase = "Test SDF Network ; September 2015"
//!
//! [database]
//! path = "/var/lib/asset-stats/asset-stats.db"
//!
//! [ingest]
//! batch_size = 1000
//! ```
//!
//! # Environment Overrides
//!
//! - `ASSET_STATS_NETWORK_PASSPHRASE` - Network passphrase
//! - `ASSET_STATS_DATABASE_PATH` - Database file path
//! - `ASSET_STATS_BATCH_SIZE` - Ingest batch size
//! - `ASSET_STATS_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
//! - `ASSET_STATS_LOG_FORMAT` - Log format (text, json)

use std::path::{Path, PathBuf};

use anyhow::Context;
use asset_stats_common::network::{MAINNET_PASSPHRASE, TESTNET_PASSPHRASE};
use asset_stats_common::NetworkId;
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "ASSET_STATS_";

/// Main application configuration.
///
/// Load it with [`AppConfig::from_file_with_env`] and call
/// [`AppConfig::validate`] before use. [`AppConfig::default`] targets
/// testnet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network passphrase. Asset contract IDs are derived from its hash.
    pub passphrase: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::testnet()
    }
}

impl NetworkConfig {
    pub fn testnet() -> Self {
        Self {
            passphrase: TESTNET_PASSPHRASE.to_string(),
        }
    }

    pub fn mainnet() -> Self {
        Self {
            passphrase: MAINNET_PASSPHRASE.to_string(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_size: default_pool_size(),
        }
    }
}

/// Ingestion tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum number of distinct assets held in the classic working set
    /// before the runner reconciles it mid-ledger.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text or json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("asset-stats.db")
}

fn default_pool_size() -> u32 {
    asset_stats_db::DEFAULT_POOL_SIZE
}

fn default_batch_size() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl AppConfig {
    pub fn testnet() -> Self {
        Self::default()
    }

    pub fn mainnet() -> Self {
        Self {
            network: NetworkConfig::mainnet(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration, then apply `ASSET_STATS_*` overrides.
    pub fn from_file_with_env(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Apply overrides from `lookup`, which receives the key without the
    /// `ASSET_STATS_` prefix.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("NETWORK_PASSPHRASE") {
            self.network.passphrase = val;
        }
        if let Some(val) = lookup("DATABASE_PATH") {
            self.database.path = PathBuf::from(val);
        }
        if let Some(val) = lookup("BATCH_SIZE") {
            self.ingest.batch_size = val
                .parse()
                .with_context(|| format!("{ENV_PREFIX}BATCH_SIZE is not a number: {val:?}"))?;
        }
        if let Some(val) = lookup("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = lookup("LOG_FORMAT") {
            self.logging.format = val;
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.network.passphrase.trim().is_empty() {
            anyhow::bail!("network.passphrase must not be empty");
        }
        if self.database.path.as_os_str().is_empty() {
            anyhow::bail!("database.path must not be empty");
        }
        if self.database.pool_size == 0 {
            anyhow::bail!("database.pool_size must be > 0");
        }
        if self.ingest.batch_size == 0 {
            anyhow::bail!("ingest.batch_size must be > 0");
        }
        crate::logging::parse_level(&self.logging.level)?;
        crate::logging::LogFormat::parse(&self.logging.format)?;
        Ok(())
    }

    pub fn network_id(&self) -> NetworkId {
        NetworkId::from_passphrase(&self.network.passphrase)
    }

    /// Generate a sample configuration file.
    pub fn sample_config() -> String {
        toml::to_string_pretty(&Self::testnet()).unwrap_or_default()
    }
}
