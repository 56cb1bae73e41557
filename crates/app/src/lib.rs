//! Application layer for asset-stats.
//!
//! - **Configuration**: TOML files with `ASSET_STATS_*` environment
//!   overrides ([`config`] module)
//! - **Logging**: tracing subscriber setup in text or JSON ([`logging`])
//! - **Ingestion passes**: snapshot and per-ledger runs against the SQLite
//!   index, including the mid-ledger batch-size policy ([`runner`])
//!
//! # Usage
//!
//! ```no_run
//! use asset_stats_app::{AppConfig, Runner};
//!
//! let config = AppConfig::from_file_with_env("asset-stats.toml")?;
//! let runner = Runner::open(config)?;
//! runner.ingest_snapshot_file(1000, "snapshot.xdr")?;
//! runner.ingest_ledger_file(1001, "ledger-1001.xdr")?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod config;
pub mod logging;
pub mod runner;

pub use config::AppConfig;
pub use logging::{LogConfig, LogFormat};
pub use runner::{AssetReport, IngestReport, Runner};
