//! asset-stats - per-asset holder and balance aggregates for a Stellar ledger
//! index.
//!
//! ## Usage
//!
//! ```text
//! asset-stats new-db                                  # Create the database
//! asset-stats ingest-snapshot --ledger 1000 snap.xdr  # Build the index from a snapshot
//! asset-stats ingest-ledger --ledger 1001 1001.xdr    # Apply one ledger's changes
//! asset-stats show-asset USD:GABC...                  # Print an asset's aggregates
//! asset-stats sample-config > asset-stats.toml
//! ```
//!
//! Input files are streams of size-prefixed XDR frames: `LedgerEntry` values
//! for snapshots, `LedgerEntryChange` values for ledgers.

use std::path::PathBuf;

use asset_stats_app::{logging, AppConfig, IngestReport, LogConfig, LogFormat, Runner};
use asset_stats_common::AssetIdentity;
use clap::{Parser, Subcommand};

/// Asset aggregate indexer for Stellar ledgers.
#[derive(Parser)]
#[command(name = "asset-stats")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging
    #[arg(long, global = true)]
    trace: bool,

    /// Log output format
    #[arg(long, global = true)]
    log_format: Option<CliLogFormat>,

    /// Use the mainnet passphrase when no config file is given
    #[arg(long, global = true)]
    mainnet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum CliLogFormat {
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new database
    NewDb {
        /// Path to the database file (overrides config)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },

    /// Build the index from a full ledger snapshot
    IngestSnapshot {
        /// Ledger the snapshot was taken at
        #[arg(long)]
        ledger: u32,

        /// Framed LedgerEntry stream
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Apply one ledger's entry changes
    IngestLedger {
        /// Sequence of the ledger being applied
        #[arg(long)]
        ledger: u32,

        /// Framed LedgerEntryChange stream
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the stored aggregates of an asset
    ShowAsset {
        /// `native` or `CODE:ISSUER`
        #[arg(value_name = "ASSET")]
        asset: AssetIdentity,
    },

    /// Print a sample configuration file
    SampleConfig,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::SampleConfig) {
        print!("{}", AppConfig::sample_config());
        return Ok(());
    }

    let config = load_config(&cli)?;
    init_logging(&cli, &config)?;
    if let Some(path) = &cli.config {
        tracing::info!(path = %path.display(), "Loaded configuration");
    }

    match cli.command {
        Commands::NewDb { path } => cmd_new_db(config, path),
        Commands::IngestSnapshot { ledger, file } => {
            let report = Runner::open(config)?.ingest_snapshot_file(ledger, &file)?;
            print_report(&report);
            Ok(())
        }
        Commands::IngestLedger { ledger, file } => {
            let report = Runner::open(config)?.ingest_ledger_file(ledger, &file)?;
            print_report(&report);
            Ok(())
        }
        Commands::ShowAsset { asset } => {
            let report = Runner::open(config)?.asset_report(&asset)?;
            println!("{report}");
            Ok(())
        }
        Commands::SampleConfig => Ok(()),
    }
}

/// CLI flags take precedence over the `[logging]` section.
fn init_logging(cli: &Cli, config: &AppConfig) -> anyhow::Result<()> {
    let mut log = LogConfig::from_config(&config.logging)?;
    if cli.trace {
        log = log.with_level("trace");
    } else if cli.verbose {
        log = log.with_level("debug");
    }
    if let Some(format) = cli.log_format {
        log = log.with_format(format.into());
    }

    logging::init(&log)?;
    tracing::debug!("Logging initialized");
    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let config = match &cli.config {
        Some(path) => AppConfig::from_file_with_env(path)?,
        None => {
            let mut config = if cli.mainnet {
                AppConfig::mainnet()
            } else {
                AppConfig::testnet()
            };
            config.apply_env_overrides()?;
            config
        }
    };
    config.validate()?;
    Ok(config)
}

fn cmd_new_db(mut config: AppConfig, path: Option<PathBuf>) -> anyhow::Result<()> {
    if let Some(path) = path {
        config.database.path = path;
    }
    let db_path = config.database.path.clone();
    if db_path.exists() {
        anyhow::bail!("database already exists at {}", db_path.display());
    }

    let runner = Runner::open(config)?;
    runner.init_database()?;
    println!("Database created at: {}", db_path.display());
    Ok(())
}

fn print_report(report: &IngestReport) {
    let summary = &report.summary;
    println!(
        "ledger {} ({}): {} changes, classic rows +{} ~{} -{}, contract rows +{} ~{} -{}, \
         {} asset contracts, {} restored and {} archived balances",
        report.ledger,
        report.mode,
        report.changes,
        summary.classic.inserted,
        summary.classic.updated,
        summary.classic.removed,
        summary.contracts.inserted,
        summary.contracts.updated,
        summary.contracts.removed,
        summary.asset_contracts,
        summary.restored_balances,
        summary.expired_balances,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_sample_config() {
        let cli = Cli::parse_from(["asset-stats", "sample-config"]);
        assert!(matches!(cli.command, Commands::SampleConfig));
    }

    #[test]
    fn test_cli_ingest_ledger() {
        let cli = Cli::parse_from(["asset-stats", "ingest-ledger", "--ledger", "1001", "l.xdr"]);
        match cli.command {
            Commands::IngestLedger { ledger, file } => {
                assert_eq!(ledger, 1001);
                assert_eq!(file, PathBuf::from("l.xdr"));
            }
            _ => panic!("Expected IngestLedger command"),
        }
    }

    #[test]
    fn test_cli_ingest_snapshot_requires_ledger() {
        assert!(Cli::try_parse_from(["asset-stats", "ingest-snapshot", "s.xdr"]).is_err());
    }

    #[test]
    fn test_cli_show_asset_parses_identity() {
        let issuer = "GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAWHF";
        let arg = format!("USD:{issuer}");
        let cli = Cli::parse_from(["asset-stats", "show-asset", arg.as_str()]);
        match cli.command {
            Commands::ShowAsset { asset } => {
                assert_eq!(asset, AssetIdentity::credit("USD", issuer).unwrap());
            }
            _ => panic!("Expected ShowAsset command"),
        }
        assert!(Cli::try_parse_from(["asset-stats", "show-asset", "USD"]).is_err());
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::parse_from([
            "asset-stats",
            "--verbose",
            "--log-format",
            "json",
            "--mainnet",
            "new-db",
        ]);
        assert!(cli.verbose);
        assert!(cli.mainnet);
        assert!(matches!(cli.log_format, Some(CliLogFormat::Json)));
        assert!(matches!(cli.command, Commands::NewDb { path: None }));
    }

    #[test]
    fn test_load_config_mainnet_flag() {
        let cli = Cli::parse_from(["asset-stats", "--mainnet", "new-db"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(
            config.network_id(),
            asset_stats_common::NetworkId::mainnet()
        );
    }
}
