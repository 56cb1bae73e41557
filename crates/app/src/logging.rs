//! Logging setup for asset-stats.
//!
//! Installs the global `tracing` subscriber. `RUST_LOG`, when set, takes
//! precedence over the configured level.
//!
//! Two output formats are supported:
//!
//! - **Text** ([`LogFormat::Text`]): human-readable, with optional ANSI colors
//! - **JSON** ([`LogFormat::Json`]): one JSON object per event, for log
//!   aggregation
//!
//! ```no_run
//! use asset_stats_app::logging::{init, LogConfig};
//!
//! init(&LogConfig::default().with_level("debug")).expect("logging");
//! ```

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(format: &str) -> anyhow::Result<Self> {
        match format.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("unknown log format {other:?} (expected text or json)"),
        }
    }
}

/// Logging options.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to output.
    pub level: Level,
    pub format: LogFormat,
    /// ANSI color codes (text format only).
    pub ansi_colors: bool,
    /// Include file/line source locations.
    pub with_source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
            ansi_colors: true,
            with_source_location: false,
        }
    }
}

impl LogConfig {
    /// Debug level with source locations.
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            with_source_location: true,
            ..Self::default()
        }
    }

    pub fn json() -> Self {
        Self {
            format: LogFormat::Json,
            ansi_colors: false,
            with_source_location: true,
            ..Self::default()
        }
    }

    /// Builds the options from the `[logging]` config section.
    pub fn from_config(config: &LoggingConfig) -> anyhow::Result<Self> {
        let format = LogFormat::parse(&config.format)?;
        Ok(Self {
            level: parse_level(&config.level)?,
            format,
            ansi_colors: format == LogFormat::Text,
            ..Self::default()
        })
    }

    /// Set the log level from a string. Unknown names fall back to INFO.
    pub fn with_level(mut self, level: &str) -> Self {
        self.level = parse_level(level).unwrap_or(Level::INFO);
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        if format == LogFormat::Json {
            self.ansi_colors = false;
        }
        self
    }
}

/// Parses a level name, case-insensitively. `warning` is accepted for `warn`.
pub fn parse_level(level: &str) -> anyhow::Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => anyhow::bail!("invalid log level: {other}"),
    }
}

fn build_filter(config: &LogConfig) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    Ok(EnvFilter::new(config.level.as_str()).add_directive("r2d2=warn".parse()?))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let filter = build_filter(config)?;

    match config.format {
        LogFormat::Text => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_ansi(config.ansi_colors)
                .with_target(true)
                .with_file(config.with_source_location)
                .with_line_number(config.with_source_location);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_file(config.with_source_location)
                .with_line_number(config.with_source_location);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }
    Ok(())
}
