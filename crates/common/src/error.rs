//! Common error type for the asset-stats crates.
//!
//! Lower-level failures (XDR codec, I/O, malformed asset data) are collected
//! in [`enum@Error`]; the ingest and db crates wrap it in their own error types.
//!
//! ```rust
//! use asset_stats_common::{Error, Result};
//!
//! fn require_code(code: &str) -> Result<()> {
//!     if code.is_empty() {
//!         return Err(Error::InvalidData("empty asset code".to_string()));
//!     }
//!     Ok(())
//! }
//! # assert!(require_code("").is_err());
//! ```

use thiserror::Error;

/// `Result` alias over [`enum@Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// XDR encoding/decoding failure.
    #[error("XDR error: {0}")]
    Xdr(#[from] stellar_xdr::curr::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data that fails validation, e.g. an asset code with embedded NULs
    /// or an issuer that is not a valid account strkey.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}
