//! Database error types.
//!
//! All failures of the persistence layer are consolidated into [`DbError`],
//! with automatic conversion from the underlying SQLite and pool errors.

use thiserror::Error;

/// Errors that can occur during database operations.
///
/// # Error Categories
///
/// - **Infrastructure errors**: [`Sqlite`](DbError::Sqlite), [`Pool`](DbError::Pool),
///   [`Io`](DbError::Io)
/// - **Data errors**: [`Integrity`](DbError::Integrity) - a stored value
///   cannot be decoded back into its domain type
/// - **Schema errors**: [`Migration`](DbError::Migration) - schema version incompatibilities
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite database error.
    ///
    /// Wraps errors from rusqlite including query failures, constraint
    /// violations, and database corruption.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// File system I/O error while creating the database file or its
    /// parent directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data integrity violation.
    ///
    /// A row holds a value that does not parse: a non-numeric balance, a
    /// malformed hash, an unknown asset type.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Schema migration error.
    #[error("Migration error: {0}")]
    Migration(String),
}

impl From<asset_stats_common::Error> for DbError {
    fn from(err: asset_stats_common::Error) -> Self {
        DbError::Integrity(err.to_string())
    }
}
