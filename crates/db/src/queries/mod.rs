//! Typed query traits, one per data domain, implemented on
//! [`rusqlite::Connection`].
//!
//! - [`StateQueries`]: `storestate` key-value table and ingestion progress
//! - [`AssetStatQueries`]: classic per-asset aggregate rows
//! - [`ContractQueries`]: contract aggregates, active contract balances and
//!   verified asset contracts
//!
//! ```ignore
//! use asset_stats_db::queries::AssetStatQueries;
//!
//! db.with_connection(|conn| conn.load_asset_stat(&asset))?;
//! ```

pub mod asset_stats;
pub mod contracts;
pub mod state;

pub use asset_stats::AssetStatQueries;
pub use contracts::ContractQueries;
pub use state::StateQueries;

use asset_stats_common::Hash256;

use crate::error::DbError;

pub(crate) fn parse_hash(hex: &str) -> Result<Hash256, DbError> {
    Hash256::from_hex(hex).map_err(|e| DbError::Integrity(format!("invalid hash {hex:?}: {e}")))
}

pub(crate) fn parse_number<T>(column: &str, text: &str) -> Result<T, DbError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    text.parse()
        .map_err(|e| DbError::Integrity(format!("invalid {column} {text:?}: {e}")))
}
