//! SQLite persistence for asset-stats aggregates.
//!
//! - [`pool`]: connection pool management using r2d2
//! - [`schema`]: table layout
//! - [`migrations`]: schema versioning
//! - [`queries`]: typed query traits implemented on [`rusqlite::Connection`]
//! - [`SqlStore`]: the ingestion engine's store interface over a connection
//!
//! # Usage
//!
//! ```no_run
//! use asset_stats_db::{Database, SqlStore};
//!
//! let db = Database::open("asset-stats.db")?;
//! db.transaction(|tx| {
//!     let mut store = SqlStore::new(tx);
//!     // processor.commit(&mut store)?;
//!     Ok::<_, asset_stats_db::DbError>(())
//! })?;
//! # Ok::<(), asset_stats_db::DbError>(())
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod queries;
pub mod schema;
mod store;

pub use error::DbError;
pub use migrations::{needs_migration, run_migrations, verify_schema, CURRENT_VERSION};
pub use pool::{Database, PooledConnection};
pub use queries::*;
pub use store::SqlStore;

use std::path::Path;

use asset_stats_common::AssetIdentity;
use asset_stats_ingest::PersistedAssetAggregate;
use tracing::info;

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DbError>;

/// Default number of pooled connections for on-disk databases.
pub const DEFAULT_POOL_SIZE: u32 = 4;

impl Database {
    /// Opens a database at `path`, creating it and its parent directory if
    /// needed, then brings the schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_pool_size(path, DEFAULT_POOL_SIZE)
    }

    pub fn open_with_pool_size(path: impl AsRef<Path>, pool_size: u32) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = r2d2_sqlite::SqliteConnectionManager::file(path);
        let pool = r2d2::Pool::builder().max_size(pool_size.max(1)).build(manager)?;

        let db = Self { pool };
        db.initialize()?;
        info!(path = %path.display(), "Opened asset stats database");
        Ok(db)
    }

    /// Opens an in-memory database, primarily for testing.
    ///
    /// In-memory SQLite databases are per connection, so the pool holds a
    /// single connection.
    pub fn open_in_memory() -> Result<Self> {
        let manager = r2d2_sqlite::SqliteConnectionManager::memory();
        let pool = r2d2::Pool::builder().max_size(1).build(manager)?;

        let db = Self { pool };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;

        let tables_exist: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='storestate'",
            [],
            |row| row.get(0),
        )?;

        if tables_exist {
            if migrations::needs_migration(&conn)? {
                info!("Database requires migration");
                migrations::run_migrations(&conn)?;
            }
            migrations::verify_schema(&conn)?;
        } else {
            migrations::initialize_schema(&conn)?;
        }
        Ok(())
    }

    pub fn schema_version(&self) -> Result<i32> {
        let conn = self.connection()?;
        migrations::get_schema_version(&conn)
    }

    pub fn last_ingested_ledger(&self) -> Result<Option<u32>> {
        self.with_connection(|conn| conn.get_last_ingested_ledger())
    }

    pub fn network_passphrase(&self) -> Result<Option<String>> {
        self.with_connection(|conn| conn.get_network_passphrase())
    }

    pub fn asset_stat(&self, asset: &AssetIdentity) -> Result<Option<PersistedAssetAggregate>> {
        self.with_connection(|conn| conn.load_asset_stat(asset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_initializes_schema() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.schema_version().unwrap(), CURRENT_VERSION);
        assert!(db.last_ingested_ledger().unwrap().is_none());
    }

    #[test]
    fn test_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("stats.db");
        {
            let db = Database::open(&path).unwrap();
            db.with_connection(|conn| conn.set_last_ingested_ledger(42))
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.last_ingested_ledger().unwrap(), Some(42));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<()> = db.transaction(|tx| {
            tx.set_last_ingested_ledger(7)?;
            Err(DbError::Integrity("abort".into()))
        });
        assert!(result.is_err());
        assert!(db.last_ingested_ledger().unwrap().is_none());
    }
}
