//! Connection pool management.
//!
//! [`Database`] wraps an r2d2 pool of SQLite connections. It is `Clone`;
//! every clone shares the same pool.

use crate::error::DbError;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

/// A pooled SQLite connection, returned to the pool on drop.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Database handle with connection pooling.
///
/// # Example
///
/// ```no_run
/// use asset_stats_db::{Database, StateQueries};
///
/// let db = Database::open("asset-stats.db")?;
///
/// let last = db.with_connection(|conn| conn.get_last_ingested_ledger())?;
///
/// db.transaction(|tx| {
///     tx.set_last_ingested_ledger(last.unwrap_or(0) + 1)?;
///     Ok::<_, asset_stats_db::DbError>(())
/// })?;
/// # Ok::<(), asset_stats_db::DbError>(())
/// ```
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Obtains a connection from the pool.
    pub fn connection(&self) -> Result<PooledConnection, DbError> {
        self.pool.get().map_err(DbError::from)
    }

    /// Runs `f` inside a transaction, committing if it returns `Ok` and
    /// rolling back otherwise.
    ///
    /// The closure's error type only has to absorb [`DbError`], so callers
    /// can run fallible non-database work (an ingestion commit, say) inside
    /// the same transaction.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T, E>,
        E: From<DbError>,
    {
        let mut conn = self.connection()?;
        let tx = conn.transaction().map_err(DbError::from)?;
        let result = f(&tx)?;
        tx.commit().map_err(DbError::from)?;
        Ok(result)
    }

    /// Runs `f` with a pooled connection and no explicit transaction.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Connection) -> Result<T, DbError>,
    {
        let conn = self.connection()?;
        f(&conn)
    }
}
