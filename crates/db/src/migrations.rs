//! Schema versioning for the asset stats database.
//!
//! Migrations run in order, each inside its own transaction, so a failed
//! step leaves the previous version intact. A database whose version is
//! newer than [`CURRENT_VERSION`] is rejected.
//!
//! New migrations bump [`CURRENT_VERSION`], append to `MIGRATIONS` with
//! `from_version` set to the old version, and use idempotent SQL where
//! SQLite has it (`ALTER TABLE ... ADD COLUMN` does not).

use crate::schema::state_keys;
use crate::{DbError, Result};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

/// Current database schema version.
///
/// This should be incremented whenever a new migration is added.
pub const CURRENT_VERSION: i32 = 3;

/// Represents a single database migration.
struct Migration {
    /// The schema version this migration upgrades FROM.
    from_version: i32,
    /// The schema version this migration upgrades TO.
    to_version: i32,
    /// SQL statements to execute for the upgrade.
    ///
    /// Should use `IF NOT EXISTS`/`IF EXISTS` for idempotency.
    upgrade_sql: &'static str,
    /// Human-readable description of what this migration does.
    description: &'static str,
}

/// Registry of all available migrations, ordered by version.
const MIGRATIONS: &[Migration] = &[
    Migration {
        from_version: 1,
        to_version: 2,
        upgrade_sql: r#"
            CREATE INDEX IF NOT EXISTS contract_asset_balances_contract
                ON contract_asset_balances(contract_id);
        "#,
        description: "Index contract balances by contract",
    },
    // Version 2 deleted lapsed balance rows, so their archived totals
    // start at zero; rebuild from a snapshot to recover them.
    Migration {
        from_version: 2,
        to_version: 3,
        upgrade_sql: r#"
            ALTER TABLE asset_stats
                ADD COLUMN num_liquidity_pools INTEGER NOT NULL DEFAULT 0;
            ALTER TABLE contract_asset_stats
                ADD COLUMN archived_balance TEXT NOT NULL DEFAULT '0';
            ALTER TABLE contract_asset_stats
                ADD COLUMN archived_holders INTEGER NOT NULL DEFAULT 0;
        "#,
        description: "Track liquidity pool counts and archived contract balances",
    },
];

/// Reads the schema version from `storestate`.
///
/// A database without a recorded version is taken to be at version 1.
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT state FROM storestate WHERE statename = ?1",
            [state_keys::DATABASE_SCHEMA],
            |row| row.get(0),
        )
        .optional()?;
    match stored {
        Some(version) => version
            .parse()
            .map_err(|_| DbError::Migration(format!("invalid schema version {version:?}"))),
        None => Ok(1),
    }
}

pub fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO storestate (statename, state) VALUES (?1, ?2)",
        [state_keys::DATABASE_SCHEMA, &version.to_string()],
    )?;
    Ok(())
}

/// True if the schema is older than [`CURRENT_VERSION`].
pub fn needs_migration(conn: &Connection) -> Result<bool> {
    Ok(get_schema_version(conn)? < CURRENT_VERSION)
}

/// Applies every pending migration, one transaction per step.
///
/// Refuses databases newer than [`CURRENT_VERSION`].
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let mut version = get_schema_version(conn)?;
    if version > CURRENT_VERSION {
        return Err(DbError::Migration(format!(
            "database version {version} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    while version < CURRENT_VERSION {
        let migration = MIGRATIONS
            .iter()
            .find(|m| m.from_version == version)
            .ok_or_else(|| DbError::Migration(format!("no migration from version {version}")))?;

        info!(
            from = migration.from_version,
            to = migration.to_version,
            description = migration.description,
            "Applying schema migration"
        );
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.upgrade_sql)?;
        set_schema_version(&tx, migration.to_version)?;
        tx.commit()?;
        version = migration.to_version;
    }

    debug!(version, "Database schema is current");
    Ok(())
}

/// Checks that the schema is exactly [`CURRENT_VERSION`].
pub fn verify_schema(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;
    if version < CURRENT_VERSION {
        return Err(DbError::Migration(format!(
            "schema version {version} is too old, run migrations first"
        )));
    }
    if version > CURRENT_VERSION {
        return Err(DbError::Migration(format!(
            "schema version {version} is newer than this software supports ({CURRENT_VERSION})"
        )));
    }
    Ok(())
}

/// Creates every table of a fresh database at [`CURRENT_VERSION`].
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(crate::schema::CREATE_SCHEMA)?;
    set_schema_version(conn, CURRENT_VERSION)?;
    info!(version = CURRENT_VERSION, "Initialized asset stats database");
    Ok(())
}
