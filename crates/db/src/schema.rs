//! Database schema definitions.
//!
//! # Tables
//!
//! - **State management**: `storestate` - key-value store for the schema
//!   version, network passphrase and ingestion progress
//! - **Classic aggregates**: `asset_stats` - one row per asset with a
//!   balance and holder column pair per authorization bucket
//! - **Contract aggregates**: `contract_asset_stats` - active and archived
//!   balance and holders per asset contract
//! - **Contract balances**: `contract_asset_balances` - holder balances,
//!   active or archived, indexed by expiration ledger for the expiration
//!   sweep
//! - **Asset contracts**: `asset_contracts` - verified asset wrappers
//!
//! Balances are stored as decimal TEXT: they exceed the 64-bit INTEGER
//! range. Hashes are lowercase hex.
//!
//! # Versioning
//!
//! The schema version is tracked in the `storestate` table and managed by
//! the [`migrations`](crate::migrations) module.

/// Complete SQL schema for initializing a fresh database.
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking and ingestion state
CREATE TABLE IF NOT EXISTS storestate (
    statename TEXT PRIMARY KEY,
    state TEXT NOT NULL
);

-- Classic asset aggregates
CREATE TABLE IF NOT EXISTS asset_stats (
    asset_type TEXT NOT NULL,
    asset_code TEXT NOT NULL,
    asset_issuer TEXT NOT NULL,
    authorized_balance TEXT NOT NULL,
    authorized_holders INTEGER NOT NULL,
    authorized_to_maintain_liabilities_balance TEXT NOT NULL,
    authorized_to_maintain_liabilities_holders INTEGER NOT NULL,
    unauthorized_balance TEXT NOT NULL,
    unauthorized_holders INTEGER NOT NULL,
    claimable_balances_balance TEXT NOT NULL,
    claimable_balances_holders INTEGER NOT NULL,
    liquidity_pools_balance TEXT NOT NULL,
    liquidity_pools_holders INTEGER NOT NULL,
    amount TEXT NOT NULL,
    num_accounts INTEGER NOT NULL,
    num_liquidity_pools INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (asset_type, asset_code, asset_issuer)
);
CREATE INDEX IF NOT EXISTS asset_stats_code ON asset_stats(asset_code);

-- Contract asset aggregates
CREATE TABLE IF NOT EXISTS contract_asset_stats (
    contract_id TEXT PRIMARY KEY,
    active_balance TEXT NOT NULL,
    active_holders INTEGER NOT NULL,
    archived_balance TEXT NOT NULL DEFAULT '0',
    archived_holders INTEGER NOT NULL DEFAULT 0
);

-- Contract balances; archived rows are kept until removed
CREATE TABLE IF NOT EXISTS contract_asset_balances (
    key_hash TEXT PRIMARY KEY,
    contract_id TEXT NOT NULL,
    holder TEXT NOT NULL,
    amount TEXT NOT NULL,
    expiration_ledger INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS contract_asset_balances_expiration
    ON contract_asset_balances(expiration_ledger);
CREATE INDEX IF NOT EXISTS contract_asset_balances_contract
    ON contract_asset_balances(contract_id);

-- Verified asset contracts
CREATE TABLE IF NOT EXISTS asset_contracts (
    contract_id TEXT PRIMARY KEY,
    key_hash TEXT NOT NULL UNIQUE,
    asset_type TEXT NOT NULL,
    asset_code TEXT NOT NULL,
    asset_issuer TEXT NOT NULL,
    expiration_ledger INTEGER
);
"#;

/// Well-known keys for the `storestate` table.
pub mod state_keys {
    /// Sequence number of the last ledger whose changes were committed.
    pub const LAST_INGESTED_LEDGER: &str = "lastingestedledger";

    /// Current database schema version.
    ///
    /// Used by the migration system to track schema upgrades.
    pub const DATABASE_SCHEMA: &str = "databaseschema";

    /// Passphrase of the network the aggregates were built from.
    ///
    /// Asset-contract IDs are network specific, so a database is bound to
    /// one network.
    pub const NETWORK_PASSPHRASE: &str = "networkpassphrase";
}
