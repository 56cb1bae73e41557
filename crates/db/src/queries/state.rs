//! Queries for the `storestate` key-value table.
//!
//! See [`state_keys`] for the well-known keys.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::DbError;
use crate::schema::state_keys;

pub trait StateQueries {
    /// Retrieves a state value by key.
    fn get_state(&self, key: &str) -> Result<Option<String>, DbError>;

    /// Stores a state value, replacing any previous one.
    fn set_state(&self, key: &str, value: &str) -> Result<(), DbError>;

    /// Deletes a state value. No-op for a missing key.
    fn delete_state(&self, key: &str) -> Result<(), DbError>;

    /// Last ledger whose changes were committed, if any.
    fn get_last_ingested_ledger(&self) -> Result<Option<u32>, DbError>;

    fn set_last_ingested_ledger(&self, seq: u32) -> Result<(), DbError>;

    /// Network the database was built from.
    fn get_network_passphrase(&self) -> Result<Option<String>, DbError>;

    fn set_network_passphrase(&self, passphrase: &str) -> Result<(), DbError>;
}

impl StateQueries for Connection {
    fn get_state(&self, key: &str) -> Result<Option<String>, DbError> {
        let result = self
            .query_row(
                "SELECT state FROM storestate WHERE statename = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    fn set_state(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.execute(
            "INSERT OR REPLACE INTO storestate (statename, state) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete_state(&self, key: &str) -> Result<(), DbError> {
        self.execute("DELETE FROM storestate WHERE statename = ?1", params![key])?;
        Ok(())
    }

    fn get_last_ingested_ledger(&self) -> Result<Option<u32>, DbError> {
        self.get_state(state_keys::LAST_INGESTED_LEDGER)?
            .map(|s| super::parse_number("last ingested ledger", &s))
            .transpose()
    }

    fn set_last_ingested_ledger(&self, seq: u32) -> Result<(), DbError> {
        self.set_state(state_keys::LAST_INGESTED_LEDGER, &seq.to_string())
    }

    fn get_network_passphrase(&self) -> Result<Option<String>, DbError> {
        self.get_state(state_keys::NETWORK_PASSPHRASE)
    }

    fn set_network_passphrase(&self, passphrase: &str) -> Result<(), DbError> {
        self.set_state(state_keys::NETWORK_PASSPHRASE, passphrase)
    }
}
