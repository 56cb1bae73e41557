//! [`AssetStatsStore`] over a SQLite connection.

use asset_stats_common::{AssetIdentity, Hash256};
use asset_stats_ingest::{
    AssetContract, AssetStatsStore, ContractBalanceRecord, ContractStatRow,
    PersistedAssetAggregate,
};
use rusqlite::Connection;

use crate::error::DbError;
use crate::queries::{AssetStatQueries, ContractQueries};

/// Borrows a connection (usually an open transaction) for one commit.
pub struct SqlStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqlStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl AssetStatsStore for SqlStore<'_> {
    type Error = DbError;

    fn fetch_asset_stat(
        &mut self,
        asset: &AssetIdentity,
    ) -> Result<Option<PersistedAssetAggregate>, DbError> {
        self.conn.load_asset_stat(asset)
    }

    fn insert_asset_stat(&mut self, row: &PersistedAssetAggregate) -> Result<usize, DbError> {
        self.conn.insert_asset_stat(row)
    }

    fn update_asset_stat(&mut self, row: &PersistedAssetAggregate) -> Result<usize, DbError> {
        self.conn.update_asset_stat(row)
    }

    fn remove_asset_stat(&mut self, asset: &AssetIdentity) -> Result<usize, DbError> {
        self.conn.delete_asset_stat(asset)
    }

    fn bulk_insert_asset_stats(&mut self, rows: &[PersistedAssetAggregate]) -> Result<(), DbError> {
        self.conn.insert_asset_stats(rows)
    }

    fn fetch_contract_stat(
        &mut self,
        contract_id: &Hash256,
    ) -> Result<Option<ContractStatRow>, DbError> {
        self.conn.load_contract_stat(contract_id)
    }

    fn insert_contract_stat(&mut self, row: &ContractStatRow) -> Result<usize, DbError> {
        self.conn.insert_contract_stat(row)
    }

    fn update_contract_stat(&mut self, row: &ContractStatRow) -> Result<usize, DbError> {
        self.conn.update_contract_stat(row)
    }

    fn remove_contract_stat(&mut self, contract_id: &Hash256) -> Result<usize, DbError> {
        self.conn.delete_contract_stat(contract_id)
    }

    fn bulk_insert_contract_stats(&mut self, rows: &[ContractStatRow]) -> Result<(), DbError> {
        self.conn.insert_contract_stats(rows)
    }

    fn insert_contract_balances(&mut self, rows: &[ContractBalanceRecord]) -> Result<(), DbError> {
        self.conn.insert_contract_balances(rows)
    }

    fn update_contract_balance_amounts(
        &mut self,
        amounts: &[(Hash256, u128)],
    ) -> Result<(), DbError> {
        self.conn.update_contract_balance_amounts(amounts)
    }

    fn update_contract_balance_expirations(
        &mut self,
        expirations: &[(Hash256, u32)],
    ) -> Result<(), DbError> {
        self.conn.update_contract_balance_expirations(expirations)
    }

    fn fetch_contract_balance(
        &mut self,
        key_hash: &Hash256,
    ) -> Result<Option<ContractBalanceRecord>, DbError> {
        self.conn.load_contract_balance(key_hash)
    }

    fn fetch_balances_expiring_at(
        &mut self,
        ledger: u32,
    ) -> Result<Vec<ContractBalanceRecord>, DbError> {
        self.conn.load_balances_expiring_at(ledger)
    }

    fn remove_contract_balances(&mut self, key_hashes: &[Hash256]) -> Result<(), DbError> {
        self.conn.delete_contract_balances(key_hashes)
    }

    fn insert_asset_contracts(&mut self, contracts: &[AssetContract]) -> Result<(), DbError> {
        self.conn.insert_asset_contracts(contracts)
    }

    fn update_asset_contract_expirations(
        &mut self,
        expirations: &[(Hash256, u32)],
    ) -> Result<(), DbError> {
        self.conn.update_asset_contract_expirations(expirations)
    }

    fn remove_asset_contracts(&mut self, contract_ids: &[Hash256]) -> Result<(), DbError> {
        self.conn.delete_asset_contracts(contract_ids)
    }
}
