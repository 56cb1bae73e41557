//! Persistence boundary of the aggregation engine.
//!
//! The reconciler and the expiration sweep talk to durable storage only
//! through [`AssetStatsStore`]. Write methods that touch a single aggregate
//! row report rows-affected so the reconciler can detect concurrent writers.

use asset_stats_common::{AssetIdentity, Hash256};
use num_bigint::BigInt;

use crate::classic::AssetBuckets;
use crate::contract::ContractAggregateDelta;

/// Durable per-asset aggregate row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedAssetAggregate {
    pub asset: AssetIdentity,
    pub buckets: AssetBuckets,
}

/// Durable per-contract aggregate row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractStatRow {
    pub contract_id: Hash256,
    pub active_balance: BigInt,
    pub active_holders: i64,
    pub archived_balance: BigInt,
    pub archived_holders: i64,
}

impl ContractStatRow {
    pub fn new(contract_id: Hash256, totals: ContractAggregateDelta) -> Self {
        Self {
            contract_id,
            active_balance: totals.active_balance,
            active_holders: totals.active_holders,
            archived_balance: totals.archived_balance,
            archived_holders: totals.archived_holders,
        }
    }

    pub fn totals(&self) -> ContractAggregateDelta {
        ContractAggregateDelta {
            active_balance: self.active_balance.clone(),
            active_holders: self.active_holders,
            archived_balance: self.archived_balance.clone(),
            archived_holders: self.archived_holders,
        }
    }
}

/// Persisted balance of one holder in one asset contract.
///
/// A row lives as long as its ledger entry. It is active while
/// `expiration_ledger` is at or after the current ledger and archived
/// afterwards; the expiration sweep only moves its amount between the two
/// totals of [`ContractStatRow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractBalanceRecord {
    /// Content hash of the balance entry's ledger key.
    pub key_hash: Hash256,
    pub contract_id: Hash256,
    pub holder: Hash256,
    pub amount: u128,
    pub expiration_ledger: u32,
}

/// An asset contract discovered through its verified metadata entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetContract {
    /// Content hash of the contract instance entry.
    pub key_hash: Hash256,
    pub contract_id: Hash256,
    pub asset: AssetIdentity,
    pub expiration_ledger: Option<u32>,
}

/// Storage operations consumed by the reconciler and the expiration sweep.
///
/// Implementations are not expected to retry; any error is propagated to
/// the caller with context.
pub trait AssetStatsStore {
    type Error: std::error::Error + Send + Sync + 'static;

    fn fetch_asset_stat(
        &mut self,
        asset: &AssetIdentity,
    ) -> Result<Option<PersistedAssetAggregate>, Self::Error>;
    fn insert_asset_stat(&mut self, row: &PersistedAssetAggregate) -> Result<usize, Self::Error>;
    fn update_asset_stat(&mut self, row: &PersistedAssetAggregate) -> Result<usize, Self::Error>;
    fn remove_asset_stat(&mut self, asset: &AssetIdentity) -> Result<usize, Self::Error>;
    fn bulk_insert_asset_stats(&mut self, rows: &[PersistedAssetAggregate])
        -> Result<(), Self::Error>;

    fn fetch_contract_stat(
        &mut self,
        contract_id: &Hash256,
    ) -> Result<Option<ContractStatRow>, Self::Error>;
    fn insert_contract_stat(&mut self, row: &ContractStatRow) -> Result<usize, Self::Error>;
    fn update_contract_stat(&mut self, row: &ContractStatRow) -> Result<usize, Self::Error>;
    fn remove_contract_stat(&mut self, contract_id: &Hash256) -> Result<usize, Self::Error>;
    fn bulk_insert_contract_stats(&mut self, rows: &[ContractStatRow]) -> Result<(), Self::Error>;

    fn insert_contract_balances(
        &mut self,
        rows: &[ContractBalanceRecord],
    ) -> Result<(), Self::Error>;
    /// Sets new absolute amounts, keyed by balance key hash.
    fn update_contract_balance_amounts(
        &mut self,
        amounts: &[(Hash256, u128)],
    ) -> Result<(), Self::Error>;
    /// Sets new expiration ledgers, keyed by key hash. Keys without a row
    /// are ignored.
    fn update_contract_balance_expirations(
        &mut self,
        expirations: &[(Hash256, u32)],
    ) -> Result<(), Self::Error>;
    fn fetch_contract_balance(
        &mut self,
        key_hash: &Hash256,
    ) -> Result<Option<ContractBalanceRecord>, Self::Error>;
    /// Every balance row whose expiration ledger is exactly `ledger`. Rows
    /// are left in place.
    fn fetch_balances_expiring_at(
        &mut self,
        ledger: u32,
    ) -> Result<Vec<ContractBalanceRecord>, Self::Error>;
    fn remove_contract_balances(&mut self, key_hashes: &[Hash256]) -> Result<(), Self::Error>;

    fn insert_asset_contracts(&mut self, contracts: &[AssetContract]) -> Result<(), Self::Error>;
    fn update_asset_contract_expirations(
        &mut self,
        expirations: &[(Hash256, u32)],
    ) -> Result<(), Self::Error>;
    fn remove_asset_contracts(&mut self, contract_ids: &[Hash256]) -> Result<(), Self::Error>;
}
