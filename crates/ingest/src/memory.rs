//! In-memory [`AssetStatsStore`].
//!
//! Backs the engine's own tests and dry runs. Rows-affected reporting and
//! write failures can be forced to exercise the reconciler's error paths.

use std::collections::BTreeMap;

use asset_stats_common::{AssetIdentity, Hash256};
use thiserror::Error;

use crate::store::{
    AssetContract, AssetStatsStore, ContractBalanceRecord, ContractStatRow,
    PersistedAssetAggregate,
};

#[derive(Debug, Error)]
pub enum MemoryStoreError {
    #[error("injected write failure")]
    Injected,
    #[error("duplicate row: {0}")]
    Duplicate(String),
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    asset_stats: BTreeMap<AssetIdentity, PersistedAssetAggregate>,
    contract_stats: BTreeMap<Hash256, ContractStatRow>,
    balances: BTreeMap<Hash256, ContractBalanceRecord>,
    asset_contracts: BTreeMap<Hash256, AssetContract>,
    forced_rows_affected: Option<usize>,
    fail_writes: bool,
    fetches: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every single-row write report `rows` instead of the real count.
    pub fn force_rows_affected(&mut self, rows: Option<usize>) {
        self.forced_rows_affected = rows;
    }

    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Number of fetch calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches
    }

    pub fn asset_stat(&self, asset: &AssetIdentity) -> Option<&PersistedAssetAggregate> {
        self.asset_stats.get(asset)
    }

    pub fn asset_stats(&self) -> impl Iterator<Item = &PersistedAssetAggregate> {
        self.asset_stats.values()
    }

    pub fn contract_stat(&self, contract_id: &Hash256) -> Option<&ContractStatRow> {
        self.contract_stats.get(contract_id)
    }

    pub fn balance(&self, key_hash: &Hash256) -> Option<&ContractBalanceRecord> {
        self.balances.get(key_hash)
    }

    pub fn balance_count(&self) -> usize {
        self.balances.len()
    }

    pub fn asset_contract(&self, contract_id: &Hash256) -> Option<&AssetContract> {
        self.asset_contracts.get(contract_id)
    }

    fn check_write(&self) -> Result<(), MemoryStoreError> {
        if self.fail_writes {
            return Err(MemoryStoreError::Injected);
        }
        Ok(())
    }

    fn rows(&self, actual: usize) -> usize {
        self.forced_rows_affected.unwrap_or(actual)
    }
}

impl AssetStatsStore for MemoryStore {
    type Error = MemoryStoreError;

    fn fetch_asset_stat(
        &mut self,
        asset: &AssetIdentity,
    ) -> Result<Option<PersistedAssetAggregate>, Self::Error> {
        self.fetches += 1;
        Ok(self.asset_stats.get(asset).cloned())
    }

    fn insert_asset_stat(&mut self, row: &PersistedAssetAggregate) -> Result<usize, Self::Error> {
        self.check_write()?;
        if self.asset_stats.contains_key(&row.asset) {
            return Ok(self.rows(0));
        }
        self.asset_stats.insert(row.asset.clone(), row.clone());
        Ok(self.rows(1))
    }

    fn update_asset_stat(&mut self, row: &PersistedAssetAggregate) -> Result<usize, Self::Error> {
        self.check_write()?;
        let Some(existing) = self.asset_stats.get_mut(&row.asset) else {
            return Ok(self.rows(0));
        };
        *existing = row.clone();
        Ok(self.rows(1))
    }

    fn remove_asset_stat(&mut self, asset: &AssetIdentity) -> Result<usize, Self::Error> {
        self.check_write()?;
        let removed = self.asset_stats.remove(asset).map_or(0, |_| 1);
        Ok(self.rows(removed))
    }

    fn bulk_insert_asset_stats(
        &mut self,
        rows: &[PersistedAssetAggregate],
    ) -> Result<(), Self::Error> {
        self.check_write()?;
        for row in rows {
            if self.asset_stats.insert(row.asset.clone(), row.clone()).is_some() {
                return Err(MemoryStoreError::Duplicate(row.asset.to_string()));
            }
        }
        Ok(())
    }

    fn fetch_contract_stat(
        &mut self,
        contract_id: &Hash256,
    ) -> Result<Option<ContractStatRow>, Self::Error> {
        self.fetches += 1;
        Ok(self.contract_stats.get(contract_id).cloned())
    }

    fn insert_contract_stat(&mut self, row: &ContractStatRow) -> Result<usize, Self::Error> {
        self.check_write()?;
        if self.contract_stats.contains_key(&row.contract_id) {
            return Ok(self.rows(0));
        }
        self.contract_stats.insert(row.contract_id, row.clone());
        Ok(self.rows(1))
    }

    fn update_contract_stat(&mut self, row: &ContractStatRow) -> Result<usize, Self::Error> {
        self.check_write()?;
        let Some(existing) = self.contract_stats.get_mut(&row.contract_id) else {
            return Ok(self.rows(0));
        };
        *existing = row.clone();
        Ok(self.rows(1))
    }

    fn remove_contract_stat(&mut self, contract_id: &Hash256) -> Result<usize, Self::Error> {
        self.check_write()?;
        let removed = self.contract_stats.remove(contract_id).map_or(0, |_| 1);
        Ok(self.rows(removed))
    }

    fn bulk_insert_contract_stats(&mut self, rows: &[ContractStatRow]) -> Result<(), Self::Error> {
        self.check_write()?;
        for row in rows {
            if self.contract_stats.insert(row.contract_id, row.clone()).is_some() {
                return Err(MemoryStoreError::Duplicate(row.contract_id.to_hex()));
            }
        }
        Ok(())
    }

    fn insert_contract_balances(
        &mut self,
        rows: &[ContractBalanceRecord],
    ) -> Result<(), Self::Error> {
        self.check_write()?;
        for row in rows {
            self.balances.insert(row.key_hash, row.clone());
        }
        Ok(())
    }

    fn update_contract_balance_amounts(
        &mut self,
        amounts: &[(Hash256, u128)],
    ) -> Result<(), Self::Error> {
        self.check_write()?;
        for (key_hash, amount) in amounts {
            if let Some(row) = self.balances.get_mut(key_hash) {
                row.amount = *amount;
            }
        }
        Ok(())
    }

    fn update_contract_balance_expirations(
        &mut self,
        expirations: &[(Hash256, u32)],
    ) -> Result<(), Self::Error> {
        self.check_write()?;
        for (key_hash, ledger) in expirations {
            if let Some(row) = self.balances.get_mut(key_hash) {
                row.expiration_ledger = *ledger;
            }
        }
        Ok(())
    }

    fn fetch_contract_balance(
        &mut self,
        key_hash: &Hash256,
    ) -> Result<Option<ContractBalanceRecord>, Self::Error> {
        self.fetches += 1;
        Ok(self.balances.get(key_hash).cloned())
    }

    fn fetch_balances_expiring_at(
        &mut self,
        ledger: u32,
    ) -> Result<Vec<ContractBalanceRecord>, Self::Error> {
        Ok(self
            .balances
            .values()
            .filter(|row| row.expiration_ledger == ledger)
            .cloned()
            .collect())
    }

    fn remove_contract_balances(&mut self, key_hashes: &[Hash256]) -> Result<(), Self::Error> {
        self.check_write()?;
        for key in key_hashes {
            self.balances.remove(key);
        }
        Ok(())
    }

    fn insert_asset_contracts(&mut self, contracts: &[AssetContract]) -> Result<(), Self::Error> {
        self.check_write()?;
        for contract in contracts {
            self.asset_contracts
                .insert(contract.contract_id, contract.clone());
        }
        Ok(())
    }

    fn update_asset_contract_expirations(
        &mut self,
        expirations: &[(Hash256, u32)],
    ) -> Result<(), Self::Error> {
        self.check_write()?;
        for (key_hash, ledger) in expirations {
            if let Some(contract) = self
                .asset_contracts
                .values_mut()
                .find(|c| c.key_hash == *key_hash)
            {
                contract.expiration_ledger = Some(*ledger);
            }
        }
        Ok(())
    }

    fn remove_asset_contracts(&mut self, contract_ids: &[Hash256]) -> Result<(), Self::Error> {
        self.check_write()?;
        for id in contract_ids {
            self.asset_contracts.remove(id);
        }
        Ok(())
    }
}
