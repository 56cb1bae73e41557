//! Contract-side tables: `contract_asset_stats`, `contract_asset_balances`
//! and `asset_contracts`.

use asset_stats_common::{AssetIdentity, AssetKind, Hash256};
use asset_stats_ingest::{AssetContract, ContractBalanceRecord, ContractStatRow};
use rusqlite::{params, Connection, OptionalExtension};

use super::{parse_hash, parse_number};
use crate::error::DbError;

pub trait ContractQueries {
    fn load_contract_stat(&self, contract_id: &Hash256) -> Result<Option<ContractStatRow>, DbError>;
    fn insert_contract_stat(&self, row: &ContractStatRow) -> Result<usize, DbError>;
    fn update_contract_stat(&self, row: &ContractStatRow) -> Result<usize, DbError>;
    fn delete_contract_stat(&self, contract_id: &Hash256) -> Result<usize, DbError>;
    fn insert_contract_stats(&self, rows: &[ContractStatRow]) -> Result<(), DbError>;

    fn load_contract_balance(
        &self,
        key_hash: &Hash256,
    ) -> Result<Option<ContractBalanceRecord>, DbError>;
    fn insert_contract_balances(&self, rows: &[ContractBalanceRecord]) -> Result<(), DbError>;
    fn update_contract_balance_amounts(&self, amounts: &[(Hash256, u128)]) -> Result<(), DbError>;
    fn update_contract_balance_expirations(
        &self,
        expirations: &[(Hash256, u32)],
    ) -> Result<(), DbError>;
    /// Balance rows expiring exactly at `ledger`. Rows are left in place.
    fn load_balances_expiring_at(&self, ledger: u32) -> Result<Vec<ContractBalanceRecord>, DbError>;
    fn delete_contract_balances(&self, key_hashes: &[Hash256]) -> Result<(), DbError>;
    fn count_contract_balances(&self, contract_id: &Hash256) -> Result<u64, DbError>;

    fn load_asset_contract(&self, contract_id: &Hash256) -> Result<Option<AssetContract>, DbError>;
    fn insert_asset_contracts(&self, contracts: &[AssetContract]) -> Result<(), DbError>;
    /// Sets expirations keyed by the instance entry's key hash.
    fn update_asset_contract_expirations(
        &self,
        expirations: &[(Hash256, u32)],
    ) -> Result<(), DbError>;
    fn delete_asset_contracts(&self, contract_ids: &[Hash256]) -> Result<(), DbError>;
}

const INSERT_CONTRACT_STAT: &str = "INSERT INTO contract_asset_stats \
     (contract_id, active_balance, active_holders, archived_balance, archived_holders) \
     VALUES (?1, ?2, ?3, ?4, ?5)";

fn stat_params(row: &ContractStatRow) -> (String, String, i64, String, i64) {
    (
        row.contract_id.to_hex(),
        row.active_balance.to_string(),
        row.active_holders,
        row.archived_balance.to_string(),
        row.archived_holders,
    )
}

type RawBalance = (String, String, String, String, i64);

fn decode_balance((key_hash, contract_id, holder, amount, expiration): RawBalance) -> Result<ContractBalanceRecord, DbError> {
    Ok(ContractBalanceRecord {
        key_hash: parse_hash(&key_hash)?,
        contract_id: parse_hash(&contract_id)?,
        holder: parse_hash(&holder)?,
        amount: parse_number("balance amount", &amount)?,
        expiration_ledger: parse_number("expiration ledger", &expiration.to_string())?,
    })
}

impl ContractQueries for Connection {
    fn load_contract_stat(&self, contract_id: &Hash256) -> Result<Option<ContractStatRow>, DbError> {
        let raw: Option<(String, i64, String, i64)> = self
            .query_row(
                "SELECT active_balance, active_holders, archived_balance, archived_holders \
                 FROM contract_asset_stats WHERE contract_id = ?1",
                params![contract_id.to_hex()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        raw.map(|(active_balance, active_holders, archived_balance, archived_holders)| {
            Ok(ContractStatRow {
                contract_id: *contract_id,
                active_balance: parse_number("active balance", &active_balance)?,
                active_holders,
                archived_balance: parse_number("archived balance", &archived_balance)?,
                archived_holders,
            })
        })
        .transpose()
    }

    fn insert_contract_stat(&self, row: &ContractStatRow) -> Result<usize, DbError> {
        Ok(self.execute(INSERT_CONTRACT_STAT, stat_params(row))?)
    }

    fn update_contract_stat(&self, row: &ContractStatRow) -> Result<usize, DbError> {
        Ok(self.execute(
            "UPDATE contract_asset_stats SET active_balance = ?2, active_holders = ?3, \
             archived_balance = ?4, archived_holders = ?5 WHERE contract_id = ?1",
            stat_params(row),
        )?)
    }

    fn delete_contract_stat(&self, contract_id: &Hash256) -> Result<usize, DbError> {
        Ok(self.execute(
            "DELETE FROM contract_asset_stats WHERE contract_id = ?1",
            params![contract_id.to_hex()],
        )?)
    }

    fn insert_contract_stats(&self, rows: &[ContractStatRow]) -> Result<(), DbError> {
        let mut stmt = self.prepare_cached(INSERT_CONTRACT_STAT)?;
        for row in rows {
            stmt.execute(stat_params(row))?;
        }
        Ok(())
    }

    fn load_contract_balance(
        &self,
        key_hash: &Hash256,
    ) -> Result<Option<ContractBalanceRecord>, DbError> {
        let raw: Option<RawBalance> = self
            .query_row(
                "SELECT key_hash, contract_id, holder, amount, expiration_ledger \
                 FROM contract_asset_balances WHERE key_hash = ?1",
                params![key_hash.to_hex()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;
        raw.map(decode_balance).transpose()
    }

    fn insert_contract_balances(&self, rows: &[ContractBalanceRecord]) -> Result<(), DbError> {
        let mut stmt = self.prepare_cached(
            "INSERT INTO contract_asset_balances (key_hash, contract_id, holder, amount, expiration_ledger) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for row in rows {
            stmt.execute(params![
                row.key_hash.to_hex(),
                row.contract_id.to_hex(),
                row.holder.to_hex(),
                row.amount.to_string(),
                row.expiration_ledger
            ])?;
        }
        Ok(())
    }

    fn update_contract_balance_amounts(&self, amounts: &[(Hash256, u128)]) -> Result<(), DbError> {
        let mut stmt = self
            .prepare_cached("UPDATE contract_asset_balances SET amount = ?2 WHERE key_hash = ?1")?;
        for (key_hash, amount) in amounts {
            stmt.execute(params![key_hash.to_hex(), amount.to_string()])?;
        }
        Ok(())
    }

    fn update_contract_balance_expirations(
        &self,
        expirations: &[(Hash256, u32)],
    ) -> Result<(), DbError> {
        let mut stmt = self.prepare_cached(
            "UPDATE contract_asset_balances SET expiration_ledger = ?2 WHERE key_hash = ?1",
        )?;
        for (key_hash, ledger) in expirations {
            stmt.execute(params![key_hash.to_hex(), ledger])?;
        }
        Ok(())
    }

    fn load_balances_expiring_at(&self, ledger: u32) -> Result<Vec<ContractBalanceRecord>, DbError> {
        let mut stmt = self.prepare_cached(
            "SELECT key_hash, contract_id, holder, amount, expiration_ledger \
             FROM contract_asset_balances WHERE expiration_ledger = ?1 ORDER BY key_hash",
        )?;
        let raw = stmt
            .query_map(params![ledger], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<rusqlite::Result<Vec<RawBalance>>>()?;
        raw.into_iter().map(decode_balance).collect()
    }

    fn delete_contract_balances(&self, key_hashes: &[Hash256]) -> Result<(), DbError> {
        let mut stmt =
            self.prepare_cached("DELETE FROM contract_asset_balances WHERE key_hash = ?1")?;
        for key_hash in key_hashes {
            stmt.execute(params![key_hash.to_hex()])?;
        }
        Ok(())
    }

    fn count_contract_balances(&self, contract_id: &Hash256) -> Result<u64, DbError> {
        let count: i64 = self.query_row(
            "SELECT COUNT(*) FROM contract_asset_balances WHERE contract_id = ?1",
            params![contract_id.to_hex()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn load_asset_contract(&self, contract_id: &Hash256) -> Result<Option<AssetContract>, DbError> {
        let raw: Option<(String, String, String, String, Option<i64>)> = self
            .query_row(
                "SELECT key_hash, asset_type, asset_code, asset_issuer, expiration_ledger \
                 FROM asset_contracts WHERE contract_id = ?1",
                params![contract_id.to_hex()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;
        raw.map(|(key_hash, kind, code, issuer, expiration)| {
            let kind: AssetKind = parse_number("asset type", &kind)?;
            Ok(AssetContract {
                key_hash: parse_hash(&key_hash)?,
                contract_id: *contract_id,
                asset: AssetIdentity::from_parts(kind, &code, &issuer)?,
                expiration_ledger: expiration
                    .map(|e| parse_number("expiration ledger", &e.to_string()))
                    .transpose()?,
            })
        })
        .transpose()
    }

    fn insert_asset_contracts(&self, contracts: &[AssetContract]) -> Result<(), DbError> {
        let mut stmt = self.prepare_cached(
            "INSERT OR REPLACE INTO asset_contracts \
             (contract_id, key_hash, asset_type, asset_code, asset_issuer, expiration_ledger) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for contract in contracts {
            stmt.execute(params![
                contract.contract_id.to_hex(),
                contract.key_hash.to_hex(),
                contract.asset.kind.as_str(),
                contract.asset.code,
                contract.asset.issuer,
                contract.expiration_ledger
            ])?;
        }
        Ok(())
    }

    fn update_asset_contract_expirations(
        &self,
        expirations: &[(Hash256, u32)],
    ) -> Result<(), DbError> {
        let mut stmt = self
            .prepare_cached("UPDATE asset_contracts SET expiration_ledger = ?2 WHERE key_hash = ?1")?;
        for (key_hash, ledger) in expirations {
            stmt.execute(params![key_hash.to_hex(), ledger])?;
        }
        Ok(())
    }

    fn delete_asset_contracts(&self, contract_ids: &[Hash256]) -> Result<(), DbError> {
        let mut stmt = self.prepare_cached("DELETE FROM asset_contracts WHERE contract_id = ?1")?;
        for contract_id in contract_ids {
            stmt.execute(params![contract_id.to_hex()])?;
        }
        Ok(())
    }
}
