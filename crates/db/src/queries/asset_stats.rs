//! Classic per-asset aggregate rows in `asset_stats`.
//!
//! Each [`AuthorizationBucket`] maps to a `<bucket>_balance` TEXT column
//! and a `<bucket>_holders` INTEGER column. `amount` and `num_accounts`
//! mirror the authorized bucket; `num_liquidity_pools` counts the pools
//! holding the asset.

use asset_stats_common::{AssetIdentity, AssetKind};
use asset_stats_ingest::{AssetBuckets, AuthorizationBucket, PersistedAssetAggregate};
use num_bigint::BigInt;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::parse_number;
use crate::error::DbError;

const SELECT_COLUMNS: &str = "asset_type, asset_code, asset_issuer, \
    authorized_balance, authorized_holders, \
    authorized_to_maintain_liabilities_balance, authorized_to_maintain_liabilities_holders, \
    unauthorized_balance, unauthorized_holders, \
    claimable_balances_balance, claimable_balances_holders, \
    liquidity_pools_balance, liquidity_pools_holders, num_liquidity_pools";

const INSERT_SQL: &str = "INSERT INTO asset_stats (asset_type, asset_code, asset_issuer, \
    authorized_balance, authorized_holders, \
    authorized_to_maintain_liabilities_balance, authorized_to_maintain_liabilities_holders, \
    unauthorized_balance, unauthorized_holders, \
    claimable_balances_balance, claimable_balances_holders, \
    liquidity_pools_balance, liquidity_pools_holders, amount, num_accounts, num_liquidity_pools) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)";

const UPDATE_SQL: &str = "UPDATE asset_stats SET \
    authorized_balance = ?4, authorized_holders = ?5, \
    authorized_to_maintain_liabilities_balance = ?6, authorized_to_maintain_liabilities_holders = ?7, \
    unauthorized_balance = ?8, unauthorized_holders = ?9, \
    claimable_balances_balance = ?10, claimable_balances_holders = ?11, \
    liquidity_pools_balance = ?12, liquidity_pools_holders = ?13, \
    amount = ?14, num_accounts = ?15, num_liquidity_pools = ?16 \
    WHERE asset_type = ?1 AND asset_code = ?2 AND asset_issuer = ?3";

pub trait AssetStatQueries {
    fn load_asset_stat(
        &self,
        asset: &AssetIdentity,
    ) -> Result<Option<PersistedAssetAggregate>, DbError>;

    /// Inserts a row. Returns rows affected.
    fn insert_asset_stat(&self, row: &PersistedAssetAggregate) -> Result<usize, DbError>;

    /// Overwrites an existing row. Returns rows affected.
    fn update_asset_stat(&self, row: &PersistedAssetAggregate) -> Result<usize, DbError>;

    fn delete_asset_stat(&self, asset: &AssetIdentity) -> Result<usize, DbError>;

    /// Inserts many rows with one prepared statement.
    fn insert_asset_stats(&self, rows: &[PersistedAssetAggregate]) -> Result<(), DbError>;

    /// Rows ordered by asset code, then issuer.
    fn load_asset_stats(&self, limit: usize) -> Result<Vec<PersistedAssetAggregate>, DbError>;

    fn count_asset_stats(&self) -> Result<u64, DbError>;
}

fn row_values(row: &PersistedAssetAggregate) -> Vec<Value> {
    let mut values = vec![
        Value::Text(row.asset.kind.as_str().to_string()),
        Value::Text(row.asset.code.clone()),
        Value::Text(row.asset.issuer.clone()),
    ];
    for bucket in AuthorizationBucket::ALL {
        let totals = row.buckets.bucket(bucket);
        values.push(Value::Text(totals.balance.to_string()));
        values.push(Value::Integer(totals.holders));
    }
    values.push(Value::Text(row.buckets.total_authorized_amount().to_string()));
    values.push(Value::Integer(row.buckets.total_authorized_holders()));
    values.push(Value::Integer(row.buckets.liquidity_pools()));
    values
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<(Vec<String>, Vec<i64>)> {
    let mut texts = Vec::with_capacity(8);
    let mut counts = Vec::with_capacity(6);
    for i in 0..3 {
        texts.push(row.get(i)?);
    }
    for (n, _) in AuthorizationBucket::ALL.iter().enumerate() {
        texts.push(row.get(3 + 2 * n)?);
        counts.push(row.get(4 + 2 * n)?);
    }
    counts.push(row.get(3 + 2 * AuthorizationBucket::ALL.len())?);
    Ok((texts, counts))
}

fn decode_row((texts, counts): (Vec<String>, Vec<i64>)) -> Result<PersistedAssetAggregate, DbError> {
    let kind: AssetKind = parse_number("asset type", &texts[0])?;
    let asset = AssetIdentity::from_parts(kind, &texts[1], &texts[2])?;
    let mut buckets = AssetBuckets::default();
    for (n, bucket) in AuthorizationBucket::ALL.into_iter().enumerate() {
        let balance: BigInt = parse_number(bucket.as_str(), &texts[3 + n])?;
        buckets.add(bucket, balance, counts[n]);
    }
    buckets.add_liquidity_pools(counts[AuthorizationBucket::ALL.len()]);
    Ok(PersistedAssetAggregate { asset, buckets })
}

impl AssetStatQueries for Connection {
    fn load_asset_stat(
        &self,
        asset: &AssetIdentity,
    ) -> Result<Option<PersistedAssetAggregate>, DbError> {
        let raw = self
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM asset_stats \
                     WHERE asset_type = ?1 AND asset_code = ?2 AND asset_issuer = ?3"
                ),
                params![asset.kind.as_str(), asset.code, asset.issuer],
                read_row,
            )
            .optional()?;
        raw.map(decode_row).transpose()
    }

    fn insert_asset_stat(&self, row: &PersistedAssetAggregate) -> Result<usize, DbError> {
        Ok(self.execute(INSERT_SQL, params_from_iter(row_values(row)))?)
    }

    fn update_asset_stat(&self, row: &PersistedAssetAggregate) -> Result<usize, DbError> {
        Ok(self.execute(UPDATE_SQL, params_from_iter(row_values(row)))?)
    }

    fn delete_asset_stat(&self, asset: &AssetIdentity) -> Result<usize, DbError> {
        Ok(self.execute(
            "DELETE FROM asset_stats WHERE asset_type = ?1 AND asset_code = ?2 AND asset_issuer = ?3",
            params![asset.kind.as_str(), asset.code, asset.issuer],
        )?)
    }

    fn insert_asset_stats(&self, rows: &[PersistedAssetAggregate]) -> Result<(), DbError> {
        let mut stmt = self.prepare_cached(INSERT_SQL)?;
        for row in rows {
            stmt.execute(params_from_iter(row_values(row)))?;
        }
        Ok(())
    }

    fn load_asset_stats(&self, limit: usize) -> Result<Vec<PersistedAssetAggregate>, DbError> {
        let mut stmt = self.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM asset_stats \
             ORDER BY asset_code, asset_issuer LIMIT ?1"
        ))?;
        let raw = stmt
            .query_map(params![limit as i64], read_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter().map(decode_row).collect()
    }

    fn count_asset_stats(&self) -> Result<u64, DbError> {
        let count: i64 = self.query_row("SELECT COUNT(*) FROM asset_stats", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
