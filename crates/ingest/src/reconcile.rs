//! Merging in-memory deltas with persisted aggregate rows.
//!
//! In [`ReconcileMode::Incremental`] every delta is read-before-write: the
//! persisted row is fetched, the delta folded in, and the row inserted,
//! updated or removed. Each single-row write must report exactly one row
//! affected. In [`ReconcileMode::Bulk`] the deltas are the complete state
//! of a fresh index and are written with one batched insert.

use std::fmt;

use asset_stats_common::{AssetIdentity, Hash256};
use tracing::{debug, info};

use crate::classic::ClassicAggregateDelta;
use crate::contract::ContractAggregateDelta;
use crate::error::{IngestError, Result};
use crate::store::{AssetStatsStore, ContractStatRow, PersistedAssetAggregate};

/// How a flush window's deltas relate to persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// The deltas describe the entire state; nothing is persisted yet.
    Bulk,
    /// The deltas apply on top of persisted rows.
    Incremental,
}

impl fmt::Display for ReconcileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileMode::Bulk => f.write_str("bulk"),
            ReconcileMode::Incremental => f.write_str("incremental"),
        }
    }
}

/// Row operations performed by one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
}

impl ReconcileSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.removed
    }

    pub fn merge(&mut self, other: ReconcileSummary) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.removed += other.removed;
    }
}

fn expect_one_row(rows: usize, op: &str, target: &dyn fmt::Display) -> Result<()> {
    if rows != 1 {
        return Err(IngestError::invariant(format!(
            "{rows} rows affected by {op} of {target}: concurrent mutation or reconciliation bug"
        )));
    }
    Ok(())
}

/// Reconciles classic per-asset deltas with the store.
pub fn reconcile_classic<S: AssetStatsStore>(
    store: &mut S,
    mode: ReconcileMode,
    deltas: Vec<(AssetIdentity, ClassicAggregateDelta)>,
) -> Result<ReconcileSummary> {
    let mut summary = ReconcileSummary::default();
    if deltas.is_empty() {
        return Ok(summary);
    }

    if mode == ReconcileMode::Bulk {
        let rows: Vec<PersistedAssetAggregate> = deltas
            .into_iter()
            .map(|(asset, buckets)| PersistedAssetAggregate { asset, buckets })
            .collect();
        store
            .bulk_insert_asset_stats(&rows)
            .map_err(|e| IngestError::store("bulk inserting asset stats", e))?;
        summary.inserted = rows.len();
        info!(rows = rows.len(), "Bulk inserted asset stats");
        return Ok(summary);
    }

    for (asset, delta) in deltas {
        let existing = store
            .fetch_asset_stat(&asset)
            .map_err(|e| IngestError::store(format!("fetching asset stat for {asset}"), e))?;

        let Some(mut row) = existing else {
            if delta.has_negative() {
                return Err(IngestError::invariant(format!(
                    "negative bucket with no baseline for asset {asset}"
                )));
            }
            let row = PersistedAssetAggregate {
                asset,
                buckets: delta,
            };
            let rows = store
                .insert_asset_stat(&row)
                .map_err(|e| IngestError::store(format!("inserting asset stat for {}", row.asset), e))?;
            expect_one_row(rows, "insert", &row.asset)?;
            summary.inserted += 1;
            continue;
        };

        row.buckets.merge(&delta);
        if row.buckets.is_unreferenced() {
            if !row.buckets.balances_all_zero() {
                return Err(IngestError::invariant(format!(
                    "balance survives removal of the last holder or pool for asset {asset}"
                )));
            }
            let rows = store
                .remove_asset_stat(&asset)
                .map_err(|e| IngestError::store(format!("removing asset stat for {asset}"), e))?;
            expect_one_row(rows, "remove", &asset)?;
            debug!(asset = %asset, "Removed asset stat");
            summary.removed += 1;
            continue;
        }
        if row.buckets.has_negative() {
            return Err(IngestError::invariant(format!(
                "negative bucket after merge for asset {asset}"
            )));
        }
        let rows = store
            .update_asset_stat(&row)
            .map_err(|e| IngestError::store(format!("updating asset stat for {asset}"), e))?;
        expect_one_row(rows, "update", &asset)?;
        summary.updated += 1;
    }
    Ok(summary)
}

/// Reconciles per-contract deltas with the store, following the same rules
/// as [`reconcile_classic`]. A row is removed once its active and archived
/// totals are all zero.
pub fn reconcile_contract_stats<S: AssetStatsStore>(
    store: &mut S,
    mode: ReconcileMode,
    deltas: Vec<(Hash256, ContractAggregateDelta)>,
) -> Result<ReconcileSummary> {
    let mut summary = ReconcileSummary::default();
    if deltas.is_empty() {
        return Ok(summary);
    }

    if mode == ReconcileMode::Bulk {
        let rows: Vec<ContractStatRow> = deltas
            .into_iter()
            .map(|(contract_id, delta)| ContractStatRow::new(contract_id, delta))
            .collect();
        store
            .bulk_insert_contract_stats(&rows)
            .map_err(|e| IngestError::store("bulk inserting contract stats", e))?;
        summary.inserted = rows.len();
        info!(rows = rows.len(), "Bulk inserted contract stats");
        return Ok(summary);
    }

    for (contract_id, delta) in deltas {
        let existing = store
            .fetch_contract_stat(&contract_id)
            .map_err(|e| IngestError::store(format!("fetching contract stat for {contract_id}"), e))?;

        let Some(row) = existing else {
            if delta.has_negative() {
                return Err(IngestError::invariant(format!(
                    "negative contract stat with no baseline for {contract_id}"
                )));
            }
            let row = ContractStatRow::new(contract_id, delta);
            let rows = store
                .insert_contract_stat(&row)
                .map_err(|e| IngestError::store(format!("inserting contract stat for {contract_id}"), e))?;
            expect_one_row(rows, "insert", &contract_id)?;
            summary.inserted += 1;
            continue;
        };

        let mut totals = row.totals();
        totals.merge(&delta);
        if totals.has_negative() {
            return Err(IngestError::invariant(format!(
                "negative contract stat after merge for {contract_id}"
            )));
        }
        if totals.has_unheld_balance() {
            return Err(IngestError::invariant(format!(
                "balance survives holder removal for contract {contract_id}"
            )));
        }
        if totals.is_zero() {
            let rows = store
                .remove_contract_stat(&contract_id)
                .map_err(|e| IngestError::store(format!("removing contract stat for {contract_id}"), e))?;
            expect_one_row(rows, "remove", &contract_id)?;
            debug!(contract_id = %contract_id, "Removed contract stat");
            summary.removed += 1;
            continue;
        }
        let rows = store
            .update_contract_stat(&ContractStatRow::new(contract_id, totals))
            .map_err(|e| IngestError::store(format!("updating contract stat for {contract_id}"), e))?;
        expect_one_row(rows, "update", &contract_id)?;
        summary.updated += 1;
    }
    Ok(summary)
}
