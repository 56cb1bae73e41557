//! Change-stream processor for one ledger.
//!
//! Routes each [`Change`] to the classic aggregate set, the expiration
//! tracker or the contract-data buffer, then writes everything to an
//! [`AssetStatsStore`] on [`AssetStatsProcessor::commit`].
//!
//! Contract-data changes are held back until commit because the TTL
//! changes that decide whether a balance is active can arrive later in the
//! same ledger. Balances whose TTL lapses are kept as archived rows and
//! counted as active again once their TTL is extended.

use asset_stats_common::{Hash256, NetworkId};
use tracing::{debug, info};

use crate::change::{Change, EntryKind};
use crate::classic::ClassicAggregateSet;
use crate::contract::{ContractAggregateDelta, ContractAggregateSet, ContractChanges};
use crate::error::{IngestError, Result};
use crate::reconcile::{reconcile_classic, reconcile_contract_stats, ReconcileMode, ReconcileSummary};
use crate::sac::{ContractDataDecoder, ContractEntry};
use crate::store::{AssetContract, AssetStatsStore, ContractBalanceRecord};
use crate::ttl::ExpirationTracker;

/// What one commit wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub classic: ReconcileSummary,
    pub contracts: ReconcileSummary,
    pub asset_contracts: usize,
    pub created_balances: usize,
    pub removed_balances: usize,
    pub restored_balances: usize,
    pub expired_balances: usize,
}

pub struct AssetStatsProcessor {
    mode: ReconcileMode,
    current_ledger: u32,
    decoder: ContractDataDecoder,
    classic: ClassicAggregateSet,
    expirations: ExpirationTracker,
    contract_changes: Vec<Change>,
    classic_flushed: ReconcileSummary,
}

impl AssetStatsProcessor {
    pub fn new(network: NetworkId, current_ledger: u32, mode: ReconcileMode) -> Result<Self> {
        Ok(Self {
            mode,
            current_ledger,
            decoder: ContractDataDecoder::new(network)?,
            classic: ClassicAggregateSet::new(),
            expirations: ExpirationTracker::new(current_ledger),
            contract_changes: Vec::new(),
            classic_flushed: ReconcileSummary::default(),
        })
    }

    pub fn mode(&self) -> ReconcileMode {
        self.mode
    }

    pub fn process_change(&mut self, change: Change) -> Result<()> {
        match change.kind()? {
            Some(EntryKind::Trustline | EntryKind::ClaimableBalance | EntryKind::LiquidityPool) => {
                self.classic.add_change(&change)
            }
            Some(EntryKind::Ttl) => self.expirations.add_change(&change),
            Some(EntryKind::ContractData) => {
                if self.is_relevant_contract_change(&change) {
                    self.contract_changes.push(change);
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// A contract-data change matters if either snapshot decodes as a
    /// balance or as asset metadata.
    fn is_relevant_contract_change(&self, change: &Change) -> bool {
        [change.pre.as_ref(), change.post.as_ref()]
            .into_iter()
            .flatten()
            .any(|entry| !matches!(self.decoder.decode(entry), ContractEntry::Unrecognized))
    }

    /// Number of distinct assets in the classic working set.
    pub fn working_set_len(&self) -> usize {
        self.classic.len()
    }

    /// Reconciles and resets the classic working set mid-ledger.
    ///
    /// Only meaningful in incremental mode: a bulk snapshot must be
    /// inserted once, so in bulk mode this does nothing.
    pub fn flush_classic<S: AssetStatsStore>(&mut self, store: &mut S) -> Result<ReconcileSummary> {
        if self.mode == ReconcileMode::Bulk {
            debug!("Skipping intermediate classic flush in bulk mode");
            return Ok(ReconcileSummary::default());
        }
        let deltas = std::mem::take(&mut self.classic).into_sorted();
        let summary = reconcile_classic(store, self.mode, deltas)?;
        debug!(
            ledger = self.current_ledger,
            inserted = summary.inserted,
            updated = summary.updated,
            removed = summary.removed,
            "Flushed classic working set"
        );
        self.classic_flushed.merge(summary);
        Ok(summary)
    }

    /// Writes every accumulated change to `store`.
    pub fn commit<S: AssetStatsStore>(self, store: &mut S) -> Result<CommitSummary> {
        let Self {
            mode,
            current_ledger,
            decoder,
            classic,
            expirations,
            contract_changes,
            classic_flushed,
        } = self;

        let mut summary = CommitSummary {
            classic: classic_flushed,
            ..CommitSummary::default()
        };
        summary
            .classic
            .merge(reconcile_classic(store, mode, classic.into_sorted())?);

        let mut contracts = ContractAggregateSet::new(current_ledger);
        for change in &contract_changes {
            contracts.add_change(&decoder, &expirations, store, change)?;
        }

        match mode {
            ReconcileMode::Bulk => {
                let changes = contracts.into_changes();
                summary.asset_contracts = changes.asset_contracts.len();
                summary.created_balances = changes.created_balances.len();
                store
                    .insert_asset_contracts(&changes.asset_contracts)
                    .map_err(|e| IngestError::store("inserting asset contracts", e))?;
                store
                    .insert_contract_balances(&changes.created_balances)
                    .map_err(|e| IngestError::store("inserting contract balances", e))?;
                summary.contracts = reconcile_contract_stats(store, mode, changes.stats)?;
            }
            ReconcileMode::Incremental => {
                let changes = commit_contract_rows(store, &expirations, contracts)?;
                summary.asset_contracts = changes.asset_contracts.len();
                summary.created_balances = changes.created_balances.len();
                summary.removed_balances = changes.removed_balances;
                summary.restored_balances = changes.restored;
                summary.expired_balances = changes.expired;
                summary.contracts = reconcile_contract_stats(store, mode, changes.stats)?;
            }
        }

        info!(
            ledger = current_ledger,
            mode = %mode,
            assets_inserted = summary.classic.inserted,
            assets_updated = summary.classic.updated,
            assets_removed = summary.classic.removed,
            contracts_changed = summary.contracts.total(),
            asset_contracts = summary.asset_contracts,
            created_balances = summary.created_balances,
            removed_balances = summary.removed_balances,
            restored_balances = summary.restored_balances,
            expired_balances = summary.expired_balances,
            "Committed asset stats"
        );
        Ok(summary)
    }
}

struct CommittedRows {
    stats: Vec<(Hash256, ContractAggregateDelta)>,
    asset_contracts: Vec<AssetContract>,
    created_balances: Vec<ContractBalanceRecord>,
    removed_balances: usize,
    restored: usize,
    expired: usize,
}

/// Persists contract rows, then folds restored and lapsed balances into the
/// set and returns the aggregate deltas left to reconcile.
///
/// Amount updates and extensions are written before the sweep so it sees
/// post-change amounts and skips extended rows. Removed rows are deleted
/// after it: a removal classified as archived by its TTL must first be
/// moved out of the active totals.
fn commit_contract_rows<S: AssetStatsStore>(
    store: &mut S,
    expirations: &ExpirationTracker,
    mut contracts: ContractAggregateSet,
) -> Result<CommittedRows> {
    store
        .update_contract_balance_amounts(&contracts.updated_amounts())
        .map_err(|e| IngestError::store("updating contract balance amounts", e))?;
    store
        .insert_contract_balances(contracts.created_balances())
        .map_err(|e| IngestError::store("inserting contract balances", e))?;

    let restored = contracts.apply_restored(expirations, store)?;

    let extensions = expirations.extensions();
    store
        .update_contract_balance_expirations(&extensions)
        .map_err(|e| IngestError::store("updating contract balance expirations", e))?;
    // Balances lapsing at the end of the previous ledger stay in place as
    // archived rows.
    let expired = match contracts.current_ledger().checked_sub(1) {
        Some(ledger) => store
            .fetch_balances_expiring_at(ledger)
            .map_err(|e| IngestError::store(format!("loading balances expiring at {ledger}"), e))?,
        None => Vec::new(),
    };
    let archived = contracts.apply_expired(expirations, &expired);
    store
        .remove_contract_balances(contracts.removed_balances())
        .map_err(|e| IngestError::store("removing contract balances", e))?;

    let ContractChanges {
        stats,
        created_balances,
        removed_balances,
        asset_contracts,
        removed_asset_contracts,
        ..
    } = contracts.into_changes();

    store
        .insert_asset_contracts(&asset_contracts)
        .map_err(|e| IngestError::store("inserting asset contracts", e))?;
    store
        .remove_asset_contracts(&removed_asset_contracts)
        .map_err(|e| IngestError::store("removing asset contracts", e))?;
    store
        .update_asset_contract_expirations(&extensions)
        .map_err(|e| IngestError::store("updating asset contract expirations", e))?;

    if restored > 0 || archived > 0 {
        debug!(restored, archived, "Moved contract balances between active and archived");
    }
    Ok(CommittedRows {
        stats,
        asset_contracts,
        created_balances,
        removed_balances: removed_balances.len(),
        restored,
        expired: archived,
    })
}
