//! Contract-asset aggregation.
//!
//! Tracks, per asset contract, the net change to holders and balance within
//! one flush window, split by whether the balance is active or archived. A
//! balance is active while its expiration ledger is at or after the current
//! ledger; once that ledger passes it is archived until its expiration is
//! extended again (a restore) or the entry is removed.
//!
//! Besides the aggregate deltas the set collects the row-level changes the
//! store needs: created and removed balance rows, amount updates and newly
//! discovered asset contracts.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use asset_stats_common::{ledger_key_hash, Hash256};
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use tracing::{debug, trace};

use crate::change::Change;
use crate::error::{IngestError, Result};
use crate::sac::{ContractDataDecoder, ContractEntry};
use crate::store::{AssetContract, AssetStatsStore, ContractBalanceRecord};
use crate::ttl::ExpirationTracker;

/// Holders and balance of one asset contract, active and archived.
///
/// Used both for in-window deltas and for the cumulative values of a
/// persisted row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractAggregateDelta {
    pub active_balance: BigInt,
    pub active_holders: i64,
    pub archived_balance: BigInt,
    pub archived_holders: i64,
}

impl ContractAggregateDelta {
    pub fn active(balance: impl Into<BigInt>, holders: i64) -> Self {
        Self {
            active_balance: balance.into(),
            active_holders: holders,
            ..Self::default()
        }
    }

    pub fn archived(balance: impl Into<BigInt>, holders: i64) -> Self {
        Self {
            archived_balance: balance.into(),
            archived_holders: holders,
            ..Self::default()
        }
    }

    /// An active balance of `amount` lapsing into the archive.
    pub fn expired(amount: u128) -> Self {
        Self {
            active_balance: -BigInt::from(amount),
            active_holders: -1,
            archived_balance: BigInt::from(amount),
            archived_holders: 1,
        }
    }

    /// An archived balance of `archived` coming back as `active`.
    pub fn restored(archived: u128, active: u128) -> Self {
        Self {
            active_balance: BigInt::from(active),
            active_holders: 1,
            archived_balance: -BigInt::from(archived),
            archived_holders: -1,
        }
    }

    pub fn merge(&mut self, other: &ContractAggregateDelta) {
        self.active_balance += &other.active_balance;
        self.active_holders += other.active_holders;
        self.archived_balance += &other.archived_balance;
        self.archived_holders += other.archived_holders;
    }

    pub fn is_zero(&self) -> bool {
        self.active_holders == 0
            && self.archived_holders == 0
            && self.active_balance.is_zero()
            && self.archived_balance.is_zero()
    }

    pub fn has_negative(&self) -> bool {
        self.active_holders < 0
            || self.archived_holders < 0
            || self.active_balance.is_negative()
            || self.archived_balance.is_negative()
    }

    /// True if a balance is left on a side with no holders.
    pub fn has_unheld_balance(&self) -> bool {
        (self.active_holders == 0 && !self.active_balance.is_zero())
            || (self.archived_holders == 0 && !self.archived_balance.is_zero())
    }
}

/// Row-level output of a [`ContractAggregateSet`].
#[derive(Debug, Default)]
pub struct ContractChanges {
    pub stats: Vec<(Hash256, ContractAggregateDelta)>,
    pub created_balances: Vec<ContractBalanceRecord>,
    pub removed_balances: Vec<Hash256>,
    pub updated_amounts: Vec<(Hash256, u128)>,
    pub asset_contracts: Vec<AssetContract>,
    pub removed_asset_contracts: Vec<Hash256>,
}

#[derive(Debug)]
pub struct ContractAggregateSet {
    current_ledger: u32,
    stats: HashMap<Hash256, ContractAggregateDelta>,
    created_balances: Vec<ContractBalanceRecord>,
    removed_balances: Vec<Hash256>,
    updated_amounts: BTreeMap<Hash256, u128>,
    asset_contracts: Vec<AssetContract>,
    removed_asset_contracts: Vec<Hash256>,
}

impl ContractAggregateSet {
    pub fn new(current_ledger: u32) -> Self {
        Self {
            current_ledger,
            stats: HashMap::new(),
            created_balances: Vec::new(),
            removed_balances: Vec::new(),
            updated_amounts: BTreeMap::new(),
            asset_contracts: Vec::new(),
            removed_asset_contracts: Vec::new(),
        }
    }

    /// Folds one contract-data change into the set.
    ///
    /// `expirations` must already hold every TTL change of the window. An
    /// updated balance whose TTL did not change takes its expiration from
    /// the persisted row in `store`; nothing is written to `store` here.
    pub fn add_change<S: AssetStatsStore>(
        &mut self,
        decoder: &ContractDataDecoder,
        expirations: &ExpirationTracker,
        store: &mut S,
        change: &Change,
    ) -> Result<()> {
        let pre = change.pre.as_ref().map(|e| decoder.decode(e));
        let post = change.post.as_ref().map(|e| decoder.decode(e));

        // Whether a change is about metadata is decided by the pre snapshot
        // when there is one.
        let metadata = match (&pre, &post) {
            (Some(pre), _) => matches!(pre, ContractEntry::Metadata(_)),
            (None, Some(post)) => matches!(post, ContractEntry::Metadata(_)),
            (None, None) => {
                return Err(IngestError::invariant(
                    "both pre and post contract data entries are absent",
                ))
            }
        };
        if metadata {
            return self.add_metadata_change(expirations, change, pre, post);
        }

        match (change.pre.as_ref(), change.post.as_ref()) {
            (None, Some(entry)) => {
                let Some(ContractEntry::Balance(record)) = post else {
                    return Ok(());
                };
                let key_hash = ledger_key_hash(entry)?;
                let Some(expiration) = expirations.created(&key_hash) else {
                    trace!(key_hash = %key_hash, "Created balance has no TTL entry; ignoring");
                    return Ok(());
                };
                if expiration >= self.current_ledger {
                    self.add(record.contract_id, ContractAggregateDelta::active(record.amount, 1));
                } else {
                    debug!(
                        key_hash = %key_hash,
                        expiration,
                        current_ledger = self.current_ledger,
                        "Created balance already lapsed; counted as archived"
                    );
                    self.add(record.contract_id, ContractAggregateDelta::archived(record.amount, 1));
                }
                self.created_balances.push(ContractBalanceRecord {
                    key_hash,
                    contract_id: record.contract_id,
                    holder: record.holder,
                    amount: record.amount,
                    expiration_ledger: expiration,
                });
            }
            (Some(entry), None) => {
                let key_hash = ledger_key_hash(entry)?;
                // A forged entry may have been recorded as a balance before
                // being rewritten; its row must still go.
                self.removed_balances.push(key_hash);

                let Some(ContractEntry::Balance(record)) = pre else {
                    return Ok(());
                };
                let amount = -BigInt::from(record.amount);
                match expirations.removed(&key_hash) {
                    Some(expiration) if expiration >= self.current_ledger => {
                        self.add(record.contract_id, ContractAggregateDelta::active(amount, -1));
                    }
                    Some(_) => {
                        self.add(record.contract_id, ContractAggregateDelta::archived(amount, -1));
                    }
                    None => {}
                }
            }
            (Some(_), Some(entry)) => {
                let (Some(ContractEntry::Balance(before)), Some(ContractEntry::Balance(after))) =
                    (pre, post)
                else {
                    return Ok(());
                };
                if before.holder != after.holder || before.contract_id != after.contract_id {
                    return Ok(());
                }
                if before.amount == after.amount {
                    return Ok(());
                }
                let key_hash = ledger_key_hash(entry)?;
                let (pre_expiration, post_expiration) = match expirations.updated(&key_hash) {
                    Some(pair) => pair,
                    None => {
                        let row = store.fetch_contract_balance(&key_hash).map_err(|e| {
                            IngestError::store(format!("fetching contract balance {key_hash}"), e)
                        })?;
                        let Some(row) = row else {
                            trace!(key_hash = %key_hash, "Updated balance has no row; ignoring");
                            return Ok(());
                        };
                        (row.expiration_ledger, row.expiration_ledger)
                    }
                };
                if post_expiration < self.current_ledger {
                    return Err(IngestError::invariant(format!(
                        "contract balance {key_hash} updated while archived (expiration ledger {post_expiration})"
                    )));
                }

                if self.was_active(pre_expiration) {
                    let delta = BigInt::from(after.amount) - BigInt::from(before.amount);
                    self.add(after.contract_id, ContractAggregateDelta::active(delta, 0));
                } else {
                    debug!(key_hash = %key_hash, pre_expiration, "Contract balance restored");
                    self.add(
                        after.contract_id,
                        ContractAggregateDelta::restored(before.amount, after.amount),
                    );
                }
                self.updated_amounts.insert(key_hash, after.amount);
            }
            (None, None) => {
                return Err(IngestError::invariant(
                    "both pre and post contract data entries are absent",
                ))
            }
        }
        Ok(())
    }

    /// True if an entry with this expiration was still counted as active at
    /// the end of the previous ledger.
    fn was_active(&self, expiration: u32) -> bool {
        u64::from(expiration) + 1 >= u64::from(self.current_ledger)
    }

    fn add_metadata_change(
        &mut self,
        expirations: &ExpirationTracker,
        change: &Change,
        pre: Option<ContractEntry>,
        post: Option<ContractEntry>,
    ) -> Result<()> {
        match (pre, post) {
            (None, Some(ContractEntry::Metadata(info))) => {
                let entry = change
                    .post
                    .as_ref()
                    .ok_or_else(|| IngestError::invariant("metadata change lost its post snapshot"))?;
                let key_hash = ledger_key_hash(entry)?;
                debug!(contract_id = %info.contract_id, asset = %info.asset, "Discovered asset contract");
                self.asset_contracts.push(AssetContract {
                    key_hash,
                    contract_id: info.contract_id,
                    asset: info.asset,
                    expiration_ledger: expirations.created(&key_hash),
                });
            }
            (Some(ContractEntry::Metadata(info)), None) => {
                self.removed_asset_contracts.push(info.contract_id);
            }
            (Some(ContractEntry::Metadata(before)), Some(after)) => match after {
                ContractEntry::Metadata(after) if after.asset == before.asset => {}
                _ => {
                    return Err(IngestError::invariant(format!(
                        "asset contract {} changed asset",
                        before.contract_id
                    )))
                }
            },
            _ => {}
        }
        Ok(())
    }

    /// Moves archived balances whose expiration was extended in this window
    /// back to active, reading their amounts from `store`.
    ///
    /// Balances whose amount changed in the window were already restored by
    /// [`add_change`](Self::add_change) and are skipped. Returns the number
    /// of balances restored.
    pub fn apply_restored<S: AssetStatsStore>(
        &mut self,
        expirations: &ExpirationTracker,
        store: &mut S,
    ) -> Result<usize> {
        let mut restored = 0;
        for key_hash in expirations.restored() {
            if self.updated_amounts.contains_key(&key_hash) {
                continue;
            }
            let row = store
                .fetch_contract_balance(&key_hash)
                .map_err(|e| IngestError::store(format!("fetching contract balance {key_hash}"), e))?;
            let Some(row) = row else {
                continue;
            };
            trace!(key_hash = %key_hash, "Restoring archived balance");
            self.add(row.contract_id, ContractAggregateDelta::restored(row.amount, row.amount));
            restored += 1;
        }
        Ok(restored)
    }

    /// Moves balance rows that lapsed at the end of the previous ledger to
    /// the archive.
    ///
    /// Rows whose expiration was extended in this window are skipped: they
    /// were re-extended before lapsing. Returns the number of rows archived.
    pub fn apply_expired(
        &mut self,
        expirations: &ExpirationTracker,
        rows: &[ContractBalanceRecord],
    ) -> usize {
        let mut archived = 0;
        for row in rows {
            if expirations.was_extended(&row.key_hash) {
                trace!(key_hash = %row.key_hash, "Skipping expired balance that was extended");
                continue;
            }
            // Classified as archived when it was created.
            if self.created_balances.iter().any(|b| b.key_hash == row.key_hash) {
                continue;
            }
            self.add(row.contract_id, ContractAggregateDelta::expired(row.amount));
            archived += 1;
        }
        archived
    }

    fn add(&mut self, contract_id: Hash256, delta: ContractAggregateDelta) {
        match self.stats.entry(contract_id) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().merge(&delta);
                if occupied.get().is_zero() {
                    occupied.remove();
                }
            }
            Entry::Vacant(vacant) => {
                if !delta.is_zero() {
                    vacant.insert(delta);
                }
            }
        }
    }

    pub fn current_ledger(&self) -> u32 {
        self.current_ledger
    }

    pub fn get(&self, contract_id: &Hash256) -> Option<&ContractAggregateDelta> {
        self.stats.get(contract_id)
    }

    /// Number of asset contracts with a non-zero delta.
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn created_balances(&self) -> &[ContractBalanceRecord] {
        &self.created_balances
    }

    pub fn removed_balances(&self) -> &[Hash256] {
        &self.removed_balances
    }

    /// Post-change amounts of updated balances, ordered by key hash.
    pub fn updated_amounts(&self) -> Vec<(Hash256, u128)> {
        self.updated_amounts.iter().map(|(k, v)| (*k, *v)).collect()
    }

    pub fn asset_contracts(&self) -> &[AssetContract] {
        &self.asset_contracts
    }

    /// Consumes the set. Stats are ordered by contract ID.
    pub fn into_changes(self) -> ContractChanges {
        let mut stats: Vec<_> = self.stats.into_iter().collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        ContractChanges {
            stats,
            created_balances: self.created_balances,
            removed_balances: self.removed_balances,
            updated_amounts: self.updated_amounts.into_iter().collect(),
            asset_contracts: self.asset_contracts,
            removed_asset_contracts: self.removed_asset_contracts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::test_utils::*;
    use asset_stats_common::NetworkId;
    use stellar_xdr::curr::{LedgerEntry, LedgerEntryData, ScVal};

    const LEDGER: u32 = 100;

    fn decoder() -> ContractDataDecoder {
        ContractDataDecoder::new(NetworkId::testnet()).unwrap()
    }

    fn tracker_with(changes: &[Change]) -> ExpirationTracker {
        let mut tracker = ExpirationTracker::new(LEDGER);
        for change in changes {
            tracker.add_change(change).unwrap();
        }
        tracker
    }

    fn fold(set: &mut ContractAggregateSet, tracker: &ExpirationTracker, change: Change) {
        set.add_change(&decoder(), tracker, &mut MemoryStore::new(), &change)
            .unwrap();
    }

    fn row_for(entry: &LedgerEntry, amount: u128, expiration_ledger: u32) -> ContractBalanceRecord {
        ContractBalanceRecord {
            key_hash: ledger_key_hash(entry).unwrap(),
            contract_id: sac_id(&usd()),
            holder: make_hash(1),
            amount,
            expiration_ledger,
        }
    }

    fn store_with(rows: &[ContractBalanceRecord]) -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert_contract_balances(rows).unwrap();
        store
    }

    #[test]
    fn test_created_active_balance_counted() {
        let entry = make_balance_entry(sac_id(&usd()), make_hash(1), 500, 0);
        let tracker = tracker_with(&[Change::created(make_ttl_for(&entry, LEDGER + 10))]);
        let mut set = ContractAggregateSet::new(LEDGER);
        fold(&mut set, &tracker, Change::created(entry.clone()));

        let stat = set.get(&sac_id(&usd())).unwrap();
        assert_eq!(*stat, ContractAggregateDelta::active(500, 1));
        assert_eq!(set.created_balances().len(), 1);
        assert_eq!(set.created_balances()[0].expiration_ledger, LEDGER + 10);
        assert_eq!(
            set.created_balances()[0].key_hash,
            ledger_key_hash(&entry).unwrap()
        );
    }

    #[test]
    fn test_created_lapsed_balance_counted_as_archived() {
        let entry = make_balance_entry(sac_id(&usd()), make_hash(1), 500, 0);
        let tracker = tracker_with(&[Change::created(make_ttl_for(&entry, LEDGER - 1))]);
        let mut set = ContractAggregateSet::new(LEDGER);
        fold(&mut set, &tracker, Change::created(entry));
        assert_eq!(
            *set.get(&sac_id(&usd())).unwrap(),
            ContractAggregateDelta::archived(500, 1)
        );
        assert_eq!(set.created_balances().len(), 1);
    }

    #[test]
    fn test_created_without_ttl_ignored() {
        let entry = make_balance_entry(sac_id(&usd()), make_hash(1), 500, 0);
        let mut set = ContractAggregateSet::new(LEDGER);
        fold(&mut set, &tracker_with(&[]), Change::created(entry));
        assert!(set.is_empty());
    }

    #[test]
    fn test_removed_active_balance_decrements() {
        let entry = make_balance_entry(sac_id(&usd()), make_hash(1), 500, 0);
        let tracker = tracker_with(&[Change::removed(make_ttl_for(&entry, LEDGER))]);
        let mut set = ContractAggregateSet::new(LEDGER);
        fold(&mut set, &tracker, Change::removed(entry.clone()));
        let stat = set.get(&sac_id(&usd())).unwrap();
        assert_eq!(*stat, ContractAggregateDelta::active(-500, -1));
        assert_eq!(set.removed_balances(), &[ledger_key_hash(&entry).unwrap()]);
    }

    #[test]
    fn test_removed_archived_balance_decrements_archive() {
        let entry = make_balance_entry(sac_id(&usd()), make_hash(1), 500, 0);
        let tracker = tracker_with(&[Change::removed(make_ttl_for(&entry, LEDGER - 5))]);
        let mut set = ContractAggregateSet::new(LEDGER);
        fold(&mut set, &tracker, Change::removed(entry));
        assert_eq!(
            *set.get(&sac_id(&usd())).unwrap(),
            ContractAggregateDelta::archived(-500, -1)
        );
        assert_eq!(set.removed_balances().len(), 1);
    }

    #[test]
    fn test_removed_unrecognized_entry_still_recorded() {
        let entry = make_contract_data_entry(make_hash(3), sc_symbol("junk"), ScVal::U32(1));
        let mut set = ContractAggregateSet::new(LEDGER);
        fold(&mut set, &tracker_with(&[]), Change::removed(entry));
        assert_eq!(set.removed_balances().len(), 1);
    }

    #[test]
    fn test_updated_amount_uses_row_expiration() {
        let pre = make_balance_entry(sac_id(&usd()), make_hash(1), 500, 0);
        let post = make_balance_entry(sac_id(&usd()), make_hash(1), 200, 0);
        let mut store = store_with(&[row_for(&pre, 500, LEDGER + 20)]);
        let mut set = ContractAggregateSet::new(LEDGER);
        set.add_change(&decoder(), &tracker_with(&[]), &mut store, &Change::updated(pre, post.clone()))
            .unwrap();
        let stat = set.get(&sac_id(&usd())).unwrap();
        assert_eq!(*stat, ContractAggregateDelta::active(-300, 0));
        let changes = set.into_changes();
        assert_eq!(
            changes.updated_amounts,
            vec![(ledger_key_hash(&post).unwrap(), 200)]
        );
    }

    #[test]
    fn test_updated_amount_without_row_or_ttl_ignored() {
        let pre = make_balance_entry(sac_id(&usd()), make_hash(1), 500, 0);
        let post = make_balance_entry(sac_id(&usd()), make_hash(1), 200, 0);
        let mut set = ContractAggregateSet::new(LEDGER);
        fold(&mut set, &tracker_with(&[]), Change::updated(pre, post));
        assert!(set.is_empty());
        assert!(set.into_changes().updated_amounts.is_empty());
    }

    #[test]
    fn test_update_of_archived_balance_is_invariant_violation() {
        let pre = make_balance_entry(sac_id(&usd()), make_hash(1), 500, 0);
        let post = make_balance_entry(sac_id(&usd()), make_hash(1), 200, 0);
        let mut store = store_with(&[row_for(&pre, 500, LEDGER - 3)]);
        let mut set = ContractAggregateSet::new(LEDGER);
        let err = set
            .add_change(&decoder(), &tracker_with(&[]), &mut store, &Change::updated(pre, post))
            .unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_update_with_lapsed_ttl_restores_balance() {
        let pre = make_balance_entry(sac_id(&usd()), make_hash(1), 500, 0);
        let post = make_balance_entry(sac_id(&usd()), make_hash(1), 600, 0);
        let tracker = tracker_with(&[Change::updated(
            make_ttl_for(&pre, 50),
            make_ttl_for(&pre, 200),
        )]);
        let mut set = ContractAggregateSet::new(LEDGER);
        fold(&mut set, &tracker, Change::updated(pre, post));

        let stat = set.get(&sac_id(&usd())).unwrap();
        assert_eq!(stat.active_holders, 1);
        assert_eq!(stat.active_balance, BigInt::from(600));
        assert_eq!(stat.archived_holders, -1);
        assert_eq!(stat.archived_balance, BigInt::from(-500));
    }

    #[test]
    fn test_update_of_balance_lapsing_last_ledger_stays_active() {
        let pre = make_balance_entry(sac_id(&usd()), make_hash(1), 500, 0);
        let post = make_balance_entry(sac_id(&usd()), make_hash(1), 600, 0);
        let tracker = tracker_with(&[Change::updated(
            make_ttl_for(&pre, LEDGER - 1),
            make_ttl_for(&pre, LEDGER + 100),
        )]);
        let mut set = ContractAggregateSet::new(LEDGER);
        fold(&mut set, &tracker, Change::updated(pre, post));
        assert_eq!(
            *set.get(&sac_id(&usd())).unwrap(),
            ContractAggregateDelta::active(100, 0)
        );
    }

    #[test]
    fn test_extension_of_archived_balance_restores_row() {
        let entry = make_balance_entry(sac_id(&usd()), make_hash(1), 500, 0);
        let tracker = tracker_with(&[Change::updated(
            make_ttl_for(&entry, 50),
            make_ttl_for(&entry, 200),
        )]);
        let mut store = store_with(&[row_for(&entry, 500, 50)]);
        let mut set = ContractAggregateSet::new(LEDGER);
        assert_eq!(set.apply_restored(&tracker, &mut store).unwrap(), 1);
        assert_eq!(
            *set.get(&sac_id(&usd())).unwrap(),
            ContractAggregateDelta::restored(500, 500)
        );
    }

    #[test]
    fn test_restore_counted_once_when_amount_also_changes() {
        let pre = make_balance_entry(sac_id(&usd()), make_hash(1), 500, 0);
        let post = make_balance_entry(sac_id(&usd()), make_hash(1), 600, 0);
        let tracker = tracker_with(&[Change::updated(
            make_ttl_for(&pre, 50),
            make_ttl_for(&pre, 200),
        )]);
        let mut store = store_with(&[row_for(&pre, 500, 50)]);
        let mut set = ContractAggregateSet::new(LEDGER);
        set.add_change(&decoder(), &tracker, &mut store, &Change::updated(pre, post))
            .unwrap();
        assert_eq!(set.apply_restored(&tracker, &mut store).unwrap(), 0);
        assert_eq!(set.get(&sac_id(&usd())).unwrap().active_holders, 1);
    }

    #[test]
    fn test_extension_of_active_balance_is_not_a_restore() {
        let entry = make_balance_entry(sac_id(&usd()), make_hash(1), 500, 0);
        let tracker = tracker_with(&[Change::updated(
            make_ttl_for(&entry, LEDGER - 1),
            make_ttl_for(&entry, 200),
        )]);
        let mut store = store_with(&[row_for(&entry, 500, LEDGER - 1)]);
        let mut set = ContractAggregateSet::new(LEDGER);
        assert_eq!(set.apply_restored(&tracker, &mut store).unwrap(), 0);
        assert!(set.is_empty());
    }

    #[test]
    fn test_unchanged_or_foreign_update_ignored() {
        let pre = make_balance_entry(sac_id(&usd()), make_hash(1), 500, 0);
        let same = make_balance_entry(sac_id(&usd()), make_hash(1), 500, 1);
        let mut set = ContractAggregateSet::new(LEDGER);
        fold(&mut set, &tracker_with(&[]), Change::updated(pre.clone(), same));
        assert!(set.is_empty());

        let mut invalid = pre.clone();
        if let LedgerEntryData::ContractData(data) = &mut invalid.data {
            data.val = ScVal::U32(7);
        }
        fold(&mut set, &tracker_with(&[]), Change::updated(pre, invalid));
        assert!(set.is_empty());
        assert!(set.into_changes().updated_amounts.is_empty());
    }

    #[test]
    fn test_sweep_archives_rows_not_extended() {
        let lapsed = ContractBalanceRecord {
            key_hash: make_hash(10),
            contract_id: sac_id(&usd()),
            holder: make_hash(1),
            amount: 40,
            expiration_ledger: LEDGER - 1,
        };
        let extended = ContractBalanceRecord {
            key_hash: make_hash(11),
            ..lapsed.clone()
        };
        let tracker = tracker_with(&[Change::updated(
            make_ttl_entry(11, LEDGER - 1),
            make_ttl_entry(11, LEDGER + 50),
        )]);
        let mut set = ContractAggregateSet::new(LEDGER);
        set.apply_expired(&tracker, &[lapsed, extended]);
        let stat = set.get(&sac_id(&usd())).unwrap();
        assert_eq!(*stat, ContractAggregateDelta::expired(40));
        assert_eq!(stat.archived_holders, 1);
    }

    #[test]
    fn test_balance_created_already_lapsed_is_archived_once() {
        let entry = make_balance_entry(sac_id(&usd()), make_hash(1), 500, 0);
        let tracker = tracker_with(&[Change::created(make_ttl_for(&entry, LEDGER - 1))]);
        let mut set = ContractAggregateSet::new(LEDGER);
        fold(&mut set, &tracker, Change::created(entry.clone()));
        let rows = set.created_balances().to_vec();
        set.apply_expired(&tracker, &rows);
        assert_eq!(
            *set.get(&sac_id(&usd())).unwrap(),
            ContractAggregateDelta::archived(500, 1)
        );
    }

    #[test]
    fn test_delta_checks() {
        assert!(ContractAggregateDelta::default().is_zero());
        let mut delta = ContractAggregateDelta::expired(7);
        assert!(delta.has_negative());
        delta.merge(&ContractAggregateDelta::restored(7, 7));
        assert!(delta.is_zero());

        let unheld = ContractAggregateDelta::archived(3, 0);
        assert!(unheld.has_unheld_balance());
        assert!(!ContractAggregateDelta::archived(0, 0).has_unheld_balance());
    }

    #[test]
    fn test_asset_contract_discovery() {
        let entry = make_asset_info_entry(sac_id(&usd()), &usd());
        let tracker = tracker_with(&[Change::created(make_ttl_for(&entry, LEDGER + 1000))]);
        let mut set = ContractAggregateSet::new(LEDGER);
        fold(&mut set, &tracker, Change::created(entry));
        let contracts = set.asset_contracts();
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].asset, usd_identity());
        assert_eq!(contracts[0].expiration_ledger, Some(LEDGER + 1000));
        assert!(set.is_empty());
    }

    #[test]
    fn test_asset_contract_changing_asset_is_invariant_violation() {
        let pre = make_asset_info_entry(sac_id(&usd()), &usd());
        let mut post = pre.clone();
        if let LedgerEntryData::ContractData(data) = &mut post.data {
            data.val = ScVal::U32(0);
        }
        let mut set = ContractAggregateSet::new(LEDGER);
        let err = set
            .add_change(
                &decoder(),
                &tracker_with(&[]),
                &mut MemoryStore::new(),
                &Change::updated(pre, post),
            )
            .unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_forged_metadata_not_discovered() {
        let entry = make_asset_info_entry(make_hash(77), &usd());
        let mut set = ContractAggregateSet::new(LEDGER);
        fold(&mut set, &tracker_with(&[]), Change::created(entry));
        assert!(set.asset_contracts().is_empty());
    }
}
