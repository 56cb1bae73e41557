//! Ledger-entry changes as seen by the aggregators.
//!
//! A [`Change`] is the net before/after pair for one ledger entry within a
//! flush window. [`changes_from_ledger_entry_changes`] pairs the `State`
//! snapshot that precedes each `Updated`/`Removed` record in transaction
//! meta; [`ChangeCompactor`] then folds every change to the same entry into
//! one pair, as the aggregators expect.

use std::collections::HashMap;

use asset_stats_common::{ledger_key_hash, Hash256};
use stellar_xdr::curr::{LedgerEntry, LedgerEntryChange, LedgerEntryData};

use crate::error::{IngestError, Result};

/// Entry types the asset-stats processor consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Trustline,
    ClaimableBalance,
    LiquidityPool,
    ContractData,
    Ttl,
}

impl EntryKind {
    /// `None` for entry types that carry no asset balances.
    pub fn of(entry: &LedgerEntry) -> Option<Self> {
        match entry.data {
            LedgerEntryData::Trustline(_) => Some(EntryKind::Trustline),
            LedgerEntryData::ClaimableBalance(_) => Some(EntryKind::ClaimableBalance),
            LedgerEntryData::LiquidityPool(_) => Some(EntryKind::LiquidityPool),
            LedgerEntryData::ContractData(_) => Some(EntryKind::ContractData),
            LedgerEntryData::Ttl(_) => Some(EntryKind::Ttl),
            _ => None,
        }
    }
}

/// Net before/after snapshots of one ledger entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub pre: Option<LedgerEntry>,
    pub post: Option<LedgerEntry>,
}

impl Change {
    pub fn created(post: LedgerEntry) -> Self {
        Self {
            pre: None,
            post: Some(post),
        }
    }

    pub fn updated(pre: LedgerEntry, post: LedgerEntry) -> Self {
        Self {
            pre: Some(pre),
            post: Some(post),
        }
    }

    pub fn removed(pre: LedgerEntry) -> Self {
        Self {
            pre: Some(pre),
            post: None,
        }
    }

    /// Kind of the entry, taken from whichever snapshot is present.
    ///
    /// Fails if both snapshots are absent or they disagree on entry type.
    pub fn kind(&self) -> Result<Option<EntryKind>> {
        match (&self.pre, &self.post) {
            (None, None) => Err(IngestError::invariant(
                "change has neither a pre nor a post snapshot",
            )),
            (Some(pre), Some(post)) => {
                let kind = EntryKind::of(pre);
                if kind != EntryKind::of(post) {
                    return Err(IngestError::invariant(format!(
                        "change pre/post entry types differ: {:?} vs {:?}",
                        pre.data.discriminant(),
                        post.data.discriminant()
                    )));
                }
                Ok(kind)
            }
            (Some(entry), None) | (None, Some(entry)) => Ok(EntryKind::of(entry)),
        }
    }
}

/// Turns raw `LedgerEntryChanges` into [`Change`]s.
///
/// `Updated` and `Removed` must be preceded by the `State` of the same entry.
/// `Restored` entries are treated as creations: they re-enter the live state.
pub fn changes_from_ledger_entry_changes<I>(changes: I) -> Result<Vec<Change>>
where
    I: IntoIterator<Item = LedgerEntryChange>,
{
    let mut out = Vec::new();
    let mut pending_state: Option<LedgerEntry> = None;

    for change in changes {
        match change {
            LedgerEntryChange::State(entry) => {
                if pending_state.replace(entry).is_some() {
                    return Err(IngestError::invariant(
                        "two consecutive STATE records in ledger entry changes",
                    ));
                }
            }
            LedgerEntryChange::Updated(post) => {
                let pre = pending_state
                    .take()
                    .ok_or_else(|| IngestError::invariant("UPDATED record without STATE"))?;
                out.push(Change::updated(pre, post));
            }
            LedgerEntryChange::Removed(_) => {
                let pre = pending_state
                    .take()
                    .ok_or_else(|| IngestError::invariant("REMOVED record without STATE"))?;
                out.push(Change::removed(pre));
            }
            LedgerEntryChange::Created(post) | LedgerEntryChange::Restored(post) => {
                if pending_state.is_some() {
                    return Err(IngestError::invariant(
                        "STATE record not followed by UPDATED or REMOVED",
                    ));
                }
                out.push(Change::created(post));
            }
        }
    }

    if pending_state.is_some() {
        return Err(IngestError::invariant("dangling STATE record at end of changes"));
    }
    Ok(out)
}

/// Folds the changes of a window into one net pair per ledger entry.
///
/// The first pre snapshot and the last post snapshot of an entry are kept.
/// An entry created and removed within the window disappears; one removed
/// and created again becomes an update. Changes come out in the order their
/// entries were first seen.
#[derive(Debug, Default)]
pub struct ChangeCompactor {
    index: HashMap<Hash256, usize>,
    changes: Vec<Change>,
}

impl ChangeCompactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_change(&mut self, change: Change) -> Result<()> {
        let entry = change.post.as_ref().or(change.pre.as_ref()).ok_or_else(|| {
            IngestError::invariant("change has neither a pre nor a post snapshot")
        })?;
        let key_hash = ledger_key_hash(entry)?;

        let Some(&slot) = self.index.get(&key_hash) else {
            self.index.insert(key_hash, self.changes.len());
            self.changes.push(change);
            return Ok(());
        };

        let existing = &mut self.changes[slot];
        match (existing.post.is_some(), change.pre.is_some()) {
            (true, true) | (false, false) => existing.post = change.post,
            (true, false) => {
                return Err(IngestError::invariant(format!(
                    "entry {key_hash} created while it already exists"
                )))
            }
            (false, true) => {
                return Err(IngestError::invariant(format!(
                    "entry {key_hash} changed after it was removed"
                )))
            }
        }
        Ok(())
    }

    /// Number of distinct entries seen, including ones that netted out.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Net changes, without entries that were created and removed again.
    pub fn drain(self) -> Vec<Change> {
        self.changes
            .into_iter()
            .filter(|c| c.pre.is_some() || c.post.is_some())
            .collect()
    }
}

/// Compacts `changes` with a fresh [`ChangeCompactor`].
pub fn compact_changes<I>(changes: I) -> Result<Vec<Change>>
where
    I: IntoIterator<Item = Change>,
{
    let mut compactor = ChangeCompactor::new();
    for change in changes {
        compactor.add_change(change)?;
    }
    Ok(compactor.drain())
}
