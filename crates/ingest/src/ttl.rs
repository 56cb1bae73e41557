//! Expiration (TTL) tracking for one flush window.
//!
//! TTL entries are keyed by the content hash of the ledger key they extend.
//! Contract balance transitions look up their expiration here, so all TTL
//! changes of a window must be seen before contract data is processed.

use std::collections::HashMap;

use asset_stats_common::Hash256;
use stellar_xdr::curr::{LedgerEntry, LedgerEntryData, TtlEntry};

use crate::change::Change;
use crate::error::{IngestError, Result};

/// Side maps of created, removed and updated TTL entries.
#[derive(Debug, Default)]
pub struct ExpirationTracker {
    current_ledger: u32,
    created: HashMap<Hash256, u32>,
    removed: HashMap<Hash256, u32>,
    updated: HashMap<Hash256, (u32, u32)>,
}

impl ExpirationTracker {
    pub fn new(current_ledger: u32) -> Self {
        Self {
            current_ledger,
            ..Default::default()
        }
    }

    /// Records a TTL change.
    ///
    /// An update that keeps the live-until ledger is ignored. One that lowers
    /// it, or leaves it below the current ledger, cannot come from a valid
    /// ledger and is an invariant violation.
    pub fn add_change(&mut self, change: &Change) -> Result<()> {
        let pre = ttl(change.pre.as_ref())?;
        let post = ttl(change.post.as_ref())?;
        match (pre, post) {
            (None, Some(post)) => {
                self.created
                    .insert(post.key_hash.clone().into(), post.live_until_ledger_seq);
            }
            (Some(pre), None) => {
                self.removed
                    .insert(pre.key_hash.clone().into(), pre.live_until_ledger_seq);
            }
            (Some(pre), Some(post)) => {
                let (before, after) = (pre.live_until_ledger_seq, post.live_until_ledger_seq);
                if before == after {
                    return Ok(());
                }
                if before > after {
                    return Err(IngestError::invariant(format!(
                        "expiration ledger decreased from {before} to {after}"
                    )));
                }
                if after < self.current_ledger {
                    return Err(IngestError::invariant(format!(
                        "expiration ledger {after} is before current ledger {}",
                        self.current_ledger
                    )));
                }
                self.updated
                    .insert(pre.key_hash.clone().into(), (before, after));
            }
            (None, None) => {
                return Err(IngestError::invariant(
                    "both pre and post TTL entries are absent",
                ))
            }
        }
        Ok(())
    }

    /// Live-until ledger of a TTL entry created in this window.
    pub fn created(&self, key_hash: &Hash256) -> Option<u32> {
        self.created.get(key_hash).copied()
    }

    /// Last live-until ledger of a TTL entry removed in this window.
    pub fn removed(&self, key_hash: &Hash256) -> Option<u32> {
        self.removed.get(key_hash).copied()
    }

    /// `(before, after)` live-until ledgers of an extended TTL entry.
    pub fn updated(&self, key_hash: &Hash256) -> Option<(u32, u32)> {
        self.updated.get(key_hash).copied()
    }

    /// True if the entry's expiration was extended in this window.
    pub fn was_extended(&self, key_hash: &Hash256) -> bool {
        self.updated.contains_key(key_hash)
    }

    /// Extended entries whose expiration ledger is older than the previous
    /// ledger, ordered by key hash. An earlier sweep moved their balances to
    /// the archive.
    pub fn restored(&self) -> Vec<Hash256> {
        let mut out: Vec<_> = self
            .updated
            .iter()
            .filter(|(_, (before, _))| u64::from(*before) + 1 < u64::from(self.current_ledger))
            .map(|(key, _)| *key)
            .collect();
        out.sort();
        out
    }

    /// New live-until ledgers of every extended entry, ordered by key hash.
    pub fn extensions(&self) -> Vec<(Hash256, u32)> {
        let mut out: Vec<_> = self
            .updated
            .iter()
            .map(|(key, (_, after))| (*key, *after))
            .collect();
        out.sort();
        out
    }
}

fn ttl(entry: Option<&LedgerEntry>) -> Result<Option<&TtlEntry>> {
    match entry.map(|e| &e.data) {
        None => Ok(None),
        Some(LedgerEntryData::Ttl(ttl)) => Ok(Some(ttl)),
        Some(other) => Err(IngestError::invariant(format!(
            "expected a TTL entry, got {:?}",
            other.discriminant()
        ))),
    }
}
