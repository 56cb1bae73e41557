//! Asset-aggregate accounting for a Stellar ledger indexer.
//!
//! This crate turns a stream of ledger-entry changes into exact running
//! totals per asset: balances and holder counts for classic assets, and
//! active balances and holders for Stellar Asset Contract balances whose
//! storage is subject to expiration.
//!
//! # Architecture Overview
//!
//! - [`AssetStatsProcessor`]: per-ledger driver. Routes each [`Change`] and
//!   commits the result to an [`AssetStatsStore`].
//! - [`ClassicAggregateSet`]: per-asset deltas across the five
//!   [`AuthorizationBucket`]s, fed by trust lines, claimable balances and
//!   liquidity pools.
//! - [`ContractAggregateSet`]: per-contract active balance and holder
//!   deltas, driven by decoded contract storage and the
//!   [`ExpirationTracker`].
//! - [`ContractDataDecoder`]: defensive decoding of asset-contract metadata
//!   and balance entries.
//! - [`reconcile_classic`] / [`reconcile_contract_stats`]: fold deltas into
//!   persisted rows, enforcing the consistency invariants.
//!
//! # Flush Window
//!
//! ```ignore
//! use asset_stats_ingest::{AssetStatsProcessor, ReconcileMode, MemoryStore};
//!
//! let mut processor = AssetStatsProcessor::new(network, ledger, ReconcileMode::Incremental)?;
//! for change in changes {
//!     processor.process_change(change)?;
//!     if processor.working_set_len() > batch_size {
//!         processor.flush_classic(&mut store)?;
//!     }
//! }
//! let summary = processor.commit(&mut store)?;
//! ```
//!
//! All arithmetic on amounts uses [`num_bigint::BigInt`], so no sequence of
//! deltas can overflow.

mod bucket;
mod change;
mod classic;
mod contract;
mod error;
mod memory;
mod processor;
mod reconcile;
pub mod sac;
mod store;
mod ttl;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use bucket::{classify, AuthorizationBucket};
pub use change::{
    changes_from_ledger_entry_changes, compact_changes, Change, ChangeCompactor, EntryKind,
};
pub use classic::{
    claimable_balance_delta, liquidity_pool_deltas, trustline_delta, AssetBuckets, BucketTotals,
    ClassicAggregateDelta, ClassicAggregateSet,
};
pub use contract::{ContractAggregateDelta, ContractAggregateSet, ContractChanges};
pub use error::{IngestError, Result};
pub use memory::{MemoryStore, MemoryStoreError};
pub use processor::{AssetStatsProcessor, CommitSummary};
pub use reconcile::{reconcile_classic, reconcile_contract_stats, ReconcileMode, ReconcileSummary};
pub use sac::{AssetContractInfo, BalanceRecord, ContractDataDecoder, ContractEntry};
pub use store::{
    AssetContract, AssetStatsStore, ContractBalanceRecord, ContractStatRow,
    PersistedAssetAggregate,
};
pub use ttl::ExpirationTracker;
