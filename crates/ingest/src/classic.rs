//! Classic (trust-line based) asset aggregation.
//!
//! Trust lines, claimable balances and liquidity pools are turned into
//! per-bucket deltas and folded into a [`ClassicAggregateSet`] for the
//! current flush window. Native balances are never aggregated here.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use asset_stats_common::AssetIdentity;
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use stellar_xdr::curr::{
    Asset, ClaimableBalanceEntry, LedgerEntry, LedgerEntryData, LiquidityPoolEntry,
    LiquidityPoolEntryBody, TrustLineEntry,
};
use tracing::trace;

use crate::bucket::{classify, AuthorizationBucket};
use crate::change::{Change, EntryKind};
use crate::error::{IngestError, Result};

/// Balance and holder count of one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketTotals {
    pub balance: BigInt,
    pub holders: i64,
}

impl BucketTotals {
    pub fn is_zero(&self) -> bool {
        self.holders == 0 && self.balance.is_zero()
    }
}

/// Per-bucket totals for one asset.
///
/// Used both for in-window deltas ([`ClassicAggregateDelta`]) and for the
/// cumulative values of a persisted row. Besides the buckets it counts the
/// liquidity pools holding the asset in a reserve. Pools are not holders:
/// the count never enters a bucket's holder field or the authorized totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetBuckets {
    buckets: [BucketTotals; 5],
    liquidity_pools: i64,
}

/// Net change to an asset's buckets within one flush window.
pub type ClassicAggregateDelta = AssetBuckets;

impl AssetBuckets {
    pub fn bucket(&self, bucket: AuthorizationBucket) -> &BucketTotals {
        &self.buckets[bucket.index()]
    }

    pub fn bucket_mut(&mut self, bucket: AuthorizationBucket) -> &mut BucketTotals {
        &mut self.buckets[bucket.index()]
    }

    /// Adds `amount` to the balance and `holders` to the holder count of
    /// `bucket`.
    pub fn add(&mut self, bucket: AuthorizationBucket, amount: impl Into<BigInt>, holders: i64) {
        let totals = self.bucket_mut(bucket);
        totals.balance += amount.into();
        totals.holders += holders;
    }

    /// Adds `pools` to the number of liquidity pools holding the asset.
    pub fn add_liquidity_pools(&mut self, pools: i64) {
        self.liquidity_pools += pools;
    }

    pub fn liquidity_pools(&self) -> i64 {
        self.liquidity_pools
    }

    /// Bucket-wise sum.
    pub fn merge(&mut self, other: &AssetBuckets) {
        for (mine, theirs) in self.buckets.iter_mut().zip(other.buckets.iter()) {
            mine.balance += &theirs.balance;
            mine.holders += theirs.holders;
        }
        self.liquidity_pools += other.liquidity_pools;
    }

    pub fn iter(&self) -> impl Iterator<Item = (AuthorizationBucket, &BucketTotals)> {
        AuthorizationBucket::ALL.into_iter().zip(self.buckets.iter())
    }

    pub fn is_zero(&self) -> bool {
        self.liquidity_pools == 0 && self.buckets.iter().all(BucketTotals::is_zero)
    }

    pub fn holders_all_zero(&self) -> bool {
        self.buckets.iter().all(|b| b.holders == 0)
    }

    /// True once no holder and no liquidity pool references the asset. A
    /// persisted row in this state is deleted.
    pub fn is_unreferenced(&self) -> bool {
        self.liquidity_pools == 0 && self.holders_all_zero()
    }

    pub fn balances_all_zero(&self) -> bool {
        self.buckets.iter().all(|b| b.balance.is_zero())
    }

    /// True if any bucket has a negative balance or holder count, or the
    /// pool count is negative.
    pub fn has_negative(&self) -> bool {
        self.liquidity_pools < 0
            || self
                .buckets
                .iter()
                .any(|b| b.holders < 0 || b.balance.is_negative())
    }

    /// Mirror of the authorized bucket's balance.
    pub fn total_authorized_amount(&self) -> &BigInt {
        &self.bucket(AuthorizationBucket::Authorized).balance
    }

    /// Mirror of the authorized bucket's holder count.
    pub fn total_authorized_holders(&self) -> i64 {
        self.bucket(AuthorizationBucket::Authorized).holders
    }
}

/// In-memory per-asset deltas for one flush window.
///
/// An asset is present iff its accumulated delta is non-zero in at least
/// one bucket.
#[derive(Debug, Default)]
pub struct ClassicAggregateSet {
    assets: HashMap<AssetIdentity, AssetBuckets>,
}

impl ClassicAggregateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `delta` into the accumulator for `asset`, evicting it when
    /// every bucket nets to zero.
    pub fn add_delta(&mut self, asset: AssetIdentity, delta: &ClassicAggregateDelta) {
        match self.assets.entry(asset) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().merge(delta);
                if occupied.get().is_zero() {
                    trace!(asset = %occupied.key(), "Asset delta netted to zero");
                    occupied.remove();
                }
            }
            Entry::Vacant(vacant) => {
                if !delta.is_zero() {
                    vacant.insert(delta.clone());
                }
            }
        }
    }

    /// Dispatches a classic change to the matching extractor. Contract
    /// and TTL changes are ignored here.
    pub fn add_change(&mut self, change: &Change) -> Result<()> {
        let (pre, post) = (change.pre.as_ref(), change.post.as_ref());
        match change.kind()? {
            Some(EntryKind::Trustline) => {
                if let Some((asset, delta)) = trustline_delta(trustline(pre), trustline(post))? {
                    self.add_delta(asset, &delta);
                }
            }
            Some(EntryKind::ClaimableBalance) => {
                let delta = claimable_balance_delta(claimable_balance(pre), claimable_balance(post))?;
                if let Some((asset, delta)) = delta {
                    self.add_delta(asset, &delta);
                }
            }
            Some(EntryKind::LiquidityPool) => {
                for (asset, delta) in liquidity_pool_deltas(liquidity_pool(pre), liquidity_pool(post))? {
                    self.add_delta(asset, &delta);
                }
            }
            Some(EntryKind::ContractData) | Some(EntryKind::Ttl) | None => {}
        }
        Ok(())
    }

    pub fn get(&self, asset: &AssetIdentity) -> Option<&AssetBuckets> {
        self.assets.get(asset)
    }

    /// Number of distinct assets with a non-zero delta.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Consumes the set, returning deltas ordered by asset.
    pub fn into_sorted(self) -> Vec<(AssetIdentity, ClassicAggregateDelta)> {
        let mut all: Vec<_> = self.assets.into_iter().collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

fn trustline(entry: Option<&LedgerEntry>) -> Option<&TrustLineEntry> {
    match entry.map(|e| &e.data) {
        Some(LedgerEntryData::Trustline(t)) => Some(t),
        _ => None,
    }
}

fn claimable_balance(entry: Option<&LedgerEntry>) -> Option<&ClaimableBalanceEntry> {
    match entry.map(|e| &e.data) {
        Some(LedgerEntryData::ClaimableBalance(cb)) => Some(cb),
        _ => None,
    }
}

fn liquidity_pool(entry: Option<&LedgerEntry>) -> Option<&LiquidityPoolEntry> {
    match entry.map(|e| &e.data) {
        Some(LedgerEntryData::LiquidityPool(lp)) => Some(lp),
        _ => None,
    }
}

/// Identity of a non-native asset; `None` for native.
fn credit_identity(asset: &Asset) -> Result<Option<AssetIdentity>> {
    if matches!(asset, Asset::Native) {
        return Ok(None);
    }
    Ok(Some(AssetIdentity::try_from(asset)?))
}

/// Delta for a trust-line change: `-(balance, 1 holder)` from the pre
/// snapshot's bucket and `+(balance, 1 holder)` to the post snapshot's.
///
/// Returns `None` for pool-share and native trust lines.
pub fn trustline_delta(
    pre: Option<&TrustLineEntry>,
    post: Option<&TrustLineEntry>,
) -> Result<Option<(AssetIdentity, ClassicAggregateDelta)>> {
    let line = pre.or(post).ok_or_else(|| {
        IngestError::invariant("both pre and post trust lines are absent")
    })?;
    let asset = match AssetIdentity::from_trustline_asset(&line.asset)? {
        Some(asset) if !asset.is_native() => asset,
        _ => return Ok(None),
    };

    let mut delta = ClassicAggregateDelta::default();
    if let Some(pre) = pre {
        delta.add(classify(pre.flags), -BigInt::from(pre.balance), -1);
    }
    if let Some(post) = post {
        delta.add(classify(post.flags), post.balance, 1);
    }
    Ok(Some((asset, delta)))
}

/// Delta for a claimable-balance change, in the claimable-balance bucket.
///
/// Each claimable balance counts as one holder of that bucket.
pub fn claimable_balance_delta(
    pre: Option<&ClaimableBalanceEntry>,
    post: Option<&ClaimableBalanceEntry>,
) -> Result<Option<(AssetIdentity, ClassicAggregateDelta)>> {
    let entry = pre.or(post).ok_or_else(|| {
        IngestError::invariant("both pre and post claimable balances are absent")
    })?;
    let Some(asset) = credit_identity(&entry.asset)? else {
        return Ok(None);
    };

    let mut delta = ClassicAggregateDelta::default();
    if let Some(pre) = pre {
        delta.add(AuthorizationBucket::ClaimableBalance, -BigInt::from(pre.amount), -1);
    }
    if let Some(post) = post {
        delta.add(AuthorizationBucket::ClaimableBalance, post.amount, 1);
    }
    Ok(Some((asset, delta)))
}

/// Deltas for a liquidity-pool change: each non-native reserve asset gets
/// the reserve difference in its liquidity-pool bucket, and its pool count
/// moves by -1 for the pre snapshot and +1 for the post snapshot. Pools
/// never count as holders.
pub fn liquidity_pool_deltas(
    pre: Option<&LiquidityPoolEntry>,
    post: Option<&LiquidityPoolEntry>,
) -> Result<Vec<(AssetIdentity, ClassicAggregateDelta)>> {
    if pre.is_none() && post.is_none() {
        return Err(IngestError::invariant(
            "both pre and post liquidity pools are absent",
        ));
    }

    let mut deltas: Vec<(AssetIdentity, ClassicAggregateDelta)> = Vec::with_capacity(2);
    let mut add = |asset: &Asset, amount: BigInt, pools: i64| -> Result<()> {
        let Some(asset) = credit_identity(asset)? else {
            return Ok(());
        };
        let index = match deltas.iter().position(|(a, _)| *a == asset) {
            Some(i) => i,
            None => {
                deltas.push((asset, ClassicAggregateDelta::default()));
                deltas.len() - 1
            }
        };
        let delta = &mut deltas[index].1;
        delta.add(AuthorizationBucket::LiquidityPool, amount, 0);
        delta.add_liquidity_pools(pools);
        Ok(())
    };

    if let Some(pre) = pre {
        let LiquidityPoolEntryBody::LiquidityPoolConstantProduct(cp) = &pre.body;
        add(&cp.params.asset_a, -BigInt::from(cp.reserve_a), -1)?;
        add(&cp.params.asset_b, -BigInt::from(cp.reserve_b), -1)?;
    }
    if let Some(post) = post {
        let LiquidityPoolEntryBody::LiquidityPoolConstantProduct(cp) = &post.body;
        add(&cp.params.asset_a, BigInt::from(cp.reserve_a), 1)?;
        add(&cp.params.asset_b, BigInt::from(cp.reserve_b), 1)?;
    }
    Ok(deltas)
}
