//! End-to-end tests of the per-ledger processor against the in-memory store.

use asset_stats_common::{asset_contract_id, ledger_key_hash, AssetIdentity, Hash256, NetworkId};
use asset_stats_ingest::{
    changes_from_ledger_entry_changes, AssetStatsProcessor, AuthorizationBucket, Change,
    IngestError, MemoryStore, ReconcileMode,
};
use num_bigint::BigInt;
use stellar_xdr::curr::*;

// =============================================================================
// Test Helpers
// =============================================================================

fn account(n: u8) -> AccountId {
    AccountId(PublicKey::PublicKeyTypeEd25519(Uint256([n; 32])))
}

fn usd() -> Asset {
    Asset::CreditAlphanum4(AlphaNum4 {
        asset_code: AssetCode4(*b"USD\0"),
        issuer: account(200),
    })
}

fn usd_identity() -> AssetIdentity {
    AssetIdentity::try_from(&usd()).unwrap()
}

fn usd_sac() -> Hash256 {
    asset_contract_id(&NetworkId::testnet(), &usd()).unwrap()
}

fn ledger_entry(data: LedgerEntryData) -> LedgerEntry {
    LedgerEntry {
        last_modified_ledger_seq: 1,
        data,
        ext: LedgerEntryExt::V0,
    }
}

fn trustline(holder: u8, balance: i64, flags: u32) -> LedgerEntry {
    let Asset::CreditAlphanum4(alpha) = usd() else {
        unreachable!()
    };
    ledger_entry(LedgerEntryData::Trustline(TrustLineEntry {
        account_id: account(holder),
        asset: TrustLineAsset::CreditAlphanum4(alpha),
        balance,
        limit: i64::MAX,
        flags,
        ext: TrustLineEntryExt::V0,
    }))
}

fn usd_xlm_pool(usd_reserve: i64) -> LedgerEntry {
    ledger_entry(LedgerEntryData::LiquidityPool(LiquidityPoolEntry {
        liquidity_pool_id: PoolId(Hash([9; 32])),
        body: LiquidityPoolEntryBody::LiquidityPoolConstantProduct(
            LiquidityPoolEntryConstantProduct {
                params: LiquidityPoolConstantProductParameters {
                    asset_a: Asset::Native,
                    asset_b: usd(),
                    fee: 30,
                },
                reserve_a: 1_000,
                reserve_b: usd_reserve,
                total_pool_shares: 100,
                pool_shares_trust_line_count: 1,
            },
        ),
    }))
}

fn symbol(name: &str) -> ScVal {
    ScVal::Symbol(ScSymbol(name.try_into().unwrap()))
}

fn balance(contract: Hash256, holder: u8, amount: u64) -> LedgerEntry {
    let field = |name: &str, val: ScVal| ScMapEntry {
        key: symbol(name),
        val,
    };
    ledger_entry(LedgerEntryData::ContractData(ContractDataEntry {
        ext: ExtensionPoint::V0,
        contract: ScAddress::Contract(contract.into()),
        key: ScVal::Vec(Some(ScVec(
            vec![
                symbol("Balance"),
                ScVal::Address(ScAddress::Contract(ContractId(Hash([holder; 32])))),
            ]
            .try_into()
            .unwrap(),
        ))),
        durability: ContractDataDurability::Persistent,
        val: ScVal::Map(Some(ScMap(
            vec![
                field("amount", ScVal::I128(Int128Parts { hi: 0, lo: amount })),
                field("authorized", ScVal::Bool(true)),
                field("clawback", ScVal::Bool(false)),
            ]
            .try_into()
            .unwrap(),
        ))),
    }))
}

fn asset_info(contract: Hash256) -> LedgerEntry {
    let Asset::CreditAlphanum4(AlphaNum4 { issuer, .. }) = usd() else {
        unreachable!()
    };
    let AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(issuer))) = issuer;
    let details = ScVal::Map(Some(ScMap(
        vec![
            ScMapEntry {
                key: symbol("asset_code"),
                val: ScVal::String(ScString(b"USD".to_vec().try_into().unwrap())),
            },
            ScMapEntry {
                key: symbol("issuer"),
                val: ScVal::Bytes(ScBytes(issuer.to_vec().try_into().unwrap())),
            },
        ]
        .try_into()
        .unwrap(),
    )));
    let storage = ScMap(
        vec![ScMapEntry {
            key: ScVal::Vec(Some(ScVec(vec![symbol("AssetInfo")].try_into().unwrap()))),
            val: ScVal::Vec(Some(ScVec(
                vec![symbol("AlphaNum4"), details].try_into().unwrap(),
            ))),
        }]
        .try_into()
        .unwrap(),
    );
    ledger_entry(LedgerEntryData::ContractData(ContractDataEntry {
        ext: ExtensionPoint::V0,
        contract: ScAddress::Contract(contract.into()),
        key: ScVal::LedgerKeyContractInstance,
        durability: ContractDataDurability::Persistent,
        val: ScVal::ContractInstance(ScContractInstance {
            executable: ContractExecutable::StellarAsset,
            storage: Some(storage),
        }),
    }))
}

fn ttl_for(target: &LedgerEntry, live_until: u32) -> LedgerEntry {
    ledger_entry(LedgerEntryData::Ttl(TtlEntry {
        key_hash: ledger_key_hash(target).unwrap().into(),
        live_until_ledger_seq: live_until,
    }))
}

fn run_ledger(
    store: &mut MemoryStore,
    ledger: u32,
    changes: Vec<Change>,
) -> Result<asset_stats_ingest::CommitSummary, IngestError> {
    let mut processor =
        AssetStatsProcessor::new(NetworkId::testnet(), ledger, ReconcileMode::Incremental)?;
    for change in changes {
        processor.process_change(change)?;
    }
    processor.commit(store)
}

// =============================================================================
// Classic path
// =============================================================================

#[test]
fn test_new_trustline_inserts_row() {
    let mut store = MemoryStore::new();
    let summary = run_ledger(&mut store, 10, vec![Change::created(trustline(1, 0, 1))]).unwrap();
    assert_eq!(summary.classic.inserted, 1);

    let row = store.asset_stat(&usd_identity()).unwrap();
    let authorized = row.buckets.bucket(AuthorizationBucket::Authorized);
    assert_eq!(authorized.holders, 1);
    assert_eq!(authorized.balance.to_string(), "0");
}

#[test]
fn test_last_holder_removal_deletes_row() {
    let mut store = MemoryStore::new();
    run_ledger(&mut store, 10, vec![Change::created(trustline(1, 0, 1))]).unwrap();
    let summary = run_ledger(&mut store, 11, vec![Change::removed(trustline(1, 0, 1))]).unwrap();
    assert_eq!(summary.classic.removed, 1);
    assert!(store.asset_stat(&usd_identity()).is_none());
}

#[test]
fn test_removal_without_baseline_halts() {
    let mut store = MemoryStore::new();
    let err = run_ledger(&mut store, 10, vec![Change::removed(trustline(1, 0, 1))]).unwrap_err();
    assert!(err.is_invariant_violation());
    assert!(store.asset_stat(&usd_identity()).is_none());
}

#[test]
fn test_authorization_revocation_moves_bucket() {
    let mut store = MemoryStore::new();
    run_ledger(&mut store, 10, vec![Change::created(trustline(1, 500, 1))]).unwrap();
    run_ledger(
        &mut store,
        11,
        vec![Change::updated(trustline(1, 500, 1), trustline(1, 500, 2))],
    )
    .unwrap();

    let row = store.asset_stat(&usd_identity()).unwrap();
    assert!(row.buckets.bucket(AuthorizationBucket::Authorized).is_zero());
    let maintain = row
        .buckets
        .bucket(AuthorizationBucket::AuthorizedToMaintainLiabilities);
    assert_eq!(maintain.holders, 1);
    assert_eq!(maintain.balance, BigInt::from(500));
}

#[test]
fn test_mid_ledger_flush_matches_single_commit() {
    let mut flushed = MemoryStore::new();
    let mut processor =
        AssetStatsProcessor::new(NetworkId::testnet(), 10, ReconcileMode::Incremental).unwrap();
    processor.process_change(Change::created(trustline(1, 5, 1))).unwrap();
    assert_eq!(processor.working_set_len(), 1);
    processor.flush_classic(&mut flushed).unwrap();
    assert_eq!(processor.working_set_len(), 0);
    processor.process_change(Change::created(trustline(2, 7, 1))).unwrap();
    let summary = processor.commit(&mut flushed).unwrap();
    assert_eq!(summary.classic.inserted, 1);
    assert_eq!(summary.classic.updated, 1);

    let mut single = MemoryStore::new();
    run_ledger(
        &mut single,
        10,
        vec![
            Change::created(trustline(1, 5, 1)),
            Change::created(trustline(2, 7, 1)),
        ],
    )
    .unwrap();
    assert_eq!(
        flushed.asset_stat(&usd_identity()),
        single.asset_stat(&usd_identity())
    );
}

#[test]
fn test_pool_only_asset_survives_later_ledgers() {
    let mut store = MemoryStore::new();
    run_ledger(&mut store, 10, vec![Change::created(usd_xlm_pool(100))]).unwrap();
    let summary = run_ledger(
        &mut store,
        11,
        vec![Change::updated(usd_xlm_pool(100), usd_xlm_pool(150))],
    )
    .unwrap();
    assert_eq!(summary.classic.updated, 1);

    let row = store.asset_stat(&usd_identity()).unwrap();
    let pooled = row.buckets.bucket(AuthorizationBucket::LiquidityPool);
    assert_eq!(pooled.balance, BigInt::from(150));
    assert_eq!(pooled.holders, 0);
    assert_eq!(row.buckets.liquidity_pools(), 1);
    assert_eq!(row.buckets.total_authorized_holders(), 0);

    let summary = run_ledger(&mut store, 12, vec![Change::removed(usd_xlm_pool(150))]).unwrap();
    assert_eq!(summary.classic.removed, 1);
    assert!(store.asset_stat(&usd_identity()).is_none());
}

#[test]
fn test_last_trustline_leaving_keeps_pooled_asset() {
    let mut store = MemoryStore::new();
    run_ledger(
        &mut store,
        10,
        vec![
            Change::created(trustline(1, 0, 1)),
            Change::created(usd_xlm_pool(80)),
        ],
    )
    .unwrap();
    run_ledger(&mut store, 11, vec![Change::removed(trustline(1, 0, 1))]).unwrap();

    let row = store.asset_stat(&usd_identity()).unwrap();
    assert!(row.buckets.holders_all_zero());
    assert_eq!(row.buckets.liquidity_pools(), 1);
}

#[test]
fn test_store_failure_is_not_an_invariant_violation() {
    let mut store = MemoryStore::new();
    store.fail_writes(true);
    let err = run_ledger(&mut store, 10, vec![Change::created(trustline(1, 0, 1))]).unwrap_err();
    assert!(matches!(err, IngestError::Store { .. }));
}

#[test]
fn test_meta_stream_drives_processor() {
    let mut store = MemoryStore::new();
    let changes = changes_from_ledger_entry_changes(vec![
        LedgerEntryChange::Created(trustline(1, 10, 1)),
        LedgerEntryChange::Created(trustline(2, 20, 0)),
    ])
    .unwrap();
    run_ledger(&mut store, 10, changes).unwrap();
    let row = store.asset_stat(&usd_identity()).unwrap();
    assert_eq!(row.buckets.bucket(AuthorizationBucket::Unauthorized).holders, 1);
    assert_eq!(
        *row.buckets.total_authorized_amount(),
        BigInt::from(10)
    );
}

// =============================================================================
// Contract path
// =============================================================================

#[test]
fn test_balance_counted_until_it_lapses() {
    let mut store = MemoryStore::new();
    let entry = balance(usd_sac(), 1, 300);
    let summary = run_ledger(
        &mut store,
        100,
        vec![
            Change::created(entry.clone()),
            Change::created(ttl_for(&entry, 100)),
        ],
    )
    .unwrap();
    assert_eq!(summary.created_balances, 1);
    let stat = store.contract_stat(&usd_sac()).unwrap();
    assert_eq!(stat.active_holders, 1);
    assert_eq!(stat.active_balance, BigInt::from(300));

    // Live through ledger 100; archived when 101 closes.
    let summary = run_ledger(&mut store, 101, vec![]).unwrap();
    assert_eq!(summary.expired_balances, 1);
    let stat = store.contract_stat(&usd_sac()).unwrap();
    assert_eq!((stat.active_holders, stat.active_balance.clone()), (0, BigInt::from(0)));
    assert_eq!(stat.archived_holders, 1);
    assert_eq!(stat.archived_balance, BigInt::from(300));
    assert_eq!(store.balance_count(), 1);

    // Nothing left to expire twice.
    let summary = run_ledger(&mut store, 102, vec![]).unwrap();
    assert_eq!(summary.expired_balances, 0);
    assert_eq!(store.contract_stat(&usd_sac()).unwrap().archived_holders, 1);
}

#[test]
fn test_extension_of_archived_balance_restores_it() {
    let mut store = MemoryStore::new();
    let entry = balance(usd_sac(), 1, 300);
    run_ledger(
        &mut store,
        100,
        vec![
            Change::created(entry.clone()),
            Change::created(ttl_for(&entry, 100)),
        ],
    )
    .unwrap();
    run_ledger(&mut store, 101, vec![]).unwrap();

    let summary = run_ledger(
        &mut store,
        105,
        vec![Change::updated(ttl_for(&entry, 100), ttl_for(&entry, 500))],
    )
    .unwrap();
    assert_eq!(summary.restored_balances, 1);
    assert_eq!(summary.expired_balances, 0);
    let stat = store.contract_stat(&usd_sac()).unwrap();
    assert_eq!(stat.active_holders, 1);
    assert_eq!(stat.active_balance, BigInt::from(300));
    assert_eq!(stat.archived_holders, 0);
    assert_eq!(stat.archived_balance, BigInt::from(0));
    let key_hash = ledger_key_hash(&entry).unwrap();
    assert_eq!(store.balance(&key_hash).unwrap().expiration_ledger, 500);

    // Removing the restored balance drops the aggregate.
    run_ledger(
        &mut store,
        106,
        vec![
            Change::removed(entry.clone()),
            Change::removed(ttl_for(&entry, 500)),
        ],
    )
    .unwrap();
    assert!(store.contract_stat(&usd_sac()).is_none());
    assert_eq!(store.balance_count(), 0);
}

#[test]
fn test_restore_with_new_amount_moves_both_totals() {
    let mut store = MemoryStore::new();
    let before = balance(usd_sac(), 1, 300);
    run_ledger(
        &mut store,
        100,
        vec![
            Change::created(before.clone()),
            Change::created(ttl_for(&before, 100)),
        ],
    )
    .unwrap();
    run_ledger(&mut store, 101, vec![]).unwrap();

    let after = balance(usd_sac(), 1, 450);
    let summary = run_ledger(
        &mut store,
        110,
        vec![
            Change::updated(before.clone(), after.clone()),
            Change::updated(ttl_for(&before, 100), ttl_for(&after, 900)),
        ],
    )
    .unwrap();
    // Counted by the amount update, not a second time as a restore.
    assert_eq!(summary.restored_balances, 0);
    let stat = store.contract_stat(&usd_sac()).unwrap();
    assert_eq!(stat.active_holders, 1);
    assert_eq!(stat.active_balance, BigInt::from(450));
    assert_eq!(stat.archived_holders, 0);
    assert_eq!(stat.archived_balance, BigInt::from(0));
    let key_hash = ledger_key_hash(&after).unwrap();
    assert_eq!(store.balance(&key_hash).unwrap().amount, 450);
}

#[test]
fn test_extension_prevents_expiration() {
    let mut store = MemoryStore::new();
    let entry = balance(usd_sac(), 1, 300);
    run_ledger(
        &mut store,
        100,
        vec![
            Change::created(entry.clone()),
            Change::created(ttl_for(&entry, 100)),
        ],
    )
    .unwrap();

    let summary = run_ledger(
        &mut store,
        101,
        vec![Change::updated(ttl_for(&entry, 100), ttl_for(&entry, 500))],
    )
    .unwrap();
    assert_eq!(summary.expired_balances, 0);
    assert_eq!(store.contract_stat(&usd_sac()).unwrap().active_holders, 1);
    let key_hash = ledger_key_hash(&entry).unwrap();
    assert_eq!(store.balance(&key_hash).unwrap().expiration_ledger, 500);
}

#[test]
fn test_removal_of_lapsed_balance_subtracts_once() {
    let mut store = MemoryStore::new();
    let entry = balance(usd_sac(), 1, 300);
    run_ledger(
        &mut store,
        100,
        vec![
            Change::created(entry.clone()),
            Change::created(ttl_for(&entry, 100)),
        ],
    )
    .unwrap();

    // Swept and removed in the same ledger.
    let summary = run_ledger(
        &mut store,
        101,
        vec![
            Change::removed(entry.clone()),
            Change::removed(ttl_for(&entry, 100)),
        ],
    )
    .unwrap();
    assert_eq!(summary.expired_balances, 1);
    assert_eq!(summary.removed_balances, 1);
    assert!(store.contract_stat(&usd_sac()).is_none());
    assert_eq!(store.balance_count(), 0);
}

#[test]
fn test_balance_update_adjusts_amount() {
    let mut store = MemoryStore::new();
    let before = balance(usd_sac(), 1, 300);
    run_ledger(
        &mut store,
        100,
        vec![
            Change::created(before.clone()),
            Change::created(ttl_for(&before, 1_000)),
        ],
    )
    .unwrap();
    let after = balance(usd_sac(), 1, 1_300);
    run_ledger(&mut store, 101, vec![Change::updated(before, after.clone())]).unwrap();

    assert_eq!(
        store.contract_stat(&usd_sac()).unwrap().active_balance,
        BigInt::from(1_300)
    );
    let key_hash = ledger_key_hash(&after).unwrap();
    assert_eq!(store.balance(&key_hash).unwrap().amount, 1_300);
}

#[test]
fn test_asset_contract_discovery_and_forgery() {
    let mut store = MemoryStore::new();
    let genuine = asset_info(usd_sac());
    let forged_id = Hash256::from([77; 32]);
    let forged = asset_info(forged_id);
    let summary = run_ledger(
        &mut store,
        100,
        vec![
            Change::created(genuine.clone()),
            Change::created(ttl_for(&genuine, 9_000)),
            Change::created(forged),
        ],
    )
    .unwrap();
    assert_eq!(summary.asset_contracts, 1);

    let contract = store.asset_contract(&usd_sac()).unwrap();
    assert_eq!(contract.asset, usd_identity());
    assert_eq!(contract.expiration_ledger, Some(9_000));
    assert!(store.asset_contract(&forged_id).is_none());

    run_ledger(&mut store, 101, vec![Change::removed(genuine)]).unwrap();
    assert!(store.asset_contract(&usd_sac()).is_none());
}

#[test]
fn test_bulk_snapshot_then_incremental() {
    let mut store = MemoryStore::new();
    let entry = balance(usd_sac(), 1, 40);
    let mut processor =
        AssetStatsProcessor::new(NetworkId::testnet(), 50, ReconcileMode::Bulk).unwrap();
    for change in [
        Change::created(trustline(1, 10, 1)),
        Change::created(trustline(2, 20, 1)),
        Change::created(entry.clone()),
        Change::created(ttl_for(&entry, 60)),
    ] {
        processor.process_change(change).unwrap();
    }
    // Bulk windows are inserted once, at commit.
    processor.flush_classic(&mut store).unwrap();
    assert!(store.asset_stat(&usd_identity()).is_none());

    let summary = processor.commit(&mut store).unwrap();
    assert_eq!(summary.classic.inserted, 1);
    assert_eq!(summary.contracts.inserted, 1);
    assert_eq!(store.fetch_count(), 0);

    run_ledger(&mut store, 51, vec![Change::removed(trustline(2, 20, 1))]).unwrap();
    let row = store.asset_stat(&usd_identity()).unwrap();
    assert_eq!(row.buckets.total_authorized_holders(), 1);
    assert_eq!(*row.buckets.total_authorized_amount(), BigInt::from(10));
}
