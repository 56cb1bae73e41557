//! Ledger-entry builders shared by tests.
//!
//! Available to other crates with the `test-utils` feature.

use asset_stats_common::{asset_contract_id, ledger_key_hash, AssetIdentity, Hash256, NetworkId};
use stellar_xdr::curr::{
    AccountId, AlphaNum12, AlphaNum4, Asset, ClaimableBalanceEntry, ClaimableBalanceEntryExt,
    ClaimableBalanceId, ContractDataDurability, ContractDataEntry, ContractExecutable,
    ExtensionPoint, Hash, Int128Parts, LedgerEntry, LedgerEntryData, LedgerEntryExt,
    LiquidityPoolConstantProductParameters, LiquidityPoolEntry, LiquidityPoolEntryBody,
    LiquidityPoolEntryConstantProduct, PoolId, PublicKey, ScAddress, ScBytes, ScContractInstance,
    ScMap, ScMapEntry, ScString, ScSymbol, ScVal, ScVec, TrustLineAsset, TrustLineEntry,
    TrustLineEntryExt, TtlEntry, Uint256,
};

/// `AUTHORIZED_FLAG` of a trust line.
pub const AUTHORIZED: u32 = 1;
/// `AUTHORIZED_TO_MAINTAIN_LIABILITIES_FLAG` of a trust line.
pub const AUTHORIZED_TO_MAINTAIN_LIABILITIES: u32 = 2;

pub fn make_hash(n: u8) -> Hash256 {
    Hash256::from([n; 32])
}

pub fn make_account_id(n: u8) -> AccountId {
    AccountId(PublicKey::PublicKeyTypeEd25519(Uint256([n; 32])))
}

/// `USD` issued by account 200.
pub fn usd() -> Asset {
    Asset::CreditAlphanum4(AlphaNum4 {
        asset_code: stellar_xdr::curr::AssetCode4(*b"USD\0"),
        issuer: make_account_id(200),
    })
}

pub fn usd_identity() -> AssetIdentity {
    AssetIdentity::try_from(&usd()).expect("valid asset")
}

/// `EURODOLLAR` issued by account 201.
pub fn eurodollar() -> Asset {
    Asset::CreditAlphanum12(AlphaNum12 {
        asset_code: stellar_xdr::curr::AssetCode12(*b"EURODOLLAR\0\0"),
        issuer: make_account_id(201),
    })
}

pub fn eurodollar_identity() -> AssetIdentity {
    AssetIdentity::try_from(&eurodollar()).expect("valid asset")
}

/// Testnet asset-contract ID of `asset`.
pub fn sac_id(asset: &Asset) -> Hash256 {
    asset_contract_id(&NetworkId::testnet(), asset).expect("derivable contract id")
}

pub fn entry(data: LedgerEntryData) -> LedgerEntry {
    LedgerEntry {
        last_modified_ledger_seq: 1,
        data,
        ext: LedgerEntryExt::V0,
    }
}

pub fn make_trustline(n: u8, asset: &Asset, balance: i64, flags: u32) -> TrustLineEntry {
    let asset = match asset {
        Asset::Native => TrustLineAsset::Native,
        Asset::CreditAlphanum4(a) => TrustLineAsset::CreditAlphanum4(a.clone()),
        Asset::CreditAlphanum12(a) => TrustLineAsset::CreditAlphanum12(a.clone()),
    };
    TrustLineEntry {
        account_id: make_account_id(n),
        asset,
        balance,
        limit: i64::MAX,
        flags,
        ext: TrustLineEntryExt::V0,
    }
}

pub fn make_pool_share_trustline(n: u8) -> TrustLineEntry {
    TrustLineEntry {
        account_id: make_account_id(n),
        asset: TrustLineAsset::PoolShare(PoolId(Hash([n; 32]))),
        balance: 100,
        limit: i64::MAX,
        flags: AUTHORIZED,
        ext: TrustLineEntryExt::V0,
    }
}

pub fn trustline_data(line: &TrustLineEntry) -> LedgerEntryData {
    LedgerEntryData::Trustline(line.clone())
}

pub fn trustline_entry(n: u8, asset: &Asset, balance: i64, flags: u32) -> LedgerEntry {
    entry(trustline_data(&make_trustline(n, asset, balance, flags)))
}

pub fn make_claimable_balance(n: u8, asset: &Asset, amount: i64) -> ClaimableBalanceEntry {
    ClaimableBalanceEntry {
        balance_id: ClaimableBalanceId::ClaimableBalanceIdTypeV0(Hash([n; 32])),
        claimants: Default::default(),
        asset: asset.clone(),
        amount,
        ext: ClaimableBalanceEntryExt::V0,
    }
}

pub fn make_liquidity_pool(
    n: u8,
    asset_a: &Asset,
    reserve_a: i64,
    asset_b: &Asset,
    reserve_b: i64,
) -> LiquidityPoolEntry {
    LiquidityPoolEntry {
        liquidity_pool_id: PoolId(Hash([n; 32])),
        body: LiquidityPoolEntryBody::LiquidityPoolConstantProduct(
            LiquidityPoolEntryConstantProduct {
                params: LiquidityPoolConstantProductParameters {
                    asset_a: asset_a.clone(),
                    asset_b: asset_b.clone(),
                    fee: 30,
                },
                reserve_a,
                reserve_b,
                total_pool_shares: 1_000,
                pool_shares_trust_line_count: 1,
            },
        ),
    }
}

pub fn make_ttl_entry(n: u8, live_until: u32) -> LedgerEntry {
    entry(LedgerEntryData::Ttl(TtlEntry {
        key_hash: Hash([n; 32]),
        live_until_ledger_seq: live_until,
    }))
}

/// Key hash carried by [`make_ttl_entry`]`(n, _)`.
pub fn ttl_key_hash(n: u8) -> Hash256 {
    make_hash(n)
}

/// TTL entry guarding `target`.
pub fn make_ttl_for(target: &LedgerEntry, live_until: u32) -> LedgerEntry {
    let key_hash = ledger_key_hash(target).expect("hashable key");
    entry(LedgerEntryData::Ttl(TtlEntry {
        key_hash: key_hash.into(),
        live_until_ledger_seq: live_until,
    }))
}

pub fn sc_symbol(name: &str) -> ScVal {
    ScVal::Symbol(ScSymbol(name.try_into().expect("short symbol")))
}

pub fn sc_vec(items: Vec<ScVal>) -> ScVal {
    ScVal::Vec(Some(ScVec(items.try_into().expect("small vec"))))
}

pub fn sc_map(entries: Vec<ScMapEntry>) -> ScVal {
    ScVal::Map(Some(ScMap(entries.try_into().expect("small map"))))
}

fn map_entry(key: &str, val: ScVal) -> ScMapEntry {
    ScMapEntry {
        key: sc_symbol(key),
        val,
    }
}

fn contract_address(id: Hash256) -> ScAddress {
    ScAddress::Contract(id.into())
}

pub fn make_contract_data_entry(contract: Hash256, key: ScVal, val: ScVal) -> LedgerEntry {
    entry(LedgerEntryData::ContractData(ContractDataEntry {
        ext: ExtensionPoint::V0,
        contract: contract_address(contract),
        key,
        durability: ContractDataDurability::Persistent,
        val,
    }))
}

/// Balance of `holder` in asset contract `contract`.
pub fn make_balance_entry(
    contract: Hash256,
    holder: Hash256,
    amount: u64,
    last_modified: u32,
) -> LedgerEntry {
    let mut entry = make_balance_entry_raw(contract, holder, Int128Parts { hi: 0, lo: amount });
    entry.last_modified_ledger_seq = last_modified;
    entry
}

pub fn make_balance_entry_raw(contract: Hash256, holder: Hash256, amount: Int128Parts) -> LedgerEntry {
    let key = sc_vec(vec![
        sc_symbol("Balance"),
        ScVal::Address(contract_address(holder)),
    ]);
    let val = sc_map(vec![
        map_entry("amount", ScVal::I128(amount)),
        map_entry("authorized", ScVal::Bool(true)),
        map_entry("clawback", ScVal::Bool(false)),
    ]);
    make_contract_data_entry(contract, key, val)
}

/// Instance entry of `contract` claiming to wrap `asset`.
pub fn make_asset_info_entry(contract: Hash256, asset: &Asset) -> LedgerEntry {
    let kind = match asset {
        Asset::Native => "Native",
        Asset::CreditAlphanum4(_) => "AlphaNum4",
        Asset::CreditAlphanum12(_) => "AlphaNum12",
    };
    make_asset_info_entry_with_kind(contract, kind, asset)
}

/// Like [`make_asset_info_entry`] with an arbitrary variant symbol.
pub fn make_asset_info_entry_with_kind(contract: Hash256, kind: &str, asset: &Asset) -> LedgerEntry {
    let info = match asset {
        Asset::Native => sc_vec(vec![sc_symbol(kind)]),
        Asset::CreditAlphanum4(AlphaNum4 { asset_code, issuer }) => {
            sc_vec(vec![sc_symbol(kind), asset_details(trim_code(&asset_code.0), issuer)])
        }
        Asset::CreditAlphanum12(AlphaNum12 { asset_code, issuer }) => {
            sc_vec(vec![sc_symbol(kind), asset_details(trim_code(&asset_code.0), issuer)])
        }
    };
    let storage = ScMap(
        vec![ScMapEntry {
            key: sc_vec(vec![sc_symbol("AssetInfo")]),
            val: info,
        }]
        .try_into()
        .expect("small map"),
    );
    make_contract_data_entry(
        contract,
        ScVal::LedgerKeyContractInstance,
        ScVal::ContractInstance(ScContractInstance {
            executable: ContractExecutable::StellarAsset,
            storage: Some(storage),
        }),
    )
}

fn trim_code(code: &[u8]) -> &[u8] {
    let end = code.iter().position(|b| *b == 0).unwrap_or(code.len());
    &code[..end]
}

fn asset_details(code: &[u8], issuer: &AccountId) -> ScVal {
    let AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(issuer))) = issuer;
    sc_map(vec![
        map_entry(
            "asset_code",
            ScVal::String(ScString(code.to_vec().try_into().expect("short code"))),
        ),
        map_entry(
            "issuer",
            ScVal::Bytes(ScBytes(issuer.to_vec().try_into().expect("32 bytes"))),
        ),
    ])
}
