//! Defensive decoding of Stellar Asset Contract storage.
//!
//! Contract storage is written by arbitrary contracts, so nothing about its
//! shape or provenance is trusted. Every check short-circuits to
//! [`ContractEntry::Unrecognized`]; decoding never fails.
//!
//! Two shapes are recognized:
//!
//! - **Metadata**: the contract instance entry whose storage map holds
//!   `Vec[Symbol("AssetInfo")] => Vec[Symbol(kind), Map{asset_code, issuer}]`.
//!   The asset is only accepted if its derived contract ID equals the ID of
//!   the contract that owns the entry.
//! - **Balance**: key `Vec[Symbol("Balance"), Address(Contract(holder))]`,
//!   value `Map{amount: I128, authorized: Bool, clawback: Bool}`.
//!   Negative amounts are excluded, not clamped.

use asset_stats_common::asset::account_id_to_strkey;
use asset_stats_common::{asset_contract_id, AssetIdentity, AssetKind, Hash256, NetworkId};
use stellar_xdr::curr::{
    AccountId, Asset, ContractDataEntry, LedgerEntry, LedgerEntryData, PublicKey, ScAddress,
    ScMapEntry, ScVal, Uint256,
};
use tracing::{debug, trace};

use crate::error::Result;

/// A decoded holder balance of an asset contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceRecord {
    /// Contract whose storage holds the balance.
    pub contract_id: Hash256,
    /// Contract that owns the balance.
    pub holder: Hash256,
    pub amount: u128,
}

/// A verified "this contract wraps `asset`" marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetContractInfo {
    pub contract_id: Hash256,
    pub asset: AssetIdentity,
}

/// Result of decoding one contract-data entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractEntry {
    Balance(BalanceRecord),
    Metadata(AssetContractInfo),
    Unrecognized,
}

/// Decoder bound to one network, since asset-contract IDs depend on the
/// network passphrase.
#[derive(Debug, Clone)]
pub struct ContractDataDecoder {
    network: NetworkId,
    native_contract_id: Hash256,
}

impl ContractDataDecoder {
    pub fn new(network: NetworkId) -> Result<Self> {
        let native_contract_id = asset_contract_id(&network, &Asset::Native)?;
        Ok(Self {
            network,
            native_contract_id,
        })
    }

    /// Classifies a ledger entry. Metadata is tried first.
    pub fn decode(&self, entry: &LedgerEntry) -> ContractEntry {
        let LedgerEntryData::ContractData(data) = &entry.data else {
            return ContractEntry::Unrecognized;
        };
        if let Some(info) = self.asset_contract(data) {
            return ContractEntry::Metadata(info);
        }
        match balance(data) {
            Some(record) => ContractEntry::Balance(record),
            None => ContractEntry::Unrecognized,
        }
    }

    /// Decodes and authenticates an asset-contract metadata entry.
    pub fn asset_contract(&self, data: &ContractDataEntry) -> Option<AssetContractInfo> {
        if !matches!(data.key, ScVal::LedgerKeyContractInstance) {
            return None;
        }
        let contract_id = address_contract_id(&data.contract)?;
        let ScVal::ContractInstance(instance) = &data.val else {
            return None;
        };
        let storage = instance.storage.as_ref()?;
        let asset_info = storage
            .0
            .iter()
            .find(|entry| is_asset_info_key(&entry.key))
            .map(|entry| &entry.val)?;

        let info = vec_items(asset_info)?;
        let asset = match info {
            [kind] if symbol_is(kind, "Native") => AssetIdentity::native(),
            [kind, details] => {
                let kind = if symbol_is(kind, "AlphaNum4") {
                    AssetKind::CreditAlphanum4
                } else if symbol_is(kind, "AlphaNum12") {
                    AssetKind::CreditAlphanum12
                } else {
                    return None;
                };
                credit_asset(kind, details)?
            }
            _ => return None,
        };

        let expected = if asset.is_native() {
            self.native_contract_id
        } else {
            asset_contract_id(&self.network, &asset.to_asset().ok()?).ok()?
        };
        if expected != contract_id {
            debug!(
                contract_id = %contract_id,
                asset = %asset,
                "Contract metadata claims an asset it does not wrap"
            );
            return None;
        }
        Some(AssetContractInfo { contract_id, asset })
    }
}

/// Decodes a balance entry written by an asset contract.
pub fn balance(data: &ContractDataEntry) -> Option<BalanceRecord> {
    let contract_id = address_contract_id(&data.contract)?;

    let key = vec_items(&data.key)?;
    let [tag, holder] = key else {
        return None;
    };
    if !symbol_is(tag, "Balance") {
        return None;
    }
    let ScVal::Address(holder) = holder else {
        return None;
    };
    // Account holders are trust lines, not contract balances.
    let holder = address_contract_id(holder)?;

    let ScVal::Map(Some(map)) = &data.val else {
        return None;
    };
    let [amount, authorized, clawback] = map.0.as_slice() else {
        return None;
    };
    if !symbol_is(&amount.key, "amount")
        || !is_bool_field(authorized, "authorized")
        || !is_bool_field(clawback, "clawback")
    {
        return None;
    }
    let ScVal::I128(parts) = &amount.val else {
        return None;
    };
    if parts.hi < 0 {
        trace!(contract_id = %contract_id, holder = %holder, "Excluding negative contract balance");
        return None;
    }
    let amount = ((parts.hi as u128) << 64) | parts.lo as u128;

    Some(BalanceRecord {
        contract_id,
        holder,
        amount,
    })
}

fn address_contract_id(address: &ScAddress) -> Option<Hash256> {
    match address {
        ScAddress::Contract(id) => Some(Hash256::from(id.clone())),
        _ => None,
    }
}

fn symbol_is(val: &ScVal, name: &str) -> bool {
    match val {
        ScVal::Symbol(sym) => {
            let bytes: &[u8] = sym.0.as_ref();
            bytes == name.as_bytes()
        }
        _ => false,
    }
}

fn vec_items(val: &ScVal) -> Option<&[ScVal]> {
    match val {
        ScVal::Vec(Some(items)) => Some(items.0.as_slice()),
        _ => None,
    }
}

fn is_asset_info_key(key: &ScVal) -> bool {
    matches!(vec_items(key), Some([tag]) if symbol_is(tag, "AssetInfo"))
}

fn is_bool_field(entry: &ScMapEntry, name: &str) -> bool {
    symbol_is(&entry.key, name) && matches!(entry.val, ScVal::Bool(_))
}

/// `Map{asset_code: String, issuer: Bytes(32)}`, with the code length
/// matching the declared kind.
fn credit_asset(kind: AssetKind, details: &ScVal) -> Option<AssetIdentity> {
    let ScVal::Map(Some(map)) = details else {
        return None;
    };
    let [code, issuer] = map.0.as_slice() else {
        return None;
    };
    if !symbol_is(&code.key, "asset_code") || !symbol_is(&issuer.key, "issuer") {
        return None;
    }
    let ScVal::String(code) = &code.val else {
        return None;
    };
    let code = std::str::from_utf8(code.0.as_ref()).ok()?;
    if code.is_empty() {
        return None;
    }
    let ScVal::Bytes(issuer) = &issuer.val else {
        return None;
    };
    let issuer: &[u8] = issuer.0.as_ref();
    let issuer: [u8; 32] = issuer.try_into().ok()?;
    let issuer = account_id_to_strkey(&AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(issuer))));

    let asset = AssetIdentity::credit(code, &issuer).ok()?;
    (asset.kind == kind).then_some(asset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use stellar_xdr::curr::Int128Parts;

    fn decoder() -> ContractDataDecoder {
        ContractDataDecoder::new(NetworkId::testnet()).unwrap()
    }

    #[test]
    fn test_decodes_balance() {
        let entry = make_balance_entry(sac_id(&usd()), make_hash(9), 1_000, 0);
        match decoder().decode(&entry) {
            ContractEntry::Balance(record) => {
                assert_eq!(record.contract_id, sac_id(&usd()));
                assert_eq!(record.holder, make_hash(9));
                assert_eq!(record.amount, 1_000);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_large_amount_uses_high_word() {
        let entry = make_balance_entry_raw(
            sac_id(&usd()),
            make_hash(9),
            Int128Parts { hi: 1, lo: 5 },
        );
        let ContractEntry::Balance(record) = decoder().decode(&entry) else {
            panic!("expected balance");
        };
        assert_eq!(record.amount, (1u128 << 64) + 5);
    }

    #[test]
    fn test_negative_amount_excluded() {
        let entry = make_balance_entry_raw(
            sac_id(&usd()),
            make_hash(9),
            Int128Parts { hi: -1, lo: u64::MAX },
        );
        assert_eq!(decoder().decode(&entry), ContractEntry::Unrecognized);
    }

    #[test]
    fn test_balance_shape_deviations_unrecognized() {
        let good = make_balance_entry(sac_id(&usd()), make_hash(9), 10, 0);
        let LedgerEntryData::ContractData(data) = &good.data else {
            unreachable!()
        };

        // Account holder instead of contract.
        let mut account_holder = data.clone();
        account_holder.key = sc_vec(vec![
            sc_symbol("Balance"),
            ScVal::Address(ScAddress::Account(make_account_id(1))),
        ]);
        assert!(balance(&account_holder).is_none());

        // Wrong tag.
        let mut wrong_tag = data.clone();
        wrong_tag.key = sc_vec(vec![
            sc_symbol("Allowance"),
            ScVal::Address(ScAddress::Contract(make_hash(9).into())),
        ]);
        assert!(balance(&wrong_tag).is_none());

        // Fields out of order.
        let mut reordered = data.clone();
        let ScVal::Map(Some(map)) = &data.val else {
            unreachable!()
        };
        let mut entries = map.0.to_vec();
        entries.swap(1, 2);
        reordered.val = sc_map(entries);
        assert!(balance(&reordered).is_none());

        // Not a map at all.
        let mut scalar = data.clone();
        scalar.val = ScVal::U32(1);
        assert!(balance(&scalar).is_none());

        assert!(balance(data).is_some());
    }

    #[test]
    fn test_verified_metadata() {
        let entry = make_asset_info_entry(sac_id(&usd()), &usd());
        match decoder().decode(&entry) {
            ContractEntry::Metadata(info) => {
                assert_eq!(info.contract_id, sac_id(&usd()));
                assert_eq!(info.asset, usd_identity());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_forged_metadata_rejected() {
        // A contract that is not the USD wrapper claims to be.
        let entry = make_asset_info_entry(make_hash(42), &usd());
        assert_eq!(decoder().decode(&entry), ContractEntry::Unrecognized);

        // The real USD wrapper on another network is not verified here.
        let mainnet = ContractDataDecoder::new(NetworkId::mainnet()).unwrap();
        let entry = make_asset_info_entry(sac_id(&usd()), &usd());
        assert_eq!(mainnet.decode(&entry), ContractEntry::Unrecognized);
    }

    #[test]
    fn test_native_metadata_requires_native_contract() {
        let native_id = sac_id(&Asset::Native);
        let entry = make_asset_info_entry(native_id, &Asset::Native);
        assert!(matches!(decoder().decode(&entry), ContractEntry::Metadata(info) if info.asset.is_native()));

        let forged = make_asset_info_entry(make_hash(1), &Asset::Native);
        assert_eq!(decoder().decode(&forged), ContractEntry::Unrecognized);
    }

    #[test]
    fn test_metadata_kind_must_match_code_length() {
        let entry = make_asset_info_entry_with_kind(sac_id(&usd()), "AlphaNum12", &usd());
        assert_eq!(decoder().decode(&entry), ContractEntry::Unrecognized);
    }
}
