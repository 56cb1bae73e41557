//! Asset identity and asset-contract derivation.
//!
//! [`AssetIdentity`] is the map key used by every aggregate in asset-stats.
//! It holds the asset code as a trimmed string and the issuer as a `G...`
//! strkey, so it can be written to and read from the database unchanged.
//!
//! The Stellar Asset Contract (SAC) wrapping an asset has a deterministic ID:
//! `SHA-256(XDR(HashIdPreimage::ContractId { network_id, Asset(asset) }))`.
//! See [`asset_contract_id`].

use std::fmt;
use std::str::FromStr;

use stellar_xdr::curr::{
    AccountId, AlphaNum12, AlphaNum4, Asset, AssetCode12, AssetCode4, ContractIdPreimage,
    HashIdPreimage, HashIdPreimageContractId, LedgerEntry, LedgerEntryData, LedgerKey,
    LedgerKeyAccount, LedgerKeyClaimableBalance, LedgerKeyConfigSetting, LedgerKeyContractCode,
    LedgerKeyContractData, LedgerKeyData, LedgerKeyLiquidityPool, LedgerKeyOffer,
    LedgerKeyTrustLine, LedgerKeyTtl, PublicKey, TrustLineAsset, Uint256,
};

use crate::error::{Error, Result};
use crate::network::NetworkId;
use crate::types::Hash256;

/// The three asset kinds that can be aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    Native,
    CreditAlphanum4,
    CreditAlphanum12,
}

impl AssetKind {
    /// Name used in the database `asset_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Native => "native",
            AssetKind::CreditAlphanum4 => "credit_alphanum4",
            AssetKind::CreditAlphanum12 => "credit_alphanum12",
        }
    }
}

impl FromStr for AssetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "native" => Ok(AssetKind::Native),
            "credit_alphanum4" => Ok(AssetKind::CreditAlphanum4),
            "credit_alphanum12" => Ok(AssetKind::CreditAlphanum12),
            other => Err(Error::InvalidData(format!("unknown asset type: {other}"))),
        }
    }
}

/// Identity of an asset: `(kind, code, issuer)`.
///
/// Native has an empty code and issuer. Construct credit assets through
/// [`AssetIdentity::credit`] or the XDR conversions so that the code is
/// always valid for its kind.
///
/// ```rust
/// use asset_stats_common::{AssetIdentity, AssetKind};
///
/// let issuer = "GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAWHF";
/// let usd = AssetIdentity::credit("USD", issuer).unwrap();
/// assert_eq!(usd.kind, AssetKind::CreditAlphanum4);
/// assert_eq!(usd.to_string(), format!("USD:{issuer}"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetIdentity {
    pub kind: AssetKind,
    pub code: String,
    pub issuer: String,
}

impl AssetIdentity {
    pub fn native() -> Self {
        Self {
            kind: AssetKind::Native,
            code: String::new(),
            issuer: String::new(),
        }
    }

    /// Builds a credit asset, picking alphanum4 or alphanum12 from the code
    /// length. Fails on non-alphanumeric codes or a malformed issuer.
    pub fn credit(code: &str, issuer: &str) -> Result<Self> {
        let kind = match code.len() {
            1..=4 => AssetKind::CreditAlphanum4,
            5..=12 => AssetKind::CreditAlphanum12,
            n => {
                return Err(Error::InvalidData(format!(
                    "asset code length {n} out of range"
                )))
            }
        };
        if !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(Error::InvalidData(format!("invalid asset code: {code:?}")));
        }
        strkey_to_account_id(issuer)?;
        Ok(Self {
            kind,
            code: code.to_string(),
            issuer: issuer.to_string(),
        })
    }

    /// Rebuilds an identity from its database columns.
    pub fn from_parts(kind: AssetKind, code: &str, issuer: &str) -> Result<Self> {
        match kind {
            AssetKind::Native => Ok(Self::native()),
            _ => {
                let asset = Self::credit(code, issuer)?;
                if asset.kind != kind {
                    return Err(Error::InvalidData(format!(
                        "asset code {code:?} does not fit {}",
                        kind.as_str()
                    )));
                }
                Ok(asset)
            }
        }
    }

    pub fn is_native(&self) -> bool {
        self.kind == AssetKind::Native
    }

    /// Identity of a trust-line asset; `None` for pool-share trust lines.
    pub fn from_trustline_asset(asset: &TrustLineAsset) -> Result<Option<Self>> {
        let identity = match asset {
            TrustLineAsset::Native => Self::native(),
            TrustLineAsset::CreditAlphanum4(a) => credit4(&a.asset_code, &a.issuer)?,
            TrustLineAsset::CreditAlphanum12(a) => credit12(&a.asset_code, &a.issuer)?,
            TrustLineAsset::PoolShare(_) => return Ok(None),
        };
        Ok(Some(identity))
    }

    /// Converts back to the XDR `Asset`.
    pub fn to_asset(&self) -> Result<Asset> {
        Ok(match self.kind {
            AssetKind::Native => Asset::Native,
            AssetKind::CreditAlphanum4 => Asset::CreditAlphanum4(AlphaNum4 {
                asset_code: AssetCode4(str_to_asset_code(&self.code)),
                issuer: strkey_to_account_id(&self.issuer)?,
            }),
            AssetKind::CreditAlphanum12 => Asset::CreditAlphanum12(AlphaNum12 {
                asset_code: AssetCode12(str_to_asset_code(&self.code)),
                issuer: strkey_to_account_id(&self.issuer)?,
            }),
        })
    }

    /// ID of the Stellar Asset Contract wrapping this asset on `network`.
    pub fn contract_id(&self, network: &NetworkId) -> Result<Hash256> {
        asset_contract_id(network, &self.to_asset()?)
    }
}

impl TryFrom<&Asset> for AssetIdentity {
    type Error = Error;

    fn try_from(asset: &Asset) -> Result<Self> {
        match asset {
            Asset::Native => Ok(Self::native()),
            Asset::CreditAlphanum4(a) => credit4(&a.asset_code, &a.issuer),
            Asset::CreditAlphanum12(a) => credit12(&a.asset_code, &a.issuer),
        }
    }
}

impl fmt::Display for AssetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AssetKind::Native => f.write_str("native"),
            _ => write!(f, "{}:{}", self.code, self.issuer),
        }
    }
}

impl FromStr for AssetIdentity {
    type Err = Error;

    /// Parses `native` or `CODE:ISSUER`.
    fn from_str(s: &str) -> Result<Self> {
        if s == "native" {
            return Ok(Self::native());
        }
        let (code, issuer) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidData(format!("expected CODE:ISSUER, got {s:?}")))?;
        Self::credit(code, issuer)
    }
}

fn credit4(code: &AssetCode4, issuer: &AccountId) -> Result<AssetIdentity> {
    if !is_asset_code_valid(&code.0, 1) {
        return Err(Error::InvalidData(format!("malformed alphanum4 code {:?}", code.0)));
    }
    Ok(AssetIdentity {
        kind: AssetKind::CreditAlphanum4,
        code: asset_code_to_str(&code.0),
        issuer: account_id_to_strkey(issuer),
    })
}

fn credit12(code: &AssetCode12, issuer: &AccountId) -> Result<AssetIdentity> {
    if !is_asset_code_valid(&code.0, 5) {
        return Err(Error::InvalidData(format!("malformed alphanum12 code {:?}", code.0)));
    }
    Ok(AssetIdentity {
        kind: AssetKind::CreditAlphanum12,
        code: asset_code_to_str(&code.0),
        issuer: account_id_to_strkey(issuer),
    })
}

/// Reads bytes up to the first NUL.
pub fn asset_code_to_str<const N: usize>(code: &[u8; N]) -> String {
    let len = code.iter().position(|&b| b == 0).unwrap_or(N);
    String::from_utf8_lossy(&code[..len]).into_owned()
}

/// Copies `s` into a NUL-padded code array, truncating if longer than `N`.
pub fn str_to_asset_code<const N: usize>(s: &str) -> [u8; N] {
    let mut result = [0u8; N];
    let n = std::cmp::min(N, s.len());
    result[..n].copy_from_slice(&s.as_bytes()[..n]);
    result
}

/// Non-zero bytes must be ASCII alphanumeric and zeros may only trail.
fn is_asset_code_valid(code: &[u8], min_chars: usize) -> bool {
    let mut zeros = false;
    let mut chars = 0;
    for &b in code {
        if b == 0 {
            zeros = true;
        } else if zeros || !b.is_ascii_alphanumeric() {
            return false;
        } else {
            chars += 1;
        }
    }
    chars >= min_chars
}

pub fn account_id_to_strkey(account: &AccountId) -> String {
    let PublicKey::PublicKeyTypeEd25519(Uint256(key)) = &account.0;
    stellar_strkey::ed25519::PublicKey(*key).to_string()
}

pub fn strkey_to_account_id(strkey: &str) -> Result<AccountId> {
    let pk = stellar_strkey::ed25519::PublicKey::from_string(strkey)
        .map_err(|e| Error::InvalidData(format!("invalid account strkey {strkey:?}: {e}")))?;
    Ok(AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(pk.0))))
}

/// Contract ID of the Stellar Asset Contract for `asset` on `network`.
pub fn asset_contract_id(network: &NetworkId, asset: &Asset) -> Result<Hash256> {
    let preimage = HashIdPreimage::ContractId(HashIdPreimageContractId {
        network_id: (*network).into(),
        contract_id_preimage: ContractIdPreimage::Asset(asset.clone()),
    });
    Ok(Hash256::hash_xdr(&preimage)?)
}

/// The ledger key addressing `entry`.
pub fn ledger_entry_key(entry: &LedgerEntry) -> LedgerKey {
    match &entry.data {
        LedgerEntryData::Account(a) => LedgerKey::Account(LedgerKeyAccount {
            account_id: a.account_id.clone(),
        }),
        LedgerEntryData::Trustline(t) => LedgerKey::Trustline(LedgerKeyTrustLine {
            account_id: t.account_id.clone(),
            asset: t.asset.clone(),
        }),
        LedgerEntryData::Offer(o) => LedgerKey::Offer(LedgerKeyOffer {
            seller_id: o.seller_id.clone(),
            offer_id: o.offer_id,
        }),
        LedgerEntryData::Data(d) => LedgerKey::Data(LedgerKeyData {
            account_id: d.account_id.clone(),
            data_name: d.data_name.clone(),
        }),
        LedgerEntryData::ClaimableBalance(cb) => {
            LedgerKey::ClaimableBalance(LedgerKeyClaimableBalance {
                balance_id: cb.balance_id.clone(),
            })
        }
        LedgerEntryData::LiquidityPool(lp) => LedgerKey::LiquidityPool(LedgerKeyLiquidityPool {
            liquidity_pool_id: lp.liquidity_pool_id.clone(),
        }),
        LedgerEntryData::ContractData(cd) => LedgerKey::ContractData(LedgerKeyContractData {
            contract: cd.contract.clone(),
            key: cd.key.clone(),
            durability: cd.durability,
        }),
        LedgerEntryData::ContractCode(cc) => LedgerKey::ContractCode(LedgerKeyContractCode {
            hash: cc.hash.clone(),
        }),
        LedgerEntryData::ConfigSetting(cs) => LedgerKey::ConfigSetting(LedgerKeyConfigSetting {
            config_setting_id: cs.discriminant(),
        }),
        LedgerEntryData::Ttl(t) => LedgerKey::Ttl(LedgerKeyTtl {
            key_hash: t.key_hash.clone(),
        }),
    }
}

/// Content hash of an entry's ledger key, `SHA-256(XDR(LedgerKey))`.
///
/// This is the value TTL entries carry in `key_hash`.
pub fn ledger_key_hash(entry: &LedgerEntry) -> Result<Hash256> {
    Ok(Hash256::hash_xdr(&ledger_entry_key(entry))?)
}
