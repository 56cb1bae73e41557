//! Authorization buckets.

use stellar_xdr::curr::TrustLineFlags;

/// The five buckets an asset's balances and holders are split across.
///
/// The first three are mutually exclusive per trust line; the other two
/// accrue from claimable-balance and liquidity-pool entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AuthorizationBucket {
    Authorized,
    AuthorizedToMaintainLiabilities,
    Unauthorized,
    ClaimableBalance,
    LiquidityPool,
}

impl AuthorizationBucket {
    pub const ALL: [AuthorizationBucket; 5] = [
        AuthorizationBucket::Authorized,
        AuthorizationBucket::AuthorizedToMaintainLiabilities,
        AuthorizationBucket::Unauthorized,
        AuthorizationBucket::ClaimableBalance,
        AuthorizationBucket::LiquidityPool,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Column prefix used by the persistence layer.
    pub fn as_str(self) -> &'static str {
        match self {
            AuthorizationBucket::Authorized => "authorized",
            AuthorizationBucket::AuthorizedToMaintainLiabilities => {
                "authorized_to_maintain_liabilities"
            }
            AuthorizationBucket::Unauthorized => "unauthorized",
            AuthorizationBucket::ClaimableBalance => "claimable_balances",
            AuthorizationBucket::LiquidityPool => "liquidity_pools",
        }
    }
}

/// Maps trust-line flags to the line's bucket.
///
/// `AUTHORIZED` wins over `AUTHORIZED_TO_MAINTAIN_LIABILITIES`; a line with
/// neither is unauthorized. Other flags (clawback) are ignored.
pub fn classify(flags: u32) -> AuthorizationBucket {
    if flags & TrustLineFlags::AuthorizedFlag as u32 != 0 {
        AuthorizationBucket::Authorized
    } else if flags & TrustLineFlags::AuthorizedToMaintainLiabilitiesFlag as u32 != 0 {
        AuthorizationBucket::AuthorizedToMaintainLiabilities
    } else {
        AuthorizationBucket::Unauthorized
    }
}
