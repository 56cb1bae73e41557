//! Network identity.
//!
//! A Stellar network is identified by `SHA-256(passphrase)`. The network ID
//! is part of every asset-contract ID preimage, so contracts wrapping the same
//! asset have different IDs on testnet and mainnet.
//!
//! | Network | Passphrase |
//! |---------|------------|
//! | Mainnet | `"Public Global Stellar Network ; September 2015"` |
//! | Testnet | `"Test SDF Network ; September 2015"` |

use crate::types::Hash256;

pub const TESTNET_PASSPHRASE: &str = "Test SDF Network ; September 2015";
pub const MAINNET_PASSPHRASE: &str = "Public Global Stellar Network ; September 2015";

/// Identifier of a Stellar network, derived from its passphrase.
///
/// ```rust
/// use asset_stats_common::NetworkId;
///
/// assert_ne!(NetworkId::testnet(), NetworkId::mainnet());
/// assert_eq!(
///     NetworkId::from_passphrase("Test SDF Network ; September 2015"),
///     NetworkId::testnet()
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkId(pub Hash256);

impl NetworkId {
    /// `SHA-256(passphrase)`.
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self(Hash256::hash(passphrase.as_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn testnet() -> Self {
        Self::from_passphrase(TESTNET_PASSPHRASE)
    }

    pub fn mainnet() -> Self {
        Self::from_passphrase(MAINNET_PASSPHRASE)
    }
}

impl From<NetworkId> for stellar_xdr::curr::Hash {
    fn from(id: NetworkId) -> Self {
        stellar_xdr::curr::Hash(id.0 .0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_testnet_network_id() {
        // Well-known testnet network ID.
        assert_eq!(
            NetworkId::testnet().0.to_hex(),
            "cee0302d59844d32bdca915c8203dd44b33fbb7edc19051ea37abedf28ecd472"
        );
    }

    #[test]
    fn test_networks_differ() {
        assert_ne!(NetworkId::testnet().as_bytes(), NetworkId::mainnet().as_bytes());
    }
}
