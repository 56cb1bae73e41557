//! Shared types for the asset-stats crates.
//!
//! - [`Hash256`]: SHA-256 digests (contract IDs, ledger-key hashes)
//! - [`NetworkId`]: network identity derived from a passphrase
//! - [`AssetIdentity`]: the key every asset aggregate is stored under
//! - [`xdr_stream`]: framed XDR readers and writers for ingestion input

pub mod asset;
pub mod error;
pub mod network;
pub mod types;
pub mod xdr_stream;

pub use asset::{asset_contract_id, ledger_entry_key, ledger_key_hash, AssetIdentity, AssetKind};
pub use error::{Error, Result};
pub use network::NetworkId;
pub use types::Hash256;

/// Re-export stellar-xdr for convenience
pub use stellar_xdr;
