//! Ingestion error types.
//!
//! Errors fall into two classes that callers must treat differently:
//!
//! - [`IngestError::InvariantViolation`]: the change stream disagrees with
//!   persisted state (or with itself). Ingestion must halt; retrying the same
//!   window will fail the same way.
//! - [`IngestError::Store`]: the external store failed. The whole flush window
//!   may be retried by the caller.
//!
//! Structurally invalid contract storage is *not* an error: it is excluded
//! from aggregation by the decoders in [`crate::sac`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Persisted state and the change stream have diverged, or the stream
    /// itself is malformed.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A ledger entry could not be mapped to an asset identity.
    #[error("decode error: {0}")]
    Decode(String),

    /// Failure reported by the persistence layer.
    #[error("store error while {context}: {source}")]
    Store {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("XDR error: {0}")]
    Xdr(#[from] stellar_xdr::curr::Error),
}

impl IngestError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(%msg, "Asset stats invariant violated");
        IngestError::InvariantViolation(msg)
    }

    pub fn store<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        IngestError::Store {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, IngestError::InvariantViolation(_))
    }
}

impl From<asset_stats_common::Error> for IngestError {
    fn from(err: asset_stats_common::Error) -> Self {
        match err {
            asset_stats_common::Error::Xdr(e) => IngestError::Xdr(e),
            other => IngestError::Decode(other.to_string()),
        }
    }
}
