//! Error types for the channel store domain.

use thiserror::Error;

use crate::types::TransferId;

/// Errors raised by pure domain operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("transfer {0} is already resolved")]
    AlreadyResolved(TransferId),

    #[error("transfer {transfer_id} cannot resolve at nonce {nonce}")]
    InvalidResolveNonce { transfer_id: TransferId, nonce: u64 },
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, CoreError>;
