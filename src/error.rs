//! Crate-wide error type.

use thiserror::Error;

use crate::store::StoreError;

/// Errors raised by circuits and the fleet coordinator.
#[derive(Debug, Error)]
pub enum BreakerError {
    /// A circuit was registered without a name.
    #[error("You must provide a unique name for the circuit.")]
    MissingCircuitName,

    /// Circuit settings failed validation.
    #[error("invalid circuit config: {0}")]
    InvalidConfig(String),

    /// A persisted or replicated state value was not recognised.
    #[error("unknown circuit state '{0}'")]
    UnknownState(String),

    /// The shared store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A replication message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Result type for breaker operations.
pub type BreakerResult<T> = Result<T, BreakerError>;
