//! Store-facing types and error definitions.

use thiserror::Error;

/// Errors surfaced by a [`Store`](crate::store::Store) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the command.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be interpreted.
    #[error("cannot decode value at '{key}': {reason}")]
    Decode { key: String, reason: String },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A message delivered to a pattern subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubMessage {
    /// The pattern the subscription was registered with.
    pub pattern: String,
    /// The concrete channel the message was published on.
    pub channel: String,
    pub payload: String,
}

/// Proof of holding a distributed lock.
///
/// Only the handle returned by `acquire_lock` can release the lock; the
/// token guards against releasing a lock that expired and was re-acquired
/// by another fleet member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub key: String,
    pub token: String,
}
