use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::store::types::{LockHandle, PubSubMessage, StoreResult};

/// Shared key-value / pub-sub capability the fleet coordinates through.
///
/// Methods use RPITIT (`-> impl Future + Send`) so no `async-trait`
/// dependency is needed. Hash values are stored as strings, mirroring the
/// wire representation of common key-value stores.
pub trait Store: Send + Sync + 'static {
    /// Set every field in `fields` on the hash at `key`.
    fn hset_all(&self, key: &str, fields: &[(&str, String)])
        -> impl Future<Output = StoreResult<()>> + Send;

    /// Return all fields of the hash at `key`. A missing key yields an empty map.
    fn hget_all(&self, key: &str)
        -> impl Future<Output = StoreResult<HashMap<String, String>>> + Send;

    /// Set a single hash field.
    fn hset(&self, key: &str, field: &str, value: String)
        -> impl Future<Output = StoreResult<()>> + Send;

    /// Add `delta` to an integer hash field, creating it at 0 first if absent.
    /// Returns the new value.
    fn hincr_by(&self, key: &str, field: &str, delta: i64)
        -> impl Future<Output = StoreResult<i64>> + Send;

    fn exists(&self, key: &str) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Expire `key` after `ttl`. Returns false if the key does not exist.
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = StoreResult<bool>> + Send;

    fn get(&self, key: &str) -> impl Future<Output = StoreResult<Option<String>>> + Send;

    fn set(&self, key: &str, value: String) -> impl Future<Output = StoreResult<()>> + Send;

    /// Add `member` to the set at `key`. Returns true if it was not present.
    fn sadd(&self, key: &str, member: &str) -> impl Future<Output = StoreResult<bool>> + Send;

    fn smembers(&self, key: &str) -> impl Future<Output = StoreResult<Vec<String>>> + Send;

    /// Publish `payload` on `channel`. Returns the number of subscribers reached.
    fn publish(&self, channel: &str, payload: &str)
        -> impl Future<Output = StoreResult<usize>> + Send;

    /// Subscribe to every channel matching `pattern` (`*` matches any run of characters).
    fn psubscribe(&self, pattern: &str) -> impl Future<Output = StoreResult<Subscription>> + Send;

    /// Try to take the lock at `key` for `ttl`. `None` means another holder has it.
    fn acquire_lock(&self, key: &str, ttl: Duration)
        -> impl Future<Output = StoreResult<Option<LockHandle>>> + Send;

    /// Release a lock previously acquired. Returns false if it had already
    /// expired or changed hands.
    fn release_lock(&self, handle: &LockHandle) -> impl Future<Output = StoreResult<bool>> + Send;
}

/// Stream of messages for one pattern subscription.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<PubSubMessage>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<PubSubMessage>) -> Self {
        Self { rx }
    }

    /// Next message, or `None` once the store side has gone away.
    pub async fn recv(&mut self) -> Option<PubSubMessage> {
        self.rx.recv().await
    }
}
