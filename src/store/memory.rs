//! In-process `Store` implementation.
//!
//! Backs the demo binary and the test-suite. A single `MemoryStore` shared
//! through an `Arc` by several coordinators behaves like one shared server
//! seen by several fleet members. Expiry is evaluated on access, and write
//! paths also sweep every expired key at most once per `SWEEP_INTERVAL`,
//! so buckets that are never read again are still freed.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use uuid::Uuid;

use crate::store::traits::{Store, Subscription};
use crate::store::types::{LockHandle, PubSubMessage, StoreError, StoreResult};

/// Minimum time between two full expiry sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Default)]
struct MemInner {
    hashes: HashMap<String, HashMap<String, String>>,
    strings: HashMap<String, String>,
    sets: HashMap<String, BTreeSet<String>>,
    expiry: HashMap<String, Instant>,
    locks: HashMap<String, (String, Instant)>,
    subscribers: Vec<(String, mpsc::UnboundedSender<PubSubMessage>)>,
    last_sweep: Option<Instant>,
}

impl MemInner {
    /// Drop `key` if its TTL has elapsed.
    fn evict_if_expired(&mut self, key: &str) {
        let expired =
            matches!(self.expiry.get(key), Some(deadline) if *deadline <= Instant::now());
        if expired {
            self.remove(key);
        }
    }

    fn remove(&mut self, key: &str) {
        self.expiry.remove(key);
        self.hashes.remove(key);
        self.strings.remove(key);
        self.sets.remove(key);
    }

    /// Drop every expired key and lock, unless a sweep ran within
    /// `SWEEP_INTERVAL`.
    fn sweep_expired(&mut self) {
        let now = Instant::now();
        if matches!(self.last_sweep, Some(at) if now.duration_since(at) < SWEEP_INTERVAL) {
            return;
        }
        self.last_sweep = Some(now);

        let expired: Vec<String> = self
            .expiry
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        self.locks.retain(|_, (_, deadline)| *deadline > now);
    }

    fn contains(&self, key: &str) -> bool {
        self.hashes.contains_key(key)
            || self.strings.contains_key(key)
            || self.sets.contains_key(key)
    }
}

/// Shared in-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live pattern subscriptions.
    pub async fn subscriber_count(&self) -> usize {
        let mut g = self.inner.lock().await;
        g.subscribers.retain(|(_, tx)| !tx.is_closed());
        g.subscribers.len()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl Store for MemoryStore {
    async fn hset_all(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
        let mut g = self.inner.lock().await;
        g.sweep_expired();
        g.evict_if_expired(key);
        let hash = g.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert((*field).to_string(), value.clone());
        }
        Ok(())
    }

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut g = self.inner.lock().await;
        g.evict_if_expired(key);
        Ok(g.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hset(&self, key: &str, field: &str, value: String) -> StoreResult<()> {
        let mut g = self.inner.lock().await;
        g.evict_if_expired(key);
        g.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        let mut g = self.inner.lock().await;
        g.sweep_expired();
        g.evict_if_expired(key);
        let slot = g
            .hashes
            .entry(key.to_string())
            .or_default()
            .entry(field.to_string())
            .or_insert_with(|| "0".to_string());
        let current: i64 = slot.parse().map_err(|_| StoreError::Decode {
            key: key.to_string(),
            reason: format!("field '{}' is not an integer", field),
        })?;
        let next = current + delta;
        *slot = next.to_string();
        Ok(next)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut g = self.inner.lock().await;
        g.evict_if_expired(key);
        Ok(g.contains(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut g = self.inner.lock().await;
        g.sweep_expired();
        g.evict_if_expired(key);
        if !g.contains(key) {
            return Ok(false);
        }
        g.expiry.insert(key.to_string(), Instant::now() + ttl);
        Ok(true)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut g = self.inner.lock().await;
        g.evict_if_expired(key);
        Ok(g.strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> StoreResult<()> {
        let mut g = self.inner.lock().await;
        g.sweep_expired();
        g.expiry.remove(key);
        g.strings.insert(key.to_string(), value);
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut g = self.inner.lock().await;
        g.evict_if_expired(key);
        Ok(g.sets.entry(key.to_string()).or_default().insert(member.to_string()))
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut g = self.inner.lock().await;
        g.evict_if_expired(key);
        Ok(g.sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<usize> {
        let mut g = self.inner.lock().await;
        let mut delivered = 0;
        g.subscribers.retain(|(pattern, tx)| {
            if !glob_match(pattern, channel) {
                return !tx.is_closed();
            }
            let msg = PubSubMessage {
                pattern: pattern.clone(),
                channel: channel.to_string(),
                payload: payload.to_string(),
            };
            match tx.send(msg) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        Ok(delivered)
    }

    async fn psubscribe(&self, pattern: &str) -> StoreResult<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().await.subscribers.push((pattern.to_string(), tx));
        Ok(Subscription::new(rx))
    }

    async fn acquire_lock(&self, key: &str, ttl: Duration) -> StoreResult<Option<LockHandle>> {
        let mut g = self.inner.lock().await;
        let now = Instant::now();
        if let Some((_, deadline)) = g.locks.get(key) {
            if *deadline > now {
                return Ok(None);
            }
        }
        let token = Uuid::new_v4().to_string();
        g.locks.insert(key.to_string(), (token.clone(), now + ttl));
        Ok(Some(LockHandle {
            key: key.to_string(),
            token,
        }))
    }

    async fn release_lock(&self, handle: &LockHandle) -> StoreResult<bool> {
        let mut g = self.inner.lock().await;
        let owned = matches!(
            g.locks.get(&handle.key),
            Some((token, deadline)) if *token == handle.token && *deadline > Instant::now()
        );
        if owned {
            g.locks.remove(&handle.key);
        }
        Ok(owned)
    }
}

/// Glob match supporting `*` (any run) and `?` (any single character).
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}
