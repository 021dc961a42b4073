//! Shared utilities for fleet integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fleet_breaker::store::{LockHandle, StoreError, StoreResult, Subscription};
use fleet_breaker::{FleetConfig, FleetCoordinator, FleetEvent, MemoryStore, Store};
use tokio::sync::broadcast;

/// Fleet config with intervals short enough for tests.
pub fn fast_config(namespace: &str) -> FleetConfig {
    FleetConfig {
        tick_interval_ms: 25,
        lock_ttl_ms: 500,
        ..FleetConfig::for_namespace(namespace)
    }
}

pub fn member<S: Store>(store: &Arc<S>, namespace: &str) -> Arc<FleetCoordinator<S>> {
    FleetCoordinator::new(fast_config(namespace), store.clone())
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait for the next event called `name`, skipping others.
pub async fn next_event(
    events: &mut broadcast::Receiver<FleetEvent>,
    name: &str,
    timeout: Duration,
) -> Option<FleetEvent> {
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if event.name() == name => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// A `MemoryStore` that can be switched into returning `Unavailable`.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    down: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check(&self) -> StoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected outage".into()))
        } else {
            Ok(())
        }
    }
}

impl Store for FlakyStore {
    async fn hset_all(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
        self.check()?;
        self.inner.hset_all(key, fields).await
    }

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.check()?;
        self.inner.hget_all(key).await
    }

    async fn hset(&self, key: &str, field: &str, value: String) -> StoreResult<()> {
        self.check()?;
        self.inner.hset(key, field, value).await
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        self.check()?;
        self.inner.hincr_by(key, field, delta).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.check()?;
        self.inner.exists(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.check()?;
        self.inner.expire(key, ttl).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> StoreResult<()> {
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.check()?;
        self.inner.sadd(key, member).await
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        self.check()?;
        self.inner.smembers(key).await
    }

    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<usize> {
        self.check()?;
        self.inner.publish(channel, payload).await
    }

    async fn psubscribe(&self, pattern: &str) -> StoreResult<Subscription> {
        self.check()?;
        self.inner.psubscribe(pattern).await
    }

    async fn acquire_lock(&self, key: &str, ttl: Duration) -> StoreResult<Option<LockHandle>> {
        self.check()?;
        self.inner.acquire_lock(key, ttl).await
    }

    async fn release_lock(&self, handle: &LockHandle) -> StoreResult<bool> {
        self.check()?;
        self.inner.release_lock(handle).await
    }
}
