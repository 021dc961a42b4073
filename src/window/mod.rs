//! Sliding-window metrics.
//!
//! # Data Flow
//! ```text
//! Command outcome
//!     → MetricsWindow::record (increment the current bucket, creating it first)
//!
//! State evaluation
//!     → MetricsWindow::compute (read the last num_buckets buckets)
//!     → metrics.rs (error count, total, error percentage, last successes)
//!
//! Tick
//!     → MetricsWindow::next_base_time (has the current bucket expired?)
//!     → MetricsWindow::create_bucket (new current bucket with a 2× window TTL)
//! ```
//!
//! # Design Decisions
//! - Buckets live in the shared store, never in process memory
//! - Bucket keys are derived from the circuit's base time, so every member
//!   with the same base time writes to the same bucket
//! - Reads take no lock; a concurrent advance may skew one evaluation

pub mod bucket;
pub mod metrics;

pub use bucket::{Bucket, Outcome};
pub use metrics::WindowMetrics;

use futures_util::future::try_join_all;

use crate::config::CircuitConfig;
use crate::store::{Keyspace, Store, StoreResult};

/// Bucket layout and store operations for one circuit's window.
#[derive(Debug, Clone)]
pub struct MetricsWindow {
    name: String,
    keys: Keyspace,
    bucket_duration_ms: u64,
    num_buckets: u32,
    bucket_ttl: std::time::Duration,
}

impl MetricsWindow {
    pub fn new(keys: Keyspace, config: &CircuitConfig) -> Self {
        Self {
            name: config.name.clone(),
            keys,
            bucket_duration_ms: config.bucket_duration_ms(),
            num_buckets: config.num_buckets,
            bucket_ttl: config.bucket_ttl(),
        }
    }

    pub fn bucket_duration_ms(&self) -> u64 {
        self.bucket_duration_ms
    }

    /// Key of the bucket `offset` positions from `base_time` (0 = current,
    /// negative = history). `None` if the offset reaches before the epoch.
    pub fn bucket_key(&self, base_time: u64, offset: i64) -> Option<String> {
        let shift = offset.unsigned_abs().checked_mul(self.bucket_duration_ms)?;
        let at = if offset < 0 {
            base_time.checked_sub(shift)?
        } else {
            base_time.checked_add(shift)?
        };
        Some(self.keys.bucket(&self.name, at))
    }

    /// Base time after one advance, if the bucket starting at `base_time`
    /// has expired by `now_ms`. Always a single step.
    pub fn next_base_time(&self, base_time: u64, now_ms: u64) -> Option<u64> {
        if now_ms.saturating_sub(base_time) > self.bucket_duration_ms {
            Some(base_time + self.bucket_duration_ms)
        } else {
            None
        }
    }

    /// Initialise every counter of the bucket at `base_time` and set its TTL.
    ///
    /// Counters are created with a zero increment, so creating a bucket
    /// that another member already populated leaves its counts intact.
    pub async fn create_bucket<S: Store>(&self, store: &S, base_time: u64) -> StoreResult<()> {
        let key = self.keys.bucket(&self.name, base_time);
        for outcome in Outcome::ALL {
            store.hincr_by(&key, outcome.field(), 0).await?;
        }
        store.expire(&key, self.bucket_ttl).await?;
        Ok(())
    }

    /// Increment `outcome` in the current bucket.
    pub async fn record<S: Store>(
        &self,
        store: &S,
        base_time: u64,
        outcome: Outcome,
    ) -> StoreResult<()> {
        let key = self.keys.bucket(&self.name, base_time);
        if !store.exists(&key).await? {
            self.create_bucket(store, base_time).await?;
        }
        store.hincr_by(&key, outcome.field(), 1).await?;
        Ok(())
    }

    /// Read the window ending at the current bucket.
    pub async fn compute<S: Store>(
        &self,
        store: &S,
        base_time: u64,
    ) -> StoreResult<WindowMetrics> {
        let reads = (0..i64::from(self.num_buckets))
            .map(|n| self.read_bucket(store, base_time, -n));
        let buckets = try_join_all(reads).await?;
        Ok(WindowMetrics::from_buckets(&buckets))
    }

    async fn read_bucket<S: Store>(
        &self,
        store: &S,
        base_time: u64,
        offset: i64,
    ) -> StoreResult<Option<Bucket>> {
        let Some(key) = self.bucket_key(base_time, offset) else {
            return Ok(None);
        };
        let fields = store.hget_all(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Bucket::from_fields(&key, &fields).map(Some)
    }

    /// Shared tick value stored by whichever member advanced last.
    pub async fn shared_tick<S: Store>(&self, store: &S) -> StoreResult<Option<u64>> {
        let key = self.keys.ticker(&self.name);
        Ok(store.get(&key).await?.and_then(|raw| raw.parse().ok()))
    }

    pub async fn store_tick<S: Store>(&self, store: &S, base_time: u64) -> StoreResult<()> {
        store.set(&self.keys.ticker(&self.name), base_time.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn window() -> MetricsWindow {
        let config = CircuitConfig {
            window_duration_ms: 1000,
            num_buckets: 4,
            ..CircuitConfig::named("alpha")
        };
        MetricsWindow::new(Keyspace::new("test"), &config)
    }

    #[test]
    fn test_bucket_key() {
        let w = window();
        assert_eq!(w.bucket_key(1000, 0).unwrap(), "breaker:test:circuit:alpha:bucket:1000");
        assert_eq!(w.bucket_key(1000, -1).unwrap(), "breaker:test:circuit:alpha:bucket:750");
        assert_eq!(w.bucket_key(1000, 2).unwrap(), "breaker:test:circuit:alpha:bucket:1500");
        assert!(w.bucket_key(100, -1).is_none());
    }

    #[test]
    fn test_next_base_time_is_single_step() {
        let w = window();
        assert_eq!(w.next_base_time(1000, 1250), None);
        assert_eq!(w.next_base_time(1000, 1251), Some(1250));
        // Asleep for many buckets: still one step.
        assert_eq!(w.next_base_time(1000, 9000), Some(1250));
        // Clock behind the shared base time.
        assert_eq!(w.next_base_time(1000, 500), None);
    }

    #[tokio::test]
    async fn test_record_and_compute() {
        let store = MemoryStore::new();
        let w = window();

        for _ in 0..3 {
            w.record(&store, 1000, Outcome::Failure).await.unwrap();
        }
        w.record(&store, 1000, Outcome::Success).await.unwrap();
        w.record(&store, 750, Outcome::Timeout).await.unwrap();
        w.record(&store, 1000, Outcome::ShortCircuit).await.unwrap();
        // Outside the window (four buckets back).
        w.record(&store, 0, Outcome::Failure).await.unwrap();

        let m = w.compute(&store, 1000).await.unwrap();
        assert_eq!(m.error_count, 4);
        assert_eq!(m.total_count, 5);
        assert_eq!(m.last_successes, 1);
        assert_eq!(m.error_percentage, 80.0);
    }

    #[tokio::test]
    async fn test_create_bucket_keeps_existing_counts() {
        let store = MemoryStore::new();
        let w = window();
        w.record(&store, 1000, Outcome::Success).await.unwrap();
        w.create_bucket(&store, 1000).await.unwrap();

        let key = w.bucket_key(1000, 0).unwrap();
        let fields = store.hget_all(&key).await.unwrap();
        assert_eq!(fields["successes"], "1");
        assert_eq!(fields["shortCircuits"], "0");
    }

    #[tokio::test]
    async fn test_shared_tick_roundtrip() {
        let store = MemoryStore::new();
        let w = window();
        assert_eq!(w.shared_tick(&store).await.unwrap(), None);
        w.store_tick(&store, 1250).await.unwrap();
        assert_eq!(w.shared_tick(&store).await.unwrap(), Some(1250));
    }
}
