//! Rolling window statistics.

use crate::window::bucket::Bucket;

/// Aggregate of the buckets currently inside the window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowMetrics {
    /// Failures plus timeouts across the window.
    pub error_count: u64,
    /// Errors plus successes across the window. Short-circuits are excluded.
    pub total_count: u64,
    /// `100 * error_count / max(total_count, 1)`.
    pub error_percentage: f64,
    /// Successes of the most recent bucket that exists in the store.
    pub last_successes: u64,
}

impl WindowMetrics {
    /// Aggregate buckets ordered newest first. `None` marks a bucket that was
    /// never written (or has expired) and counts as all-zero.
    pub fn from_buckets(buckets: &[Option<Bucket>]) -> Self {
        let mut error_count = 0;
        let mut total_count = 0;
        let mut last_successes = None;

        for bucket in buckets.iter().flatten() {
            error_count += bucket.errors();
            total_count += bucket.errors() + bucket.successes;
            if last_successes.is_none() {
                last_successes = Some(bucket.successes);
            }
        }

        Self {
            error_count,
            total_count,
            error_percentage: 100.0 * error_count as f64 / total_count.max(1) as f64,
            last_successes: last_successes.unwrap_or(0),
        }
    }

    pub fn success_count(&self) -> u64 {
        self.total_count - self.error_count
    }

    /// Both the volume and the error-rate thresholds are strictly exceeded.
    pub fn exceeds(&self, volume_threshold: u64, error_threshold: u32) -> bool {
        self.total_count > volume_threshold && self.error_percentage > f64::from(error_threshold)
    }

    /// The half-open trial call failed: no successes in the latest bucket while
    /// the window holds errors.
    pub fn trial_failed(&self) -> bool {
        self.last_successes == 0 && self.error_count > 0
    }
}
