//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files and
//! default every field, so a minimal config only names the namespace.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for one fleet member.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Namespace key shared by every member of the fleet.
    pub namespace: String,

    /// Interval between tick attempts in milliseconds.
    pub tick_interval_ms: u64,

    /// Lifetime of the tick lock in milliseconds.
    pub lock_ttl_ms: u64,

    /// Connection target of the shared store.
    pub store_url: String,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Circuits to register at startup.
    pub circuits: Vec<CircuitConfig>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            namespace: "unknown".to_string(),
            tick_interval_ms: 1000,
            lock_ttl_ms: 10_000,
            store_url: "redis://localhost:6379".to_string(),
            observability: ObservabilityConfig::default(),
            circuits: Vec::new(),
        }
    }
}

impl FleetConfig {
    /// Config for `namespace` with every other setting at its default.
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }
}

/// Per-circuit settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Unique circuit name within the namespace.
    pub name: String,

    /// Length of the sliding window in milliseconds.
    pub window_duration_ms: u64,

    /// Number of buckets the window is split into.
    pub num_buckets: u32,

    /// Command timeout in milliseconds.
    pub timeout_ms: u64,

    /// Error percentage above which the circuit opens.
    pub error_threshold: u32,

    /// Minimum number of calls in the window before the error rate counts.
    pub volume_threshold: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            window_duration_ms: 10_000,
            num_buckets: 10,
            timeout_ms: 3000,
            error_threshold: 50,
            volume_threshold: 50,
        }
    }
}

impl CircuitConfig {
    /// Config for `name` with every other setting at its default.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Bucket length in milliseconds. Integer division; fixed for the
    /// lifetime of the circuit.
    pub fn bucket_duration_ms(&self) -> u64 {
        self.window_duration_ms / u64::from(self.num_buckets.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Buckets live for two windows before the store expires them.
    pub fn bucket_ttl(&self) -> Duration {
        Duration::from_millis(2 * self.window_duration_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
