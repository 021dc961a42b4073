//! Metrics collection and exposition.
//!
//! # Metrics
//! - `breaker_outcomes_total` (counter): command outcomes by circuit, outcome
//! - `breaker_transitions_total` (counter): state changes by circuit, target state
//! - `breaker_window_advances_total` (counter): bucket advances by circuit
//! - `breaker_lock_total` (counter): tick lock attempts by result
//! - `breaker_replication_total` (counter): applied fleet messages by kind
//! - `breaker_circuits` (gauge): circuits known locally, by namespace
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until a
//!   recorder is installed
//! - The Prometheus exporter is optional and owns its own HTTP listener

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::circuit::CircuitState;
use crate::window::Outcome;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics endpoint listening");
    Ok(())
}

pub fn record_outcome(circuit: &str, outcome: Outcome) {
    metrics::counter!(
        "breaker_outcomes_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.field()
    )
    .increment(1);
}

pub fn record_transition(circuit: &str, state: CircuitState) {
    metrics::counter!(
        "breaker_transitions_total",
        "circuit" => circuit.to_string(),
        "state" => state.as_str()
    )
    .increment(1);
}

pub fn record_window_advance(circuit: &str) {
    metrics::counter!(
        "breaker_window_advances_total",
        "circuit" => circuit.to_string()
    )
    .increment(1);
}

/// Count a tick lock attempt.
pub fn record_lock(acquired: bool) {
    let result = if acquired { "acquired" } else { "contended" };
    metrics::counter!("breaker_lock_total", "result" => result).increment(1);
}

pub fn record_replication(kind: &'static str) {
    metrics::counter!("breaker_replication_total", "kind" => kind).increment(1);
}

pub fn record_circuit_count(namespace: &str, count: usize) {
    metrics::gauge!("breaker_circuits", "namespace" => namespace.to_string()).set(count as f64);
}
