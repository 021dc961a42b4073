//! A single circuit shared by the fleet.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::circuit::state::{evaluate, CircuitState};
use crate::config::CircuitConfig;
use crate::error::{BreakerError, BreakerResult};
use crate::events::Notifier;
use crate::fleet::replication::CircuitUpdate;
use crate::observability::metrics;
use crate::store::{Keyspace, Store};
use crate::window::{MetricsWindow, Outcome, WindowMetrics};

/// `forced` value when no manual override is active.
const NOT_FORCED: u8 = 0;

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Point-in-time view of a circuit's local state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSnapshot {
    pub circuit_name: String,
    pub state: CircuitState,
    pub forced: bool,
    pub base_time: u64,
}

/// Local copy of one fleet-wide circuit.
///
/// Counters live in the store; this struct only holds the state, the
/// override marker and the base time the current bucket is keyed on.
pub struct Circuit<S: Store> {
    config: CircuitConfig,
    keys: Keyspace,
    window: MetricsWindow,
    store: Arc<S>,
    notifier: Notifier,
    /// Current state (`CircuitState` repr).
    state: AtomicU8,
    /// State saved by a force call, or `NOT_FORCED`.
    forced: AtomicU8,
    /// Start of the current bucket in epoch milliseconds.
    base_time: AtomicU64,
    /// Set when a window advance puts the circuit into half-open, cleared
    /// once the next outcome has been evaluated.
    trial_pending: AtomicBool,
}

impl<S: Store> Circuit<S> {
    pub(crate) fn new(
        config: CircuitConfig,
        keys: Keyspace,
        store: Arc<S>,
        notifier: Notifier,
        state: CircuitState,
    ) -> Self {
        let window = MetricsWindow::new(keys.clone(), &config);
        Self {
            config,
            keys,
            window,
            store,
            notifier,
            state: AtomicU8::new(state as u8),
            forced: AtomicU8::new(NOT_FORCED),
            base_time: AtomicU64::new(now_ms()),
            trial_pending: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_repr(self.state.load(Ordering::SeqCst)).unwrap_or(CircuitState::Closed)
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// A manual override is in effect.
    pub fn is_forced(&self) -> bool {
        self.forced.load(Ordering::SeqCst) != NOT_FORCED
    }

    pub fn base_time(&self) -> u64 {
        self.base_time.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            circuit_name: self.config.name.clone(),
            state: self.state(),
            forced: self.is_forced(),
            base_time: self.base_time(),
        }
    }

    /// Live metrics of the current window, read from the store.
    pub async fn metrics(&self) -> BreakerResult<WindowMetrics> {
        Ok(self.window.compute(&*self.store, self.base_time()).await?)
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    // --- Persistence ---

    /// Write the configuration and state, register the name and announce
    /// the circuit to the fleet.
    pub(crate) async fn persist(&self) -> BreakerResult<()> {
        let c = &self.config;
        let fields = [
            ("circuitName", c.name.clone()),
            ("windowDuration", c.window_duration_ms.to_string()),
            ("numBuckets", c.num_buckets.to_string()),
            ("timeoutDuration", c.timeout_ms.to_string()),
            ("errorThreshold", c.error_threshold.to_string()),
            ("volumeThreshold", c.volume_threshold.to_string()),
            ("state", self.state().as_str().to_string()),
        ];
        self.store.hset_all(&self.keys.circuit(&c.name), &fields).await?;
        self.store.sadd(&self.keys.circuit_set(), &c.name).await?;
        self.store.publish(&self.keys.announce_channel(), &c.name).await?;
        Ok(())
    }

    /// Decode a persisted circuit hash into its configuration and state.
    pub fn decode_persisted(
        key: &str,
        fields: &HashMap<String, String>,
    ) -> BreakerResult<(CircuitConfig, CircuitState)> {
        fn number<T: std::str::FromStr>(
            key: &str,
            fields: &HashMap<String, String>,
            field: &str,
            default: T,
        ) -> BreakerResult<T> {
            match fields.get(field) {
                None => Ok(default),
                Some(raw) => raw.parse().map_err(|_| {
                    BreakerError::InvalidConfig(format!(
                        "{}: {} = '{}' is not a number",
                        key, field, raw
                    ))
                }),
            }
        }

        let defaults = CircuitConfig::default();
        let name = fields
            .get("circuitName")
            .filter(|n| !n.is_empty())
            .cloned()
            .ok_or(BreakerError::MissingCircuitName)?;
        let config = CircuitConfig {
            name,
            window_duration_ms: number(key, fields, "windowDuration", defaults.window_duration_ms)?,
            num_buckets: number(key, fields, "numBuckets", defaults.num_buckets)?,
            timeout_ms: number(key, fields, "timeoutDuration", defaults.timeout_ms)?,
            error_threshold: number(key, fields, "errorThreshold", defaults.error_threshold)?,
            volume_threshold: number(key, fields, "volumeThreshold", defaults.volume_threshold)?,
        };
        let state = match fields.get("state") {
            Some(raw) => raw.parse()?,
            None => CircuitState::Closed,
        };
        Ok((config, state))
    }

    /// Align the local base time with the fleet's last tick, if any.
    pub(crate) async fn adopt_shared_tick(&self) -> BreakerResult<()> {
        if let Some(shared) = self.window.shared_tick(&*self.store).await? {
            self.base_time.store(shared, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Like [`adopt_shared_tick`](Self::adopt_shared_tick), but publishes
    /// the local base time as the shared tick when the fleet has none yet,
    /// so members registering before the first advance share buckets.
    pub(crate) async fn seed_shared_tick(&self) -> BreakerResult<()> {
        match self.window.shared_tick(&*self.store).await? {
            Some(shared) => self.base_time.store(shared, Ordering::SeqCst),
            None => self.window.store_tick(&*self.store, self.base_time()).await?,
        }
        Ok(())
    }

    // --- State machine ---

    /// Move to `state`, persist it, publish it to the fleet and notify
    /// local observers.
    pub(crate) async fn set_state(&self, state: CircuitState) -> BreakerResult<()> {
        let name = self.name();
        let previous = self.state.swap(state as u8, Ordering::SeqCst);
        tracing::info!(
            circuit = %name,
            from = ?CircuitState::from_repr(previous),
            to = %state,
            "Circuit state changed"
        );
        metrics::record_transition(name, state);

        let key = self.keys.circuit(name);
        self.store.hset(&key, "state", state.as_str().to_string()).await?;
        let update = CircuitUpdate::state_changed(name, state).encode()?;
        self.store.publish(&key, &update).await?;
        self.notifier.transition(name, state);
        Ok(())
    }

    /// Re-evaluate the state against fresh window metrics.
    pub(crate) async fn update_state(&self) -> BreakerResult<()> {
        self.trial_pending.store(false, Ordering::SeqCst);
        let metrics = self.metrics().await?;
        let current = self.state();
        tracing::debug!(
            circuit = %self.name(),
            state = %current,
            total = metrics.total_count,
            errors = metrics.error_count,
            error_pct = metrics.error_percentage,
            last_successes = metrics.last_successes,
            "Evaluating circuit"
        );
        if let Some(next) = evaluate(
            current,
            &metrics,
            self.config.volume_threshold,
            self.config.error_threshold,
        ) {
            self.set_state(next).await?;
        }
        Ok(())
    }

    /// Count an outcome in the current bucket.
    pub(crate) async fn record(&self, outcome: Outcome) -> BreakerResult<()> {
        self.window.record(&*self.store, self.base_time(), outcome).await?;
        metrics::record_outcome(self.name(), outcome);
        Ok(())
    }

    // --- Manual override ---

    /// Open the circuit regardless of metrics until [`unforce`](Self::unforce).
    pub async fn force_open(&self) -> BreakerResult<()> {
        self.force(CircuitState::Open).await
    }

    /// Close the circuit regardless of metrics until [`unforce`](Self::unforce).
    pub async fn force_close(&self) -> BreakerResult<()> {
        self.force(CircuitState::Closed).await
    }

    async fn force(&self, state: CircuitState) -> BreakerResult<()> {
        // A second force keeps the state saved by the first.
        let current = self.state.load(Ordering::SeqCst);
        let _ = self
            .forced
            .compare_exchange(NOT_FORCED, current, Ordering::SeqCst, Ordering::SeqCst);
        tracing::info!(circuit = %self.name(), state = %state, "Circuit forced");
        self.set_state(state).await
    }

    /// Drop the override and restore the state saved when it was applied.
    pub async fn unforce(&self) -> BreakerResult<()> {
        let saved = self.forced.swap(NOT_FORCED, Ordering::SeqCst);
        match CircuitState::from_repr(saved) {
            Some(state) => {
                tracing::info!(circuit = %self.name(), state = %state, "Circuit override removed");
                self.set_state(state).await
            }
            None => Ok(()),
        }
    }

    // --- Window ---

    /// Tick against the wall clock.
    pub async fn tick(&self) -> BreakerResult<bool> {
        self.tick_at(now_ms()).await
    }

    /// Adopt the shared tick, advance the window by one bucket if the
    /// current one has expired at `now_ms`, then re-announce the circuit.
    /// Returns whether the window advanced.
    pub async fn tick_at(&self, now_ms: u64) -> BreakerResult<bool> {
        self.adopt_shared_tick().await?;

        let advanced = match self.window.next_base_time(self.base_time(), now_ms) {
            Some(next) => {
                self.advance_to(next).await?;
                true
            }
            None => false,
        };

        self.store
            .publish(&self.keys.announce_channel(), self.name())
            .await?;
        Ok(advanced)
    }

    async fn advance_to(&self, base_time: u64) -> BreakerResult<()> {
        let name = self.name();
        self.base_time.store(base_time, Ordering::SeqCst);
        self.window.store_tick(&*self.store, base_time).await?;
        self.window.create_bucket(&*self.store, base_time).await?;

        if !self.is_forced() {
            self.state.store(CircuitState::HalfOpen as u8, Ordering::SeqCst);
            self.trial_pending.store(true, Ordering::SeqCst);
            let half_open = CircuitState::HalfOpen.as_str().to_string();
            self.store
                .hset(&self.keys.circuit(name), "state", half_open)
                .await?;
        }

        let update = CircuitUpdate::window_advanced(name, base_time).encode()?;
        self.store.publish(&self.keys.circuit(name), &update).await?;

        metrics::record_window_advance(name);
        tracing::debug!(circuit = %name, base_time, forced = self.is_forced(), "Window advanced");
        Ok(())
    }

    // --- Replication ---

    /// Merge an update published by a fleet member (possibly this one).
    ///
    /// A newer base time moves the window and, unless forced, puts the
    /// circuit into half-open just like a local advance. The echo of the
    /// current base time restores half-open while the trial call is still pending,
    /// since an older state echo may have overwritten it in between. State
    /// updates are ignored while a local override is active.
    pub(crate) fn apply_update(&self, update: &CircuitUpdate) {
        if let Some(base_time) = update.base_time {
            let previous = self.base_time.fetch_max(base_time, Ordering::SeqCst);
            if !self.is_forced() {
                if base_time > previous {
                    self.trial_pending.store(true, Ordering::SeqCst);
                    self.state.store(CircuitState::HalfOpen as u8, Ordering::SeqCst);
                } else if base_time == previous && self.trial_pending.load(Ordering::SeqCst) {
                    self.state.store(CircuitState::HalfOpen as u8, Ordering::SeqCst);
                }
            }
        }

        if let Some(state) = update.state {
            if self.is_forced() {
                tracing::debug!(
                    circuit = %self.name(),
                    state = %state,
                    "Ignoring replicated state while forced"
                );
                return;
            }
            let previous = self.state.swap(state as u8, Ordering::SeqCst);
            if previous != state as u8 {
                tracing::debug!(circuit = %self.name(), state = %state, "Replicated state applied");
            }
        }
    }
}

impl<S: Store> std::fmt::Debug for Circuit<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Circuit")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .field("forced", &self.is_forced())
            .field("base_time", &self.base_time())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Member;
    use crate::store::MemoryStore;

    const T0: u64 = 1_000_000;

    fn circuit(store: &Arc<MemoryStore>) -> Circuit<MemoryStore> {
        let config = CircuitConfig {
            window_duration_ms: 1000,
            num_buckets: 10,
            volume_threshold: 5,
            error_threshold: 50,
            ..CircuitConfig::named("alpha")
        };
        let c = Circuit::new(
            config,
            Keyspace::new("test"),
            store.clone(),
            Notifier::new(Member::current()),
            CircuitState::Closed,
        );
        c.base_time.store(T0, Ordering::SeqCst);
        c
    }

    #[tokio::test]
    async fn test_persist_roundtrip() {
        let store = Arc::new(MemoryStore::new());
        let c = circuit(&store);
        c.persist().await.unwrap();

        let key = "breaker:test:circuit:alpha";
        let fields = store.hget_all(key).await.unwrap();
        let (config, state) = Circuit::<MemoryStore>::decode_persisted(key, &fields).unwrap();
        assert_eq!(&config, c.config());
        assert_eq!(state, CircuitState::Closed);
        assert_eq!(store.smembers("breaker:test:circuits").await.unwrap(), vec!["alpha"]);
    }

    #[test]
    fn test_decode_persisted_errors() {
        let mut fields = HashMap::new();
        assert!(matches!(
            Circuit::<MemoryStore>::decode_persisted("k", &fields),
            Err(BreakerError::MissingCircuitName)
        ));

        fields.insert("circuitName".to_string(), "alpha".to_string());
        fields.insert("numBuckets".to_string(), "ten".to_string());
        assert!(matches!(
            Circuit::<MemoryStore>::decode_persisted("k", &fields),
            Err(BreakerError::InvalidConfig(_))
        ));

        fields.insert("numBuckets".to_string(), "10".to_string());
        fields.insert("state".to_string(), "AJAR".to_string());
        assert!(matches!(
            Circuit::<MemoryStore>::decode_persisted("k", &fields),
            Err(BreakerError::UnknownState(_))
        ));
    }

    #[tokio::test]
    async fn test_opens_over_thresholds() {
        let store = Arc::new(MemoryStore::new());
        let c = circuit(&store);
        let mut events = c.notifier().subscribe();

        for _ in 0..6 {
            c.record(Outcome::Failure).await.unwrap();
        }
        c.update_state().await.unwrap();

        assert_eq!(c.state(), CircuitState::Open);
        let fields = store.hget_all("breaker:test:circuit:alpha").await.unwrap();
        assert_eq!(fields["state"], "OPEN");
        assert_eq!(events.recv().await.unwrap().name(), "open");
    }

    #[tokio::test]
    async fn test_tick_advances_single_bucket_and_half_opens() {
        let store = Arc::new(MemoryStore::new());
        let c = circuit(&store);
        c.set_state(CircuitState::Open).await.unwrap();

        assert!(!c.tick_at(T0 + 100).await.unwrap());
        assert_eq!(c.state(), CircuitState::Open);

        assert!(c.tick_at(T0 + 5000).await.unwrap());
        assert_eq!(c.base_time(), T0 + 100);
        assert_eq!(c.state(), CircuitState::HalfOpen);
        assert_eq!(
            store.get("breaker:test:circuit:alpha:ticker").await.unwrap(),
            Some((T0 + 100).to_string())
        );
        assert!(store
            .exists(&format!("breaker:test:circuit:alpha:bucket:{}", T0 + 100))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_tick_adopts_shared_base_time() {
        let store = Arc::new(MemoryStore::new());
        let c = circuit(&store);
        store
            .set("breaker:test:circuit:alpha:ticker", (T0 + 700).to_string())
            .await
            .unwrap();

        assert!(!c.tick_at(T0 + 750).await.unwrap());
        assert_eq!(c.base_time(), T0 + 700);
    }

    #[tokio::test]
    async fn test_half_open_trial_success_closes() {
        let store = Arc::new(MemoryStore::new());
        let c = circuit(&store);
        for _ in 0..6 {
            c.record(Outcome::Failure).await.unwrap();
        }
        c.update_state().await.unwrap();
        assert!(c.is_open());

        c.tick_at(T0 + 101).await.unwrap();
        assert_eq!(c.state(), CircuitState::HalfOpen);

        c.record(Outcome::Success).await.unwrap();
        c.update_state().await.unwrap();
        assert_eq!(c.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_trial_failure_reopens() {
        let store = Arc::new(MemoryStore::new());
        let c = circuit(&store);
        c.tick_at(T0 + 101).await.unwrap();
        assert_eq!(c.state(), CircuitState::HalfOpen);

        c.record(Outcome::Failure).await.unwrap();
        c.update_state().await.unwrap();
        assert_eq!(c.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_force_and_unforce_restore_prior_state() {
        let store = Arc::new(MemoryStore::new());
        let c = circuit(&store);

        c.force_open().await.unwrap();
        assert!(c.is_open());
        assert!(c.is_forced());
        c.unforce().await.unwrap();
        assert_eq!(c.state(), CircuitState::Closed);
        assert!(!c.is_forced());

        // Prior state produced by an earlier force cycle.
        c.force_open().await.unwrap();
        c.tick_at(T0 + 101).await.unwrap();
        c.unforce().await.unwrap();
        c.set_state(CircuitState::HalfOpen).await.unwrap();
        c.force_close().await.unwrap();
        c.force_open().await.unwrap();
        c.unforce().await.unwrap();
        assert_eq!(c.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_forced_circuit_skips_half_open_on_advance() {
        let store = Arc::new(MemoryStore::new());
        let c = circuit(&store);
        c.force_open().await.unwrap();

        assert!(c.tick_at(T0 + 101).await.unwrap());
        assert_eq!(c.base_time(), T0 + 100);
        assert_eq!(c.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_apply_update() {
        let store = Arc::new(MemoryStore::new());
        let c = circuit(&store);

        c.apply_update(&CircuitUpdate::state_changed("alpha", CircuitState::Open));
        assert!(c.is_open());

        // Stale base time leaves the state alone.
        c.apply_update(&CircuitUpdate::window_advanced("alpha", T0 - 100));
        assert_eq!(c.base_time(), T0);
        assert!(c.is_open());

        c.apply_update(&CircuitUpdate::window_advanced("alpha", T0 + 100));
        assert_eq!(c.base_time(), T0 + 100);
        assert_eq!(c.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_window_echo_restores_pending_trial() {
        let store = Arc::new(MemoryStore::new());
        let c = circuit(&store);
        assert!(c.tick_at(T0 + 101).await.unwrap());
        assert_eq!(c.state(), CircuitState::HalfOpen);

        // Echo of a transition published before the advance, then the
        // echo of the advance itself.
        c.apply_update(&CircuitUpdate::state_changed("alpha", CircuitState::Closed));
        assert_eq!(c.state(), CircuitState::Closed);
        c.apply_update(&CircuitUpdate::window_advanced("alpha", T0 + 100));
        assert_eq!(c.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_window_echo_after_trial_keeps_state() {
        let store = Arc::new(MemoryStore::new());
        let c = circuit(&store);
        assert!(c.tick_at(T0 + 101).await.unwrap());

        c.record(Outcome::Success).await.unwrap();
        c.update_state().await.unwrap();
        assert_eq!(c.state(), CircuitState::Closed);

        c.apply_update(&CircuitUpdate::window_advanced("alpha", T0 + 100));
        assert_eq!(c.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_apply_update_ignored_while_forced() {
        let store = Arc::new(MemoryStore::new());
        let c = circuit(&store);
        c.force_close().await.unwrap();

        c.apply_update(&CircuitUpdate::state_changed("alpha", CircuitState::Open));
        c.apply_update(&CircuitUpdate::window_advanced("alpha", T0 + 100));
        assert_eq!(c.state(), CircuitState::Closed);
        assert_eq!(c.base_time(), T0 + 100);
    }

    #[tokio::test]
    async fn test_snapshot_serializes_camel_case() {
        let store = Arc::new(MemoryStore::new());
        let c = circuit(&store);
        c.force_open().await.unwrap();

        let json = serde_json::to_value(c.snapshot()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "circuitName": "alpha",
                "state": "OPEN",
                "forced": true,
                "baseTime": T0,
            })
        );
    }

    #[tokio::test]
    async fn test_transitions_are_published() {
        let store = Arc::new(MemoryStore::new());
        let mut sub = store.psubscribe("breaker:test:circuit:alpha").await.unwrap();
        let c = circuit(&store);

        c.set_state(CircuitState::Open).await.unwrap();
        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.payload, r#"{"circuitName":"alpha","state":"OPEN"}"#);
    }
}
