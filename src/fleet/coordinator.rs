//! Fleet coordinator.
//!
//! # Responsibilities
//! - Register circuits locally and persist/announce them to the fleet
//! - Load circuits announced by other members as load-only copies
//! - Elect one member per interval, via the fleet lock, to tick every circuit
//! - Merge replicated state and window updates into local copies

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::circuit::{Circuit, CircuitState};
use crate::config::validation::validate_circuit;
use crate::config::{CircuitConfig, FleetConfig};
use crate::error::{BreakerError, BreakerResult};
use crate::events::{FleetEvent, Member, Notifier};
use crate::fleet::registry::Registry;
use crate::fleet::replication::{classify, Inbound};
use crate::fleet::ticker;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::store::{Keyspace, LockHandle, PubSubMessage, Store};

/// Background tasks started by [`FleetCoordinator::start`].
#[derive(Debug)]
pub struct FleetTasks {
    pub listener: JoinHandle<()>,
    pub ticker: JoinHandle<()>,
}

impl FleetTasks {
    /// Wait for both tasks to exit (after shutdown is triggered).
    pub async fn join(self) {
        let _ = self.listener.await;
        let _ = self.ticker.await;
    }
}

/// One fleet member's view of a namespace.
pub struct FleetCoordinator<S: Store> {
    config: FleetConfig,
    keys: Keyspace,
    store: Arc<S>,
    registry: Registry<S>,
    notifier: Notifier,
}

impl<S: Store> FleetCoordinator<S> {
    pub fn new(config: FleetConfig, store: Arc<S>) -> Arc<Self> {
        let keys = Keyspace::new(config.namespace.clone());
        let notifier = Notifier::new(Member::current());
        tracing::info!(
            namespace = %config.namespace,
            guid = %notifier.member().guid,
            tick_interval_ms = config.tick_interval_ms,
            lock_ttl_ms = config.lock_ttl_ms,
            "Fleet coordinator created"
        );
        Arc::new(Self {
            config,
            keys,
            store,
            registry: Registry::new(),
            notifier,
        })
    }

    pub fn member(&self) -> Member {
        self.notifier.member()
    }

    pub fn namespace(&self) -> &str {
        self.keys.namespace()
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn keys(&self) -> &Keyspace {
        &self.keys
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Subscribe to coordinator and circuit events.
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.notifier.subscribe()
    }

    /// Local copy of `name`, if known.
    pub fn get(&self, name: &str) -> Option<Arc<Circuit<S>>> {
        self.registry.get(name)
    }

    pub fn circuits(&self) -> Vec<Arc<Circuit<S>>> {
        self.registry.all()
    }

    pub fn circuit_names(&self) -> Vec<String> {
        self.registry.names()
    }

    // --- Registration ---

    /// Register a circuit, or return the local copy if it is already known.
    ///
    /// A new circuit adopts any state and tick the fleet already persisted
    /// for the name, then persists its configuration and announces itself.
    pub async fn circuit(&self, config: CircuitConfig) -> BreakerResult<Arc<Circuit<S>>> {
        if config.name.is_empty() {
            let err = BreakerError::MissingCircuitName;
            self.report("register", &err);
            return Err(err);
        }
        if let Some(existing) = self.registry.get(&config.name) {
            return Ok(existing);
        }
        if let Err(errors) = validate_circuit(&config) {
            let joined: Vec<_> = errors.iter().map(|e| e.to_string()).collect();
            let err = BreakerError::InvalidConfig(joined.join(", "));
            self.report("register", &err);
            return Err(err);
        }

        let result = self.create_circuit(config).await;
        if let Err(e) = &result {
            self.report("register", e);
        }
        result
    }

    async fn create_circuit(&self, config: CircuitConfig) -> BreakerResult<Arc<Circuit<S>>> {
        let key = self.keys.circuit(&config.name);
        let persisted = self.store.hget_all(&key).await?;
        let state = match persisted.get("state") {
            Some(raw) => raw.parse()?,
            None => CircuitState::Closed,
        };

        let circuit = Arc::new(self.build(config, state));
        circuit.seed_shared_tick().await?;
        circuit.persist().await?;

        let circuit = self.registry.insert_if_absent(circuit);
        metrics::record_circuit_count(self.namespace(), self.registry.len());
        tracing::info!(
            namespace = %self.namespace(),
            circuit = %circuit.name(),
            state = %circuit.state(),
            "Circuit registered"
        );
        Ok(circuit)
    }

    /// Instantiate a load-only copy of a circuit persisted by another member.
    /// Returns `None` if nothing is persisted under `name`.
    pub async fn load_circuit(&self, name: &str) -> BreakerResult<Option<Arc<Circuit<S>>>> {
        if let Some(existing) = self.registry.get(name) {
            return Ok(Some(existing));
        }

        let key = self.keys.circuit(name);
        let fields = self.store.hget_all(&key).await?;
        if fields.is_empty() {
            tracing::debug!(circuit = %name, "Announced circuit not persisted; ignoring");
            return Ok(None);
        }
        let (config, state) = Circuit::<S>::decode_persisted(&key, &fields)?;

        let circuit = Arc::new(self.build(config, state));
        circuit.adopt_shared_tick().await?;

        let circuit = self.registry.insert_if_absent(circuit);
        metrics::record_circuit_count(self.namespace(), self.registry.len());
        metrics::record_replication("load");
        tracing::info!(
            namespace = %self.namespace(),
            circuit = %circuit.name(),
            state = %circuit.state(),
            "Circuit loaded from fleet"
        );
        Ok(Some(circuit))
    }

    /// Load every circuit the namespace has registered. Returns how many
    /// circuits are known locally afterwards.
    pub async fn sync_known_circuits(&self) -> BreakerResult<usize> {
        let names = self.store.smembers(&self.keys.circuit_set()).await?;
        for name in names {
            if let Err(e) = self.load_circuit(&name).await {
                self.report("sync", &e);
            }
        }
        Ok(self.registry.len())
    }

    fn build(&self, config: CircuitConfig, state: CircuitState) -> Circuit<S> {
        Circuit::new(
            config,
            self.keys.clone(),
            self.store.clone(),
            self.notifier.clone(),
            state,
        )
    }

    // --- Replication ---

    /// Apply one message received on the namespace subscription.
    pub async fn handle_message(&self, msg: &PubSubMessage) -> BreakerResult<()> {
        match classify(&self.keys, msg)? {
            Some(Inbound::Announce(name)) => {
                if !self.registry.contains(&name) {
                    self.load_circuit(&name).await?;
                }
            }
            Some(Inbound::Update(update)) => {
                let circuit = match self.registry.get(&update.circuit_name) {
                    Some(circuit) => Some(circuit),
                    None => self.load_circuit(&update.circuit_name).await?,
                };
                if let Some(circuit) = circuit {
                    circuit.apply_update(&update);
                    let kind = if update.state.is_some() { "state" } else { "window" };
                    metrics::record_replication(kind);
                }
            }
            None => {}
        }
        Ok(())
    }

    // --- Ticking ---

    /// Try to take the fleet lock and, if this member wins, tick every
    /// local circuit. The lock is held for one further interval before it
    /// is released so no member ticks again within the same cycle.
    /// Returns whether this member ticked.
    pub async fn run_tick_cycle(self: &Arc<Self>) -> BreakerResult<bool> {
        let member = self.member();
        self.notifier.emit(FleetEvent::CheckLock(member));

        let Some(handle) = self
            .store
            .acquire_lock(&self.keys.lock(), self.config.lock_ttl())
            .await?
        else {
            metrics::record_lock(false);
            tracing::trace!(namespace = %self.namespace(), "Tick lock held by another member");
            return Ok(false);
        };

        metrics::record_lock(true);
        self.notifier.emit(FleetEvent::Lock(member));
        self.notifier.emit(FleetEvent::Tick(member));
        let advanced = self.tick_all().await;
        tracing::debug!(
            namespace = %self.namespace(),
            circuits = self.registry.len(),
            advanced,
            "Tick complete"
        );

        let fleet = Arc::clone(self);
        let hold = self.config.tick_interval();
        tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            fleet.release(handle).await;
        });
        Ok(true)
    }

    /// Tick every local circuit. Returns how many windows advanced.
    pub async fn tick_all(&self) -> usize {
        let mut advanced = 0;
        for circuit in self.registry.all() {
            match circuit.tick().await {
                Ok(true) => advanced += 1,
                Ok(false) => {}
                Err(e) => self.report("tick", &e),
            }
        }
        advanced
    }

    async fn release(&self, handle: LockHandle) {
        match self.store.release_lock(&handle).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                namespace = %self.namespace(),
                "Tick lock expired before release"
            ),
            Err(e) => self.report("unlock", &e.into()),
        }
        self.notifier.emit(FleetEvent::Unlock(self.member()));
    }

    // --- Lifecycle ---

    /// Subscribe to the namespace, load already-registered circuits and
    /// start the replication listener and the tick loop.
    pub async fn start(self: &Arc<Self>, shutdown: &Shutdown) -> BreakerResult<FleetTasks> {
        let subscription = self
            .store
            .psubscribe(&self.keys.subscription_pattern())
            .await?;

        if let Err(e) = self.sync_known_circuits().await {
            self.report("sync", &e);
        }

        let listener = tokio::spawn(ticker::run_listener(
            Arc::clone(self),
            subscription,
            shutdown.subscribe(),
        ));
        let ticker = tokio::spawn(ticker::run_ticker(Arc::clone(self), shutdown.subscribe()));

        tracing::info!(
            namespace = %self.namespace(),
            guid = %self.member().guid,
            circuits = self.registry.len(),
            "Fleet member started"
        );
        Ok(FleetTasks { listener, ticker })
    }

    pub(crate) fn tick_interval(&self) -> Duration {
        self.config.tick_interval()
    }

    /// Log an error and surface it on the event channel.
    pub(crate) fn report(&self, operation: &str, error: &BreakerError) {
        tracing::warn!(
            namespace = %self.namespace(),
            operation,
            error = %error,
            "Fleet operation failed"
        );
        self.notifier.error(error.to_string());
    }
}

impl<S: Store> std::fmt::Debug for FleetCoordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetCoordinator")
            .field("namespace", &self.config.namespace)
            .field("guid", &self.member().guid)
            .field("circuits", &self.registry.len())
            .finish()
    }
}
