//! Fleet breaker demo.
//!
//! Runs several fleet members in one process against a shared in-memory
//! store. Each member drives the same circuits with a command that fails
//! until the circuit opens, then succeeds until it closes again, so the
//! fleet keeps cycling through open, half-open and closed.
//!
//! ```text
//! fleet-breaker --config breaker.toml --members 4 --duration-secs 30
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::task::JoinSet;

use fleet_breaker::config::loader::load_config;
use fleet_breaker::config::StoreTarget;
use fleet_breaker::lifecycle::signals;
use fleet_breaker::observability::{logging, metrics};
use fleet_breaker::{
    CircuitConfig, FleetConfig, FleetCoordinator, FleetEvent, MemoryStore, Shutdown,
};

#[derive(Parser, Debug)]
#[command(name = "fleet-breaker")]
#[command(about = "Run a simulated fleet sharing circuit breakers", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of simulated fleet members.
    #[arg(short, long, default_value_t = 4)]
    members: usize,

    /// Stop after this many seconds (0 runs until interrupted).
    #[arg(short, long, default_value_t = 0)]
    duration_secs: u64,

    /// Delay between commands issued by each member, in milliseconds.
    #[arg(long, default_value_t = 200)]
    call_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => FleetConfig::for_namespace("test"),
    };
    if config.circuits.is_empty() {
        config.circuits.push(CircuitConfig::named("alpha"));
    }

    logging::init(&config.observability.log_level);
    tracing::info!("fleet-breaker v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    match StoreTarget::parse(&config.store_url) {
        Ok(target) => tracing::info!(
            target = %target,
            "Shared store configured; the demo runs members against an in-process store"
        ),
        Err(e) => tracing::warn!(store_url = %config.store_url, error = %e, "Invalid store URL"),
    }

    tracing::info!(
        namespace = %config.namespace,
        members = cli.members,
        circuits = config.circuits.len(),
        tick_interval_ms = config.tick_interval_ms,
        "Configuration loaded"
    );

    let store = Arc::new(MemoryStore::new());
    let shutdown = Shutdown::new();
    let mut tasks = JoinSet::new();
    let mut fleets = Vec::with_capacity(cli.members);

    for member in 0..cli.members {
        let fleet = FleetCoordinator::new(config.clone(), store.clone());
        tasks.spawn(log_events(member, fleet.subscribe()));

        let background = fleet.start(&shutdown).await?;
        tasks.spawn(background.join());

        for circuit in &config.circuits {
            let circuit = fleet.circuit(circuit.clone()).await?;
            tasks.spawn(drive(
                circuit,
                Duration::from_millis(cli.call_interval_ms),
                fleet.subscribe(),
                shutdown.subscribe(),
            ));
        }
        fleets.push(fleet);
    }
    tracing::info!("Circuit breakers initialised");

    let stop = shutdown.clone();
    let duration = cli.duration_secs;
    tokio::spawn(async move {
        if duration == 0 {
            signals::wait_for_signal().await;
        } else {
            tokio::select! {
                _ = signals::wait_for_signal() => {}
                _ = tokio::time::sleep(Duration::from_secs(duration)) => {
                    tracing::info!(duration_secs = duration, "Demo duration elapsed");
                }
            }
        }
        stop.trigger();
    });

    // Event loggers only end when their coordinator is dropped.
    let mut shutdown_rx = shutdown.subscribe();
    let _ = shutdown_rx.recv().await;
    drop(fleets);
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Print state changes the way an alerting hook would.
async fn log_events(member: usize, mut events: tokio::sync::broadcast::Receiver<FleetEvent>) {
    use tokio::sync::broadcast::error::RecvError;
    loop {
        match events.recv().await {
            Ok(FleetEvent::Open(change)) => {
                tracing::warn!(
                    member,
                    circuit = %change.circuit_name,
                    state = %change.state,
                    "OPEN"
                )
            }
            Ok(FleetEvent::Closed(change)) => {
                tracing::info!(
                    member,
                    circuit = %change.circuit_name,
                    state = %change.state,
                    "CLOSED"
                )
            }
            Ok(FleetEvent::Error { message, .. }) => {
                tracing::error!(member, error = %message, "Fleet error")
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => tracing::debug!(member, skipped, "Event log lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Fail until the circuit short-circuits, then succeed until it closes.
async fn drive(
    circuit: Arc<fleet_breaker::Circuit<MemoryStore>>,
    every: Duration,
    mut events: tokio::sync::broadcast::Receiver<FleetEvent>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let healthy = AtomicBool::new(false);
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                while let Ok(event) = events.try_recv() {
                    if matches!(&event, FleetEvent::Closed(c) if c.circuit_name == circuit.name()) {
                        healthy.store(false, Ordering::SeqCst);
                    }
                }
                let result = circuit
                    .run_with_fallback(
                        |done| {
                            if healthy.load(Ordering::SeqCst) {
                                done.succeed();
                            } else {
                                done.fail();
                            }
                        },
                        || healthy.store(true, Ordering::SeqCst),
                    )
                    .await;
                if let Err(e) = result {
                    tracing::debug!(circuit = %circuit.name(), error = %e, "Command not recorded");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}
