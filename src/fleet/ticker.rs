//! Background loops of a fleet member.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::fleet::coordinator::FleetCoordinator;
use crate::store::{Store, Subscription};

/// Random delay before the first tick attempt so members started together
/// do not all race for the lock on the same instant.
pub(crate) fn start_jitter(interval: Duration) -> Duration {
    let max = interval.as_millis().min(u64::MAX as u128) as u64;
    if max == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max))
}

/// Attempt a tick cycle every interval until shutdown.
pub async fn run_ticker<S: Store>(
    fleet: Arc<FleetCoordinator<S>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let interval = fleet.tick_interval();
    let jitter = start_jitter(interval);
    tracing::info!(
        namespace = %fleet.namespace(),
        interval_ms = interval.as_millis() as u64,
        jitter_ms = jitter.as_millis() as u64,
        "Fleet ticker starting"
    );

    let mut ticker = time::interval_at(time::Instant::now() + jitter, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = fleet.run_tick_cycle().await {
                    fleet.report("checklock", &e);
                }
            }
            _ = shutdown.recv() => {
                tracing::info!(
                    namespace = %fleet.namespace(),
                    "Fleet ticker received shutdown signal, exiting loop"
                );
                break;
            }
        }
    }
}

/// Apply replication traffic until shutdown or until the store closes the
/// subscription.
pub async fn run_listener<S: Store>(
    fleet: Arc<FleetCoordinator<S>>,
    mut subscription: Subscription,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(
        namespace = %fleet.namespace(),
        pattern = %fleet.keys().subscription_pattern(),
        "Replication listener starting"
    );

    loop {
        tokio::select! {
            msg = subscription.recv() => {
                let Some(msg) = msg else {
                    tracing::warn!(
                        namespace = %fleet.namespace(),
                        "Subscription closed, replication listener exiting"
                    );
                    break;
                };
                if let Err(e) = fleet.handle_message(&msg).await {
                    fleet.report("replicate", &e);
                }
            }
            _ = shutdown.recv() => {
                tracing::info!(
                    namespace = %fleet.namespace(),
                    "Replication listener received shutdown signal, exiting loop"
                );
                break;
            }
        }
    }
}
