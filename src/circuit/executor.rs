//! Protected command execution.
//!
//! # Flow
//! ```text
//! run(command)
//!     → circuit open?  → fallback, record shortCircuits
//!     → otherwise      → command(Completion), start timeout
//!                      → first of succeed / fail / timeout wins
//!                      → record outcome → re-evaluate state (unless forced)
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::circuit::breaker::Circuit;
use crate::error::{BreakerError, BreakerResult};
use crate::store::Store;
use crate::window::Outcome;

/// Completion handle passed to a command.
///
/// Only the first of `succeed`, `fail` or the executor's timeout counts;
/// every later call is a silent no-op. Clones share the same slot, so the
/// handle can be moved into spawned tasks.
#[derive(Debug, Clone)]
pub struct Completion {
    slot: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

impl Completion {
    fn new(tx: oneshot::Sender<Outcome>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Report success. Returns false if the command had already completed.
    pub fn succeed(&self) -> bool {
        self.complete(Outcome::Success)
    }

    /// Report failure. Returns false if the command had already completed.
    pub fn fail(&self) -> bool {
        self.complete(Outcome::Failure)
    }

    fn complete(&self, outcome: Outcome) -> bool {
        match self.take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    fn take(&self) -> Option<oneshot::Sender<Outcome>> {
        match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

/// Error returned by [`Circuit::call`].
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The circuit is open; the future was never polled.
    #[error("circuit open")]
    Rejected,
    #[error("command timed out")]
    Timeout,
    #[error("command failed: {0}")]
    Failed(E),
}

impl<S: Store> Circuit<S> {
    /// Run `command` through the circuit.
    ///
    /// The command receives a [`Completion`] and must call `succeed` or
    /// `fail` on it, directly or from a task it spawns, before the circuit's
    /// timeout elapses. Returns the outcome that was recorded.
    pub async fn run<C>(&self, command: C) -> BreakerResult<Outcome>
    where
        C: FnOnce(Completion),
    {
        self.run_with_fallback(command, || {}).await
    }

    /// Like [`run`](Self::run), invoking `fallback` instead of the command
    /// while the circuit is open.
    pub async fn run_with_fallback<C, F>(&self, command: C, fallback: F) -> BreakerResult<Outcome>
    where
        C: FnOnce(Completion),
        F: FnOnce(),
    {
        if self.is_open() {
            fallback();
            self.settle(Outcome::ShortCircuit).await?;
            return Ok(Outcome::ShortCircuit);
        }

        let (tx, rx) = oneshot::channel();
        let completion = Completion::new(tx);
        command(completion.clone());

        let outcome = match tokio::time::timeout(self.config().timeout(), rx).await {
            Ok(Ok(outcome)) => outcome,
            // Unreachable while `completion` is held here; treat as a timeout.
            Ok(Err(_)) => Outcome::Timeout,
            Err(_) => {
                completion.take();
                Outcome::Timeout
            }
        };

        self.settle(outcome).await?;
        Ok(outcome)
    }

    /// Await `fut` through the circuit with the circuit's timeout.
    ///
    /// Store failures while recording are reported on the event channel
    /// rather than returned, so the caller always sees the command's own
    /// result.
    pub async fn call<T, E, Fut>(&self, fut: Fut) -> Result<T, CallError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        if self.is_open() {
            self.settle_reported(Outcome::ShortCircuit).await;
            return Err(CallError::Rejected);
        }

        let (outcome, result) = match tokio::time::timeout(self.config().timeout(), fut).await {
            Ok(Ok(value)) => (Outcome::Success, Ok(value)),
            Ok(Err(e)) => (Outcome::Failure, Err(CallError::Failed(e))),
            Err(_) => (Outcome::Timeout, Err(CallError::Timeout)),
        };
        self.settle_reported(outcome).await;
        result
    }

    /// Record the outcome, then re-evaluate unless a short-circuit or a
    /// manual override makes evaluation moot.
    async fn settle(&self, outcome: Outcome) -> BreakerResult<()> {
        let result = self.settle_inner(outcome).await;
        if let Err(e) = &result {
            self.report(e);
        }
        result
    }

    async fn settle_reported(&self, outcome: Outcome) {
        let _ = self.settle(outcome).await;
    }

    async fn settle_inner(&self, outcome: Outcome) -> BreakerResult<()> {
        self.record(outcome).await?;
        if outcome != Outcome::ShortCircuit && !self.is_forced() {
            self.update_state().await?;
        }
        Ok(())
    }

    fn report(&self, error: &BreakerError) {
        tracing::warn!(circuit = %self.name(), error = %error, "Failed to record command outcome");
        self.notifier().error(format!("{}: {}", self.name(), error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::circuit::CircuitState;
    use crate::config::CircuitConfig;
    use crate::events::{Member, Notifier};
    use crate::store::{Keyspace, MemoryStore};
    use crate::window::Bucket;

    fn circuit(timeout_ms: u64) -> (Arc<MemoryStore>, Circuit<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = CircuitConfig {
            timeout_ms,
            ..CircuitConfig::named("alpha")
        };
        let c = Circuit::new(
            config,
            Keyspace::new("test"),
            store.clone(),
            Notifier::new(Member::current()),
            CircuitState::Closed,
        );
        (store, c)
    }

    async fn current_bucket(store: &MemoryStore, c: &Circuit<MemoryStore>) -> Bucket {
        let key = format!("breaker:test:circuit:alpha:bucket:{}", c.base_time());
        Bucket::from_fields(&key, &store.hget_all(&key).await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_success_and_failure_recorded() {
        let (store, c) = circuit(1000);
        assert_eq!(c.run(|done| { done.succeed(); }).await.unwrap(), Outcome::Success);
        assert_eq!(c.run(|done| { done.fail(); }).await.unwrap(), Outcome::Failure);

        let bucket = current_bucket(&store, &c).await;
        assert_eq!(bucket.successes, 1);
        assert_eq!(bucket.failures, 1);
    }

    #[tokio::test]
    async fn test_second_completion_is_ignored() {
        let (store, c) = circuit(1000);
        let outcome = c
            .run(|done| {
                assert!(done.succeed());
                assert!(!done.fail());
                assert!(!done.succeed());
            })
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Success);

        let bucket = current_bucket(&store, &c).await;
        assert_eq!(bucket.successes, 1);
        assert_eq!(bucket.failures, 0);
    }

    #[tokio::test]
    async fn test_timeout_wins_over_late_completion() {
        let (store, c) = circuit(20);
        let (late_tx, late_rx) = oneshot::channel();
        let outcome = c
            .run(move |done| {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    let _ = late_tx.send(done.succeed());
                });
            })
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Timeout);

        assert!(!late_rx.await.unwrap());
        let bucket = current_bucket(&store, &c).await;
        assert_eq!(bucket.timeouts, 1);
        assert_eq!(bucket.successes, 0);
    }

    #[tokio::test]
    async fn test_open_circuit_short_circuits() {
        let (store, c) = circuit(1000);
        c.force_open().await.unwrap();

        let invoked = AtomicUsize::new(0);
        let fallbacks = AtomicUsize::new(0);
        for _ in 0..5 {
            let outcome = c
                .run_with_fallback(
                    |_| {
                        invoked.fetch_add(1, Ordering::SeqCst);
                    },
                    || {
                        fallbacks.fetch_add(1, Ordering::SeqCst);
                    },
                )
                .await
                .unwrap();
            assert_eq!(outcome, Outcome::ShortCircuit);
        }

        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(fallbacks.load(Ordering::SeqCst), 5);
        assert_eq!(current_bucket(&store, &c).await.short_circuits, 5);
    }

    #[tokio::test]
    async fn test_failures_open_the_circuit() {
        let (_store, c) = circuit(1000);
        for _ in 0..60 {
            c.run(|done| { done.fail(); }).await.unwrap();
        }
        assert_eq!(c.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_forced_close_skips_evaluation() {
        let (_store, c) = circuit(1000);
        c.force_close().await.unwrap();
        for _ in 0..60 {
            c.run(|done| { done.fail(); }).await.unwrap();
        }
        assert_eq!(c.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_call_classifies_results() {
        let (store, c) = circuit(20);

        let ok: Result<u32, CallError<&str>> = c.call(async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let failed = c.call(async { Err::<u32, _>("boom") }).await;
        assert!(matches!(failed, Err(CallError::Failed("boom"))));

        let slow = c
            .call(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, &str>(1)
            })
            .await;
        assert!(matches!(slow, Err(CallError::Timeout)));

        let bucket = current_bucket(&store, &c).await;
        assert_eq!((bucket.successes, bucket.failures, bucket.timeouts), (1, 1, 1));

        c.force_open().await.unwrap();
        let rejected = c.call(async { Ok::<_, &str>(1) }).await;
        assert!(matches!(rejected, Err(CallError::Rejected)));
    }
}
