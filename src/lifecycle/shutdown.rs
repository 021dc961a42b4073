//! Shutdown coordination for fleet members.

use tokio::sync::broadcast;

/// Broadcast trigger that every background loop subscribes to.
///
/// One `Shutdown` can serve several coordinators in the same process.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every subscribed loop to exit.
    pub fn trigger(&self) {
        let listeners = self.tx.receiver_count();
        tracing::info!(listeners, "Shutdown triggered");
        let _ = self.tx.send(());
    }

    /// Loops that have not yet dropped their receiver.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
