//! Fleet and circuit notifications.
//!
//! Observers (alerting, dashboards, logging) subscribe to a broadcast
//! channel of [`FleetEvent`]s instead of registering callbacks. The event
//! names mirror the integration points every fleet member exposes:
//! `checklock`, `lock`, `tick`, `unlock`, `error`, `open`, `closed`.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::circuit::CircuitState;

const EVENT_CAPACITY: usize = 256;

/// Identity of the fleet member raising an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Member {
    pub guid: Uuid,
    pub pid: u32,
}

impl Member {
    pub fn current() -> Self {
        Self {
            guid: Uuid::new_v4(),
            pid: std::process::id(),
        }
    }
}

/// A circuit changed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    pub circuit_name: String,
    pub state: CircuitState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetEvent {
    /// A tick attempt is about to try the fleet lock.
    CheckLock(Member),
    /// The fleet lock was acquired.
    Lock(Member),
    /// Circuits are being ticked by this member.
    Tick(Member),
    /// The fleet lock was released.
    Unlock(Member),
    Error { member: Member, message: String },
    Open(StateChange),
    Closed(StateChange),
}

impl FleetEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FleetEvent::CheckLock(_) => "checklock",
            FleetEvent::Lock(_) => "lock",
            FleetEvent::Tick(_) => "tick",
            FleetEvent::Unlock(_) => "unlock",
            FleetEvent::Error { .. } => "error",
            FleetEvent::Open(_) => "open",
            FleetEvent::Closed(_) => "closed",
        }
    }
}

/// Sending side of the event channel, tagged with the local member.
#[derive(Debug, Clone)]
pub struct Notifier {
    member: Member,
    tx: broadcast::Sender<FleetEvent>,
}

impl Notifier {
    pub fn new(member: Member) -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { member, tx }
    }

    pub fn member(&self) -> Member {
        self.member
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.tx.subscribe()
    }

    /// Deliver to current subscribers. Having none is not an error.
    pub fn emit(&self, event: FleetEvent) {
        let _ = self.tx.send(event);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(FleetEvent::Error {
            member: self.member,
            message: message.into(),
        });
    }

    /// Emit `open`/`closed` for a transition. Half-open has no event.
    pub fn transition(&self, circuit_name: &str, state: CircuitState) {
        let change = StateChange {
            circuit_name: circuit_name.to_string(),
            state,
        };
        match state {
            CircuitState::Open => self.emit(FleetEvent::Open(change)),
            CircuitState::Closed => self.emit(FleetEvent::Closed(change)),
            CircuitState::HalfOpen => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transition_events() {
        let notifier = Notifier::new(Member::current());
        let mut rx = notifier.subscribe();

        notifier.transition("alpha", CircuitState::HalfOpen);
        notifier.transition("alpha", CircuitState::Open);
        notifier.error("boom");

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "open");
        assert_eq!(
            event,
            FleetEvent::Open(StateChange {
                circuit_name: "alpha".into(),
                state: CircuitState::Open,
            })
        );
        assert_eq!(rx.recv().await.unwrap().name(), "error");
    }

    #[test]
    fn test_emit_without_subscribers() {
        let notifier = Notifier::new(Member::current());
        notifier.emit(FleetEvent::Tick(notifier.member()));
    }
}
