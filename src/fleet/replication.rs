//! Replication messages exchanged over pub/sub.
//!
//! Two kinds of traffic share the namespace pattern subscription:
//! - the announce channel `breaker:<ns>` carries bare circuit names
//! - each circuit channel `breaker:<ns>:circuit:<name>` carries JSON
//!   updates, either `{"circuitName","state"}` after a transition or
//!   `{"circuitName","baseTime"}` after a window advance

use serde::{Deserialize, Serialize};

use crate::circuit::CircuitState;
use crate::error::BreakerResult;
use crate::store::{Keyspace, PubSubMessage};

/// Fields to merge into a peer's local copy of a circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitUpdate {
    pub circuit_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<CircuitState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_time: Option<u64>,
}

impl CircuitUpdate {
    pub fn state_changed(circuit_name: &str, state: CircuitState) -> Self {
        Self {
            circuit_name: circuit_name.to_string(),
            state: Some(state),
            base_time: None,
        }
    }

    pub fn window_advanced(circuit_name: &str, base_time: u64) -> Self {
        Self {
            circuit_name: circuit_name.to_string(),
            state: None,
            base_time: Some(base_time),
        }
    }

    pub fn encode(&self) -> BreakerResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A circuit exists somewhere in the fleet.
    Announce(String),
    Update(CircuitUpdate),
}

/// Interpret a message received on the namespace pattern. `Ok(None)` for
/// channels that merely share the prefix (e.g. another namespace).
pub fn classify(keys: &Keyspace, msg: &PubSubMessage) -> BreakerResult<Option<Inbound>> {
    if msg.channel == keys.announce_channel() {
        let name = msg.payload.trim();
        if name.is_empty() {
            return Ok(None);
        }
        return Ok(Some(Inbound::Announce(name.to_string())));
    }
    if keys.circuit_from_channel(&msg.channel).is_some() {
        let update: CircuitUpdate = serde_json::from_str(&msg.payload)?;
        return Ok(Some(Inbound::Update(update)));
    }
    Ok(None)
}
