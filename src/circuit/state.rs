//! Circuit state and transition rule.
//!
//! ```text
//! Closed    → Open:               total > volume_threshold AND error% > error_threshold
//! HalfOpen  → Open:               latest bucket has no successes AND window has errors
//! HalfOpen  → Closed:             otherwise
//! any       → HalfOpen:           window advanced (unless forced)
//! ```
//!
//! Open never closes on its own; only the half-open trial after a window
//! advance can close it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BreakerError;
use crate::window::WindowMetrics;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed = 1,
    Open = 2,
    HalfOpen = 3,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }

    pub(crate) fn from_repr(val: u8) -> Option<Self> {
        match val {
            1 => Some(CircuitState::Closed),
            2 => Some(CircuitState::Open),
            3 => Some(CircuitState::HalfOpen),
            _ => None,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircuitState {
    type Err = BreakerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLOSED" => Ok(CircuitState::Closed),
            "OPEN" => Ok(CircuitState::Open),
            "HALF_OPEN" => Ok(CircuitState::HalfOpen),
            other => Err(BreakerError::UnknownState(other.to_string())),
        }
    }
}

/// State the circuit should move to after an outcome, or `None` to stay put.
pub fn evaluate(
    state: CircuitState,
    metrics: &WindowMetrics,
    volume_threshold: u64,
    error_threshold: u32,
) -> Option<CircuitState> {
    match state {
        CircuitState::HalfOpen if metrics.trial_failed() => Some(CircuitState::Open),
        CircuitState::HalfOpen => Some(CircuitState::Closed),
        CircuitState::Closed if metrics.exceeds(volume_threshold, error_threshold) => {
            Some(CircuitState::Open)
        }
        CircuitState::Closed | CircuitState::Open => None,
    }
}
