//! Bucket counters.

use std::collections::HashMap;
use std::fmt;

use crate::store::StoreError;

/// Kind of outcome recorded against a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Failure,
    Timeout,
    ShortCircuit,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::Success,
        Outcome::Failure,
        Outcome::Timeout,
        Outcome::ShortCircuit,
    ];

    /// Hash field holding this counter.
    pub fn field(self) -> &'static str {
        match self {
            Outcome::Success => "successes",
            Outcome::Failure => "failures",
            Outcome::Timeout => "timeouts",
            Outcome::ShortCircuit => "shortCircuits",
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, Outcome::Failure | Outcome::Timeout)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// Counters of one time slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bucket {
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub short_circuits: u64,
}

impl Bucket {
    /// Decode a bucket hash. Missing fields count as zero.
    pub fn from_fields(key: &str, fields: &HashMap<String, String>) -> Result<Self, StoreError> {
        let read = |outcome: Outcome| -> Result<u64, StoreError> {
            match fields.get(outcome.field()) {
                None => Ok(0),
                Some(raw) => raw.parse().map_err(|_| StoreError::Decode {
                    key: key.to_string(),
                    reason: format!("{} = '{}' is not a counter", outcome.field(), raw),
                }),
            }
        };

        Ok(Self {
            successes: read(Outcome::Success)?,
            failures: read(Outcome::Failure)?,
            timeouts: read(Outcome::Timeout)?,
            short_circuits: read(Outcome::ShortCircuit)?,
        })
    }

    pub fn count(&self, outcome: Outcome) -> u64 {
        match outcome {
            Outcome::Success => self.successes,
            Outcome::Failure => self.failures,
            Outcome::Timeout => self.timeouts,
            Outcome::ShortCircuit => self.short_circuits,
        }
    }

    /// Failures plus timeouts.
    pub fn errors(&self) -> u64 {
        Outcome::ALL
            .into_iter()
            .filter(|outcome| outcome.is_error())
            .map(|outcome| self.count(outcome))
            .sum()
    }
}
