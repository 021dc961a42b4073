//! Configuration validation.
//!
//! Serde handles syntax; this checks value ranges and naming. Returns every
//! problem found rather than stopping at the first.

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::{CircuitConfig, FleetConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a whole fleet configuration.
pub fn validate_config(config: &FleetConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.namespace.trim().is_empty() {
        errors.push(ValidationError::new("namespace", "must not be empty"));
    }
    if config.tick_interval_ms == 0 {
        errors.push(ValidationError::new("tick_interval_ms", "must be greater than 0"));
    }
    if config.lock_ttl_ms < config.tick_interval_ms {
        errors.push(ValidationError::new(
            "lock_ttl_ms",
            "must be at least tick_interval_ms",
        ));
    }

    let mut seen = HashSet::new();
    for (i, circuit) in config.circuits.iter().enumerate() {
        let prefix = format!("circuits[{}]", i);
        if let Err(mut circuit_errors) = validate_circuit(circuit) {
            for err in &mut circuit_errors {
                err.field = format!("{}.{}", prefix, err.field);
            }
            errors.extend(circuit_errors);
        }
        if !circuit.name.is_empty() && !seen.insert(circuit.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", prefix),
                format!("duplicate circuit name '{}'", circuit.name),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate one circuit's settings.
pub fn validate_circuit(circuit: &CircuitConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if circuit.name.trim().is_empty() {
        errors.push(ValidationError::new("name", "must not be empty"));
    }
    if circuit.num_buckets == 0 {
        errors.push(ValidationError::new("num_buckets", "must be greater than 0"));
    } else if circuit.bucket_duration_ms() == 0 {
        errors.push(ValidationError::new(
            "window_duration_ms",
            "must be at least num_buckets milliseconds",
        ));
    }
    if circuit.timeout_ms == 0 {
        errors.push(ValidationError::new("timeout_ms", "must be greater than 0"));
    }
    if circuit.error_threshold > 100 {
        errors.push(ValidationError::new("error_threshold", "must be a percentage (0-100)"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
