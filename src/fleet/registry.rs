//! Per-process circuit registry.
//!
//! Maps circuit names to the local copy of each circuit. Entries are added
//! by local registration or by replication and live until the process
//! exits; there is no removal.

use std::sync::Arc;

use dashmap::DashMap;

use crate::circuit::Circuit;
use crate::store::Store;

pub struct Registry<S: Store> {
    circuits: DashMap<String, Arc<Circuit<S>>>,
}

impl<S: Store> Registry<S> {
    pub fn new() -> Self {
        Self {
            circuits: DashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Circuit<S>>> {
        self.circuits.get(name).map(|r| r.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.circuits.contains_key(name)
    }

    /// Insert `circuit` unless a circuit with the same name is already
    /// registered. Returns whichever circuit ends up registered.
    pub fn insert_if_absent(&self, circuit: Arc<Circuit<S>>) -> Arc<Circuit<S>> {
        self.circuits
            .entry(circuit.name().to_string())
            .or_insert(circuit)
            .value()
            .clone()
    }

    /// Snapshot of every registered circuit. No map guard is held afterwards.
    pub fn all(&self) -> Vec<Arc<Circuit<S>>> {
        self.circuits.iter().map(|r| r.value().clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.circuits.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.circuits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.circuits.is_empty()
    }
}

impl<S: Store> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitState;
    use crate::config::CircuitConfig;
    use crate::events::{Member, Notifier};
    use crate::store::{Keyspace, MemoryStore};

    fn circuit(name: &str, state: CircuitState) -> Arc<Circuit<MemoryStore>> {
        Arc::new(Circuit::new(
            CircuitConfig::named(name),
            Keyspace::new("test"),
            Arc::new(MemoryStore::new()),
            Notifier::new(Member::current()),
            state,
        ))
    }

    #[test]
    fn test_first_registration_wins() {
        let registry = Registry::new();
        assert!(registry.is_empty());

        let first = registry.insert_if_absent(circuit("alpha", CircuitState::Open));
        let second = registry.insert_if_absent(circuit("alpha", CircuitState::Closed));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.get("alpha").unwrap().state(), CircuitState::Open);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_names_sorted() {
        let registry = Registry::new();
        registry.insert_if_absent(circuit("beta", CircuitState::Closed));
        registry.insert_if_absent(circuit("alpha", CircuitState::Closed));
        assert_eq!(registry.names(), vec!["alpha", "beta"]);
        assert!(registry.contains("beta"));
        assert!(!registry.contains("gamma"));
        assert_eq!(registry.all().len(), 2);
    }
}
