//! Fleet coordination subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (coordinator.rs):
//!     circuit(config) → adopt persisted state + shared tick → persist → announce
//!
//! Ticking (ticker.rs → coordinator.rs):
//!     every interval → try fleet lock → winner ticks all circuits
//!                    → hold lock one more interval → release
//!
//! Replication (ticker.rs → replication.rs → coordinator.rs):
//!     pattern subscription → announce: load circuit
//!                          → update: merge state / base time into local copy
//! ```
//!
//! # Design Decisions
//! - Exactly one member ticks per cycle; the others learn the new base
//!   time from the published update
//! - Circuits announced by others are load-only: they never persist their
//!   own configuration over the originator's
//! - Store failures in background loops are logged and surfaced as
//!   `error` events; the loops keep running

pub mod coordinator;
pub mod registry;
pub mod replication;
pub mod ticker;

pub use coordinator::{FleetCoordinator, FleetTasks};
pub use registry::Registry;
pub use replication::{CircuitUpdate, Inbound};
