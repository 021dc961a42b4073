//! Fleet-wide circuit breakers backed by a shared store.
//!
//! Every process that registers a circuit under the same namespace shares
//! its sliding-window counters, its state and its window clock. One member
//! per interval, elected through a TTL lock, advances the windows; state
//! changes propagate to the rest of the fleet over pub/sub.

// Core
pub mod circuit;
pub mod config;
pub mod fleet;
pub mod store;
pub mod window;

// Cross-cutting concerns
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod observability;

pub use circuit::{CallError, Circuit, CircuitState, Completion};
pub use config::{CircuitConfig, FleetConfig};
pub use error::{BreakerError, BreakerResult};
pub use events::{FleetEvent, Member};
pub use fleet::FleetCoordinator;
pub use lifecycle::Shutdown;
pub use store::{MemoryStore, Store};
pub use window::{Outcome, WindowMetrics};
