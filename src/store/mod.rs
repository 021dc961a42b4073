//! Shared store subsystem.
//!
//! # Data Flow
//! ```text
//! Circuit / FleetCoordinator
//!     → keys.rs (namespace-scoped key and channel names)
//!     → Store trait (hashes, counters, sets, pub/sub, TTL locks)
//!     → backing implementation (memory.rs in-process, or a networked client)
//! ```
//!
//! # Design Decisions
//! - The store is a capability, not a dependency on a particular client
//! - Every call is an async boundary; callers never hold local locks across it
//! - Counter increments are commutative, so bucket writes need no lock

pub mod keys;
pub mod memory;
pub mod traits;
pub mod types;

pub use keys::Keyspace;
pub use memory::MemoryStore;
pub use traits::{Store, Subscription};
pub use types::{LockHandle, PubSubMessage, StoreError, StoreResult};
