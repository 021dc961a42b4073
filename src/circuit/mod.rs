//! Circuit subsystem.
//!
//! # Data Flow
//! ```text
//! Caller
//!     → executor.rs (run / call: timeout, outcome classification)
//!     → breaker.rs (record in the window, evaluate, transition)
//!     → state.rs (pure transition rule)
//!     → store (persist state) + pub/sub (replicate to the fleet)
//! ```
//!
//! # Design Decisions
//! - State is recomputed from stored buckets, never accumulated locally
//! - Manual override is orthogonal to the computed state and restorable
//! - Only the first completion of a command counts

pub mod breaker;
pub mod executor;
pub mod state;

pub use breaker::{Circuit, CircuitSnapshot};
pub use executor::{CallError, Completion};
pub use state::CircuitState;
