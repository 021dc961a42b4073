//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Circuits and fleet coordinators produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges via the metrics facade)
//!     → events::Notifier (in-process fleet events for subscribers)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```

pub mod logging;
pub mod metrics;
