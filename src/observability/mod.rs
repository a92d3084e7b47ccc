//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Session machine, runtime and adapters produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (`session`, `reference`) on every session log line
//! - Metrics are cheap; with no recorder installed they are no-ops

pub mod logging;
pub mod metrics;
