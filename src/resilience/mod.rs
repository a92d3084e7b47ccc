//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a collaborator:
//!     → circuit_breaker.rs (fail fast while the collaborator is known to be down)
//!     → timeouts.rs (every outbound call has a deadline)
//!     → On failure of a non-critical poll: backoff.rs (delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Only confirmation polls are retried; submissions never are
//! - Circuit breaker keeps a dead indexer from being hammered once a second

pub mod backoff;
pub mod circuit_breaker;
pub mod timeouts;

pub use backoff::{calculate_backoff, Backoff};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use timeouts::with_timeout;
