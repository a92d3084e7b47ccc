//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!
//! Shutdown (shutdown.rs):
//!     Trigger → HTTP server stops accepting → orchestrator aborts session tasks → Exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
