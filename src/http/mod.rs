//! Daemon HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, trace and timeout layers)
//!     → handlers.rs (decode, forward to the orchestrator handle)
//!     → SessionSnapshot as JSON, or a WebSocket stream of effects
//! ```

pub mod handlers;
pub mod server;

pub use server::{AppState, HttpServer};
