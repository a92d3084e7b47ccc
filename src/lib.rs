//! Transaction signing orchestrator.
//!
//! Drives a sign intent from a dApp page to a terminal outcome: acknowledgment,
//! payload submission to the wallet provider, push/redirect arbitration and
//! post-signature reconciliation against the ledger indexer.

pub mod channels;
pub mod config;
pub mod encoder;
pub mod error;
pub mod http;
pub mod intent;
pub mod lifecycle;
pub mod observability;
pub mod reconcile;
pub mod resilience;
pub mod session;
pub mod storage;

pub use config::SignerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use session::{Orchestrator, OrchestratorHandle};
