//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → SignerConfig (validated, immutable)
//!     → cloned into the orchestrator, adapters and HTTP server
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::SignerConfig;
pub use schema::{
    BrokerConfig, IndexerConfig, ListenerConfig, NetworkConfig, ObservabilityConfig,
    PostActionConfig, ProviderConfig, ReconcileConfig, StorageConfig,
};
