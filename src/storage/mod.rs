//! Persisted state.
//!
//! The only durable state the orchestrator owns is the user token issued by
//! the wallet provider after a successful login, keyed by provider name.

pub mod token_store;

pub use token_store::TokenStore;
