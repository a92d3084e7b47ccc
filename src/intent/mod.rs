//! Sign intents and the user input that completes them.
//!
//! # Responsibilities
//! - Classify a sign request into an `IntentKind`
//! - Decide whether a consent screen is required
//! - Validate acknowledgment input and amend the intent
//!
//! # Data Flow
//! ```text
//! SignRequest ──▶ SignIntent ──▶ AcknowledgmentState::apply ──▶ amended SignIntent
//!                                         │
//!                                         ▼
//!                              AcknowledgmentState::finalize ──▶ Payload Encoder
//! ```

pub mod acknowledgment;
pub mod address;
pub mod hook;
pub mod types;

pub use acknowledgment::{AckInput, AcknowledgmentState};
pub use types::{
    IntentData, IntentKind, PostAction, SignIntent, SignRequest, TxJson, VoteTopic,
    LOGIN_TRANSACTION_TYPE, OBJECT_CALLBACK_ENTRY, OBJECT_REDIRECT,
};
