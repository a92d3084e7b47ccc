//! Signing Session State Machine.
//!
//! # Responsibilities
//! - Hold the single source of truth for the in-flight signing attempt
//! - Gate submission on acknowledgment
//! - Arbitrate between the push channel, the return redirect and user cancel
//! - Drive the post-signature reconciler to a terminal state
//!
//! # Data Flow
//! ```text
//! user action / adapter result
//!     → runtime.rs (serialized inbox)
//!     → machine.rs (pure transition)
//!     → effects.rs (Effect broadcast, Command execution)
//! ```
//!
//! # Design Decisions
//! - At most one session per orchestrator; starting another force-cancels the first
//! - The machine never performs I/O, which keeps every transition unit-testable

pub mod effects;
pub mod machine;
pub mod runtime;
pub mod state;

pub use effects::{Command, Effect, Input, Step, Timer};
pub use machine::{MachineSettings, SessionMachine, SessionSnapshot};
pub use runtime::{Orchestrator, OrchestratorHandle, OrchestratorStopped};
pub use state::{Now, Outcome, PushState, SessionState, SessionTag, SigningSession};
