//! Session state and transition rules.

use std::fmt;

use serde::Serialize;
use tokio::time::Instant;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Rejected,
    Expired,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Rejected => "rejected",
            Outcome::Expired => "expired",
            Outcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "state", content = "outcome", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingAcknowledgment,
    Submitting,
    AwaitingSignature,
    Reconciling,
    Terminal(Outcome),
}

impl SessionState {
    /// Edges allowed by the session lifecycle. Any state may return to `Idle`.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (_, Idle) => true,
            (Idle, AwaitingAcknowledgment | Submitting | AwaitingSignature) => true,
            (AwaitingAcknowledgment, Submitting) => true,
            (Submitting, AwaitingSignature | Terminal(Outcome::Failed)) => true,
            (
                AwaitingSignature,
                Reconciling | Terminal(Outcome::Rejected | Outcome::Expired | Outcome::Failed),
            ) => true,
            (Reconciling, Terminal(Outcome::Success | Outcome::Failed)) => true,
            _ => false,
        }
    }

    /// A session in this state holds external resources.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::AwaitingAcknowledgment
                | SessionState::Submitting
                | SessionState::AwaitingSignature
                | SessionState::Reconciling
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::AwaitingAcknowledgment => write!(f, "awaiting_acknowledgment"),
            SessionState::Submitting => write!(f, "submitting"),
            SessionState::AwaitingSignature => write!(f, "awaiting_signature"),
            SessionState::Reconciling => write!(f, "reconciling"),
            SessionState::Terminal(outcome) => write!(f, "terminal({})", outcome.as_str()),
        }
    }
}

/// Identifies one signing attempt. Results carrying an older tag are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionTag(pub u64);

impl SessionTag {
    pub fn next(self) -> SessionTag {
        SessionTag(self.0 + 1)
    }
}

impl fmt::Display for SessionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushState {
    Open,
    Closed,
}

/// The one signing attempt owned by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SigningSession {
    pub tag: SessionTag,
    /// Reference issued by the wallet provider; absent before submission.
    pub reference: Option<String>,
    pub state: SessionState,
    pub qr_image: Option<String>,
    pub deep_link: Option<String>,
    /// Unix milliseconds, from the push channel's expiry heartbeat.
    pub expires_at: Option<u64>,
    pub last_status: Option<String>,
    pub push: PushState,
    pub qr_expired: bool,
    /// Error text for `Terminal(Failed)` and friends.
    pub error: Option<String>,
}

impl SigningSession {
    pub fn new(tag: SessionTag) -> Self {
        Self {
            tag,
            reference: None,
            state: SessionState::Idle,
            qr_image: None,
            deep_link: None,
            expires_at: None,
            last_status: None,
            push: PushState::Closed,
            qr_expired: false,
            error: None,
        }
    }
}

/// Clock reading handed to the machine with every input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Now {
    pub instant: Instant,
    pub unix_ms: u64,
}

impl Now {
    pub fn current() -> Self {
        let unix_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            instant: Instant::now(),
            unix_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_edges() {
        use SessionState::*;
        assert!(Idle.can_transition_to(AwaitingAcknowledgment));
        assert!(Idle.can_transition_to(Submitting));
        assert!(AwaitingAcknowledgment.can_transition_to(Submitting));
        assert!(Submitting.can_transition_to(AwaitingSignature));
        assert!(AwaitingSignature.can_transition_to(Terminal(Outcome::Expired)));
        assert!(Reconciling.can_transition_to(Terminal(Outcome::Success)));
        assert!(Terminal(Outcome::Expired).can_transition_to(Idle));
    }

    #[test]
    fn test_no_backward_edges() {
        use SessionState::*;
        assert!(!AwaitingSignature.can_transition_to(Submitting));
        assert!(!Reconciling.can_transition_to(AwaitingSignature));
        assert!(!Submitting.can_transition_to(Reconciling));
        assert!(!AwaitingAcknowledgment.can_transition_to(AwaitingSignature));
        assert!(!Reconciling.can_transition_to(Terminal(Outcome::Rejected)));
        assert!(!Terminal(Outcome::Success).can_transition_to(Submitting));
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(SessionState::Terminal(Outcome::Expired)).unwrap();
        assert_eq!(json, serde_json::json!({"state": "terminal", "outcome": "expired"}));
        let json = serde_json::to_value(SessionState::Idle).unwrap();
        assert_eq!(json, serde_json::json!({"state": "idle"}));
    }
}
