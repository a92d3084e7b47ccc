//! Ledger confirmation wait.
//!
//! Created once per reconciliation when the result needs the crawler to catch
//! up with the ledger the transaction was included in. Every poll, successful
//! or not, updates the same record.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationWait {
    /// Transaction being confirmed (the settlement hash for broker flows).
    pub reference_hash: String,
    /// Ledger sequence the transaction was included in.
    pub observed_ledger_sequence: u64,
    pub poll_attempts: u32,
    pub consecutive_errors: u32,
    pub last_crawler_sequence: Option<u64>,
    /// Ledger object the transaction created, reported once confirmed.
    pub object_id: Option<String>,
    pub started_at: Instant,
}

impl ConfirmationWait {
    pub fn new(
        reference_hash: impl Into<String>,
        observed_ledger_sequence: u64,
        object_id: Option<String>,
        started_at: Instant,
    ) -> Self {
        Self {
            reference_hash: reference_hash.into(),
            observed_ledger_sequence,
            poll_attempts: 0,
            consecutive_errors: 0,
            last_crawler_sequence: None,
            object_id,
            started_at,
        }
    }

    /// The crawler has caught up, or lags so far behind that the indexer
    /// answers from the ledger directly.
    pub fn is_confirmed(&self, crawler_sequence: u64, lag_threshold: u64) -> bool {
        crawler_sequence >= self.observed_ledger_sequence
            || self.observed_ledger_sequence > crawler_sequence.saturating_add(lag_threshold)
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }
}
