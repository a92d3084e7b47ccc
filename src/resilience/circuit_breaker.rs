//! Circuit breaker for collaborator protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: collaborator assumed down, calls fail fast
//! - Half-Open: a single probe is let through
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: after the recovery period
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails
//! ```
//!
//! # Design Decisions
//! - One breaker per collaborator (not global)
//! - Only transport errors, timeouts and 5xx count as failures; a 404 is an answer
//! - Single probe in Half-Open (prevents hammering a recovering service)
//! - A call dropped before it resolves (its task was aborted) releases the
//!   probe slot without recording an outcome

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::{AdapterError, AdapterResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum Inner {
    Closed { failures: u32 },
    Open { until: Instant },
    HalfOpen { probing: bool },
}

pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            recovery,
            inner: Mutex::new(Inner::Closed { failures: 0 }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> CircuitState {
        match *self.lock() {
            Inner::Closed { .. } => CircuitState::Closed,
            Inner::Open { .. } => CircuitState::Open,
            Inner::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Whether a call may proceed now.
    pub fn allow(&self) -> bool {
        self.admit().is_some()
    }

    /// `Some(true)` when the admitted call is the half-open probe.
    fn admit(&self) -> Option<bool> {
        let mut inner = self.lock();
        match *inner {
            Inner::Closed { .. } => Some(false),
            Inner::HalfOpen { probing: true } => None,
            Inner::HalfOpen { probing: false } => {
                *inner = Inner::HalfOpen { probing: true };
                Some(true)
            }
            Inner::Open { until } => {
                if Instant::now() < until {
                    None
                } else {
                    tracing::info!(circuit = %self.name, "Circuit half-open, probing");
                    *inner = Inner::HalfOpen { probing: true };
                    Some(true)
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if matches!(*inner, Inner::HalfOpen { .. }) {
            tracing::info!(circuit = %self.name, "Circuit closed");
        }
        *inner = Inner::Closed { failures: 0 };
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match *inner {
            Inner::Closed { failures } => {
                let failures = failures.saturating_add(1);
                if failures >= self.failure_threshold {
                    tracing::warn!(circuit = %self.name, failures, "Circuit opened");
                    *inner = Inner::Open {
                        until: Instant::now() + self.recovery,
                    };
                } else {
                    *inner = Inner::Closed { failures };
                }
            }
            Inner::HalfOpen { .. } => {
                tracing::warn!(circuit = %self.name, "Probe failed, circuit re-opened");
                *inner = Inner::Open {
                    until: Instant::now() + self.recovery,
                };
            }
            Inner::Open { .. } => {}
        }
    }

    /// Give back the half-open probe slot of a call that never finished.
    fn release_probe(&self) {
        let mut inner = self.lock();
        if let Inner::HalfOpen { probing: true } = *inner {
            tracing::debug!(circuit = %self.name, "Probe abandoned");
            *inner = Inner::HalfOpen { probing: false };
        }
    }

    /// Run `fut` through the breaker.
    pub async fn call<T, F>(&self, fut: F) -> AdapterResult<T>
    where
        F: Future<Output = AdapterResult<T>>,
    {
        let Some(probe) = self.admit() else {
            return Err(AdapterError::CircuitOpen(self.name.clone()));
        };
        let guard = probe.then(|| ProbeGuard { breaker: self });
        let result = fut.await;
        std::mem::forget(guard);
        match &result {
            Err(err) if counts_as_failure(err) => self.record_failure(),
            _ => self.record_success(),
        }
        result
    }
}

/// Held across the probe call; dropping it means the probe was cancelled.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.breaker.release_probe();
    }
}

fn counts_as_failure(err: &AdapterError) -> bool {
    match err {
        AdapterError::Http(_) | AdapterError::Timeout(_) => true,
        AdapterError::Status { code, .. } => *code >= 500,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing() -> impl Future<Output = AdapterResult<()>> {
        async { Err(AdapterError::Http("connection refused".into())) }
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new("indexer", 3, Duration::from_secs(10));
        for _ in 0..3 {
            let _ = breaker.call(failing()).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = breaker.call(async { Ok(()) }).await.unwrap_err();
        assert_eq!(err, AdapterError::CircuitOpen("indexer".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe() {
        let breaker = CircuitBreaker::new("indexer", 1, Duration::from_secs(10));
        let _ = breaker.call(failing()).await;
        assert!(!breaker.allow());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(breaker.allow());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(!breaker.allow());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_reopens() {
        let breaker = CircuitBreaker::new("indexer", 1, Duration::from_secs(10));
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(11)).await;
        let _ = breaker.call(failing()).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_probe_frees_slot() {
        let breaker = CircuitBreaker::new("indexer", 1, Duration::from_secs(10));
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(11)).await;

        let stalled = breaker.call(std::future::pending::<AdapterResult<()>>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), stalled).await;
        assert!(timed_out.is_err());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let result = breaker.call(async { Ok(()) }).await;
        assert_eq!(result, Ok(()));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_client_errors_do_not_trip() {
        let breaker = CircuitBreaker::new("indexer", 1, Duration::from_secs(10));
        let _ = breaker
            .call(async {
                Err::<(), _>(AdapterError::Status {
                    code: 404,
                    body: String::new(),
                })
            })
            .await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
