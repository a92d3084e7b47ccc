//! Metrics collection and exposition.
//!
//! # Metrics
//! - `signer_sessions_started_total` (counter)
//! - `signer_sessions_finished_total` (counter): by outcome
//! - `signer_session_active` (gauge): 1 while a session is in flight
//! - `signer_push_events_total` (counter): by event
//! - `signer_adapter_errors_total` (counter): by adapter
//! - `signer_confirmation_polls_total` (counter)
//! - `signer_confirmation_abandoned_total` (counter)

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_session_started() {
    metrics::counter!("signer_sessions_started_total").increment(1);
}

pub fn record_session_finished(outcome: &'static str) {
    metrics::counter!("signer_sessions_finished_total", "outcome" => outcome).increment(1);
}

pub fn set_session_active(active: bool) {
    metrics::gauge!("signer_session_active").set(if active { 1.0 } else { 0.0 });
}

pub fn record_push_event(event: &'static str) {
    metrics::counter!("signer_push_events_total", "event" => event).increment(1);
}

pub fn record_adapter_error(adapter: &'static str) {
    metrics::counter!("signer_adapter_errors_total", "adapter" => adapter).increment(1);
}

pub fn record_confirmation_poll() {
    metrics::counter!("signer_confirmation_polls_total").increment(1);
}

pub fn record_confirmation_abandoned() {
    metrics::counter!("signer_confirmation_abandoned_total").increment(1);
}
