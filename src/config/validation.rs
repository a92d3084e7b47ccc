//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, thresholds > 0)
//! - Check URLs and socket addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SignerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use crate::config::schema::SignerConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &SignerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut push = |field: &str, message: &str| {
        errors.push(ValidationError {
            field: field.to_string(),
            message: message.to_string(),
        });
    };

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        push("listener.bind_address", "not a socket address");
    }
    if config.listener.request_timeout_secs == 0 {
        push("listener.request_timeout_secs", "must be greater than 0");
    }

    if config.provider.name.trim().is_empty() {
        push("provider.name", "must not be empty");
    }
    if config.provider.expiry_minutes == 0 {
        push("provider.expiry_minutes", "must be greater than 0");
    }

    let urls = [
        ("provider.api_url", &config.provider.api_url),
        ("network.site_url", &config.network.site_url),
        ("indexer.api_url", &config.indexer.api_url),
        ("broker.api_url", &config.broker.api_url),
        ("post_actions.api_url", &config.post_actions.api_url),
    ];
    for (field, value) in urls {
        if url::Url::parse(value).is_err() {
            push(field, "not a valid URL");
        }
    }
    if let Some(return_url) = &config.network.return_url {
        if url::Url::parse(return_url).is_err() {
            push("network.return_url", "not a valid URL");
        }
    }

    let timeouts = [
        ("provider.timeout_secs", config.provider.timeout_secs),
        ("indexer.timeout_secs", config.indexer.timeout_secs),
        ("broker.timeout_secs", config.broker.timeout_secs),
        ("post_actions.timeout_secs", config.post_actions.timeout_secs),
    ];
    for (field, value) in timeouts {
        if value == 0 {
            push(field, "must be greater than 0");
        }
    }
    if config.indexer.failure_threshold == 0 {
        push("indexer.failure_threshold", "must be greater than 0");
    }

    let reconcile = &config.reconcile;
    if reconcile.crawler_poll_interval_ms == 0 {
        push("reconcile.crawler_poll_interval_ms", "must be greater than 0");
    }
    if reconcile.max_confirmation_secs == 0 {
        push("reconcile.max_confirmation_secs", "must be greater than 0");
    }
    if reconcile.error_backoff_base_ms > reconcile.error_backoff_max_ms {
        push("reconcile.error_backoff_base_ms", "must not exceed error_backoff_max_ms");
    }

    match config.observability.log_format.as_str() {
        "pretty" | "json" => {}
        _ => push("observability.log_format", "must be \"pretty\" or \"json\""),
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        push("observability.metrics_address", "not a socket address");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&SignerConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = SignerConfig::default();
        config.provider.api_url = "not a url".to_string();
        config.reconcile.crawler_poll_interval_ms = 0;
        config.observability.log_format = "xml".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.field == "provider.api_url"));
        assert!(errors.iter().any(|e| e.field == "reconcile.crawler_poll_interval_ms"));
        assert!(errors.iter().any(|e| e.field == "observability.log_format"));
    }

    #[test]
    fn test_backoff_bounds() {
        let mut config = SignerConfig::default();
        config.reconcile.error_backoff_base_ms = 20_000;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "reconcile.error_backoff_base_ms");
    }
}
