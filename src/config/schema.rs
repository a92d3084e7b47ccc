//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the signing
//! orchestrator. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the signing orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SignerConfig {
    /// Listener configuration for the daemon HTTP API.
    pub listener: ListenerConfig,

    /// Wallet-provider backend settings.
    pub provider: ProviderConfig,

    /// Ledger network identity.
    pub network: NetworkConfig,

    /// Ledger/crawler query service.
    pub indexer: IndexerConfig,

    /// Settlement broker lookups.
    pub broker: BrokerConfig,

    /// Detached-signature post-processing routines.
    pub post_actions: PostActionConfig,

    /// Post-signature reconciliation tunables.
    pub reconcile: ReconcileConfig,

    /// Persisted state.
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8787").
    pub bind_address: String,

    /// Request timeout for API calls in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8787".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Wallet-provider backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider name; also the key of the persisted user token.
    pub name: String,

    /// Base URL of the payload API.
    pub api_url: String,

    /// Payload lifetime requested from the provider, in minutes.
    pub expiry_minutes: u32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "xaman".to_string(),
            api_url: "http://localhost:3000/api/app/xumm".to_string(),
            expiry_minutes: 3,
            timeout_secs: 10,
        }
    }
}

/// Network identity used by the payload encoder.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Ledger network id (0 mainnet, 1 testnet, 2 devnet, 21337/21338 Xahau).
    pub network_id: u32,

    /// Originating site URL; its host is written into the memo.
    pub site_url: String,

    /// Base URL the wallet app returns to on mobile devices.
    pub return_url: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            network_id: 0,
            site_url: "https://bithomp.com".to_string(),
            return_url: None,
        }
    }
}

impl NetworkConfig {
    /// Xahau networks index URI tokens instead of NFTokens.
    pub fn is_xahau(&self) -> bool {
        matches!(self.network_id, 21337 | 21338)
    }
}

/// Ledger/crawler query service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Base URL of the query API.
    pub api_url: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before a probe.
    pub recovery_secs: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            api_url: "https://bithomp.com/api".to_string(),
            timeout_secs: 10,
            failure_threshold: 5,
            recovery_secs: 10,
        }
    }
}

/// Broker settlement lookup configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Base URL of the broker lookup API.
    pub api_url: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            api_url: "https://bithomp.com/api".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Post-processing routines for detached signatures.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PostActionConfig {
    /// Base URL of the routines API.
    pub api_url: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for PostActionConfig {
    fn default() -> Self {
        Self {
            api_url: "https://bithomp.com/api".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Reconciliation timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Delay between crawler polls in milliseconds.
    pub crawler_poll_interval_ms: u64,

    /// Crawler lag (in ledgers) beyond which direct ledger data is trusted.
    pub crawler_lag_threshold: u64,

    /// Delay before finishing when settlement cannot be verified, in milliseconds.
    pub settle_delay_ms: u64,

    /// Give up on confirmation after this many seconds.
    pub max_confirmation_secs: u64,

    /// Base delay for retrying failed polls in milliseconds.
    pub error_backoff_base_ms: u64,

    /// Maximum delay for retrying failed polls in milliseconds.
    pub error_backoff_max_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            crawler_poll_interval_ms: 1000,
            crawler_lag_threshold: 10,
            settle_delay_ms: 3000,
            max_confirmation_secs: 300,
            error_backoff_base_ms: 1000,
            error_backoff_max_ms: 10_000,
        }
    }
}

/// Persisted state configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the user-token file. `None` keeps tokens in memory only.
    pub token_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            token_path: Some("signer_tokens.json".to_string()),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SignerConfig::default();
        assert_eq!(config.provider.expiry_minutes, 3);
        assert_eq!(config.reconcile.crawler_lag_threshold, 10);
        assert_eq!(config.reconcile.crawler_poll_interval_ms, 1000);
        assert!(!config.network.is_xahau());
    }

    #[test]
    fn test_partial_toml() {
        let config: SignerConfig = toml::from_str(
            r#"
            [network]
            network_id = 21337

            [reconcile]
            crawler_lag_threshold = 20
            "#,
        )
        .unwrap();
        assert!(config.network.is_xahau());
        assert_eq!(config.reconcile.crawler_lag_threshold, 20);
        assert_eq!(config.reconcile.settle_delay_ms, 3000);
        assert_eq!(config.provider.name, "xaman");
    }
}
