//! Channel Adapters.
//!
//! # Responsibilities
//! - Payload submission to the wallet provider (HTTP create / void / fetch)
//! - Push listener for payload status events (websocket)
//! - Confirmation poller against the ledger indexer (transaction + crawler status)
//! - Broker settlement lookups and detached-signature post-processing
//!
//! # Data Flow
//! ```text
//! SignPayload ──▶ WalletProvider::create_payload ──▶ SubmissionReceipt
//!                                                          │ websocket_url
//!                                                          ▼
//!                            PushListener::subscribe ──▶ mpsc::Receiver<PushEvent>
//!
//! txid ──▶ LedgerIndex::transaction ──▶ LedgerIndex::crawler_status (repeated)
//! ```
//!
//! # Design Decisions
//! - Adapters never know about each other or about the session machine
//! - Every call returns `AdapterResult`; nothing panics across the boundary
//! - Traits are object-safe so tests can swap in in-memory fakes

pub mod broker;
pub mod ledger;
pub mod post;
pub mod provider;
pub mod push;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::SignerConfig;
use crate::encoder::SignPayload;
use crate::error::{AdapterError, AdapterResult};
use crate::intent::PostAction;

pub use broker::HttpBrokerLookup;
pub use ledger::HttpLedgerIndex;
pub use post::HttpPostProcessor;
pub use provider::XamanClient;
pub use push::WebSocketListener;
pub use types::{
    CrawlerStatus, PostRequest, PushEvent, SignedResult, SubmissionReceipt, TransactionStatus,
};

/// Wallet-provider backend.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Create a signing payload; returns the session reference and QR/deep link.
    async fn create_payload(&self, payload: &SignPayload) -> AdapterResult<SubmissionReceipt>;

    /// Mark a payload void.
    async fn cancel_payload(&self, reference: &str) -> AdapterResult<()>;

    /// Fetch the signed result for a payload.
    async fn fetch_signed(&self, reference: &str) -> AdapterResult<SignedResult>;
}

/// Push channel for one payload. Dropping the receiver closes the subscription.
#[async_trait]
pub trait PushListener: Send + Sync {
    async fn subscribe(&self, url: &str) -> AdapterResult<mpsc::Receiver<PushEvent>>;
}

/// Ledger/crawler query service.
#[async_trait]
pub trait LedgerIndex: Send + Sync {
    /// `Ok(None)` when the indexer has no record of the transaction.
    async fn transaction(&self, hash: &str) -> AdapterResult<Option<TransactionStatus>>;

    async fn crawler_status(&self) -> AdapterResult<CrawlerStatus>;
}

/// Third-party settlement services.
#[async_trait]
pub trait BrokerLookup: Send + Sync {
    /// Hash of the settlement transaction, `Ok(None)` when there is none
    /// (or the broker is not one this service can query).
    async fn settlement_hash(&self, broker: &str, txid: &str) -> AdapterResult<Option<String>>;
}

/// Local routines consuming a detached signature.
#[async_trait]
pub trait PostProcessor: Send + Sync {
    async fn run(&self, action: PostAction, request: &PostRequest) -> AdapterResult<()>;
}

/// Every collaborator the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub provider: Arc<dyn WalletProvider>,
    pub push: Arc<dyn PushListener>,
    pub ledger: Arc<dyn LedgerIndex>,
    pub broker: Arc<dyn BrokerLookup>,
    pub post: Arc<dyn PostProcessor>,
}

impl Collaborators {
    /// HTTP/websocket adapters configured from `config`.
    pub fn from_config(config: &SignerConfig) -> AdapterResult<Self> {
        Ok(Self {
            provider: Arc::new(XamanClient::new(&config.provider)?),
            push: Arc::new(WebSocketListener::new()),
            ledger: Arc::new(HttpLedgerIndex::new(&config.indexer, config.network.is_xahau())?),
            broker: Arc::new(HttpBrokerLookup::new(&config.broker)?),
            post: Arc::new(HttpPostProcessor::new(&config.post_actions)?),
        })
    }
}

/// Shared reqwest client builder for the HTTP adapters.
pub(crate) fn http_client(timeout_secs: u64) -> AdapterResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("sign-orchestrator/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AdapterError::Http(format!("failed to build HTTP client: {}", e)))
}

/// Join a base URL and a relative path with exactly one slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Map a non-success response to `AdapterError::Status`.
pub(crate) async fn check_status(response: reqwest::Response) -> AdapterResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AdapterError::Status {
        code: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://a/api/", "/payload"), "http://a/api/payload");
        assert_eq!(join_url("http://a/api", "payload/x"), "http://a/api/payload/x");
    }
}
