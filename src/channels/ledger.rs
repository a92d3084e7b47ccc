//! Ledger indexer client used by the confirmation poller.
//!
//! - `GET {api}/xrpl/transaction/{hash}` transaction status, 404 when unknown
//! - `GET {api}/v2/statistics/{nftokens|uritokens}/crawler` crawler progress
//!
//! Calls go through a circuit breaker so a dead indexer fails fast while a
//! session is waiting for confirmation.

use std::time::Duration;

use async_trait::async_trait;

use crate::channels::types::{CrawlerStatus, TransactionStatus};
use crate::channels::{check_status, http_client, join_url, LedgerIndex};
use crate::config::IndexerConfig;
use crate::error::{AdapterError, AdapterResult};
use crate::resilience::{with_timeout, CircuitBreaker};

pub struct HttpLedgerIndex {
    client: reqwest::Client,
    api_url: String,
    timeout_secs: u64,
    crawler_path: &'static str,
    breaker: CircuitBreaker,
}

impl HttpLedgerIndex {
    /// Xahau indexes URI tokens; other networks index NFTokens.
    pub fn new(config: &IndexerConfig, xahau: bool) -> AdapterResult<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_url: config.api_url.clone(),
            timeout_secs: config.timeout_secs,
            crawler_path: if xahau {
                "v2/statistics/uritokens/crawler"
            } else {
                "v2/statistics/nftokens/crawler"
            },
            breaker: CircuitBreaker::new(
                "indexer",
                config.failure_threshold,
                Duration::from_secs(config.recovery_secs),
            ),
        })
    }
}

#[async_trait]
impl LedgerIndex for HttpLedgerIndex {
    async fn transaction(&self, hash: &str) -> AdapterResult<Option<TransactionStatus>> {
        let url = join_url(&self.api_url, &format!("xrpl/transaction/{}", hash));
        self.breaker
            .call(with_timeout(self.timeout_secs, async {
                let response = self.client.get(&url).send().await?;
                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Ok::<_, AdapterError>(None);
                }
                let response = check_status(response).await?;
                Ok(Some(response.json::<TransactionStatus>().await?))
            }))
            .await
    }

    async fn crawler_status(&self) -> AdapterResult<CrawlerStatus> {
        let url = join_url(&self.api_url, self.crawler_path);
        self.breaker
            .call(with_timeout(self.timeout_secs, async {
                let response = check_status(self.client.get(&url).send().await?).await?;
                response
                    .json::<CrawlerStatus>()
                    .await
                    .map_err(|e| AdapterError::Decode(e.to_string()))
            }))
            .await
    }
}
