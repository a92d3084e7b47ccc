//! Post-Signature Reconciler.
//!
//! Decides what a signed result still needs before the session can finish.
//! The reconciler performs no I/O: every step returns `Directive`s which the
//! session machine turns into effects and adapter commands, and adapter
//! results are fed back through the `on_*` methods.
//!
//! # Decision Order
//! ```text
//! detached signature ──▶ RunPostAction ──▶ Finish (now or after settle delay)
//! account, no broker ──▶ PersistIdentity ──▶ Navigate + Finish   (nfts / account)
//!                                       └──▶ fall through
//! broker             ──▶ QueryBroker ──▶ FetchTransaction(settlement hash)
//!                                   └──▶ Finish after settle delay
//! NFT operation      ──▶ FetchTransaction ──▶ PollCrawler … ──▶ Finish
//! anything else      ──▶ Finish
//! ```
//!
//! # Design Decisions
//! - One `ConfirmationWait` per reconciliation; poll results update it in place
//! - Crawler errors are retried with exponential backoff, never surfaced
//! - Confirmation is abandoned after `max_confirmation` and treated as success

pub mod confirmation;

use std::time::Duration;

use tokio::time::Instant;

use crate::channels::{CrawlerStatus, PostRequest, SignedResult, TransactionStatus};
use crate::config::SignerConfig;
use crate::encoder::MetaBlob;
use crate::error::{AdapterError, AdapterResult};
use crate::intent::{PostAction, OBJECT_CALLBACK_ENTRY, OBJECT_REDIRECT};
use crate::observability::metrics;
use crate::resilience::Backoff;

pub use confirmation::ConfirmationWait;

/// Timing and identity settings for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub poll_interval: Duration,
    /// Crawler lag (in ledgers) beyond which direct ledger data is trusted.
    pub lag_threshold: u64,
    pub settle_delay: Duration,
    pub max_confirmation: Duration,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub site_url: String,
    /// Wallet kind recorded with the persisted identity.
    pub wallet: String,
}

impl ReconcileSettings {
    pub fn from_config(config: &SignerConfig) -> Self {
        let reconcile = &config.reconcile;
        Self {
            poll_interval: Duration::from_millis(reconcile.crawler_poll_interval_ms),
            lag_threshold: reconcile.crawler_lag_threshold,
            settle_delay: Duration::from_millis(reconcile.settle_delay_ms),
            max_confirmation: Duration::from_secs(reconcile.max_confirmation_secs),
            backoff_base_ms: reconcile.error_backoff_base_ms,
            backoff_max_ms: reconcile.error_backoff_max_ms,
            site_url: config.network.site_url.clone(),
            wallet: config.provider.name.clone(),
        }
    }
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self::from_config(&SignerConfig::default())
    }
}

/// Next step requested by the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Status(String),
    PersistIdentity { address: String, wallet: String },
    Navigate(String),
    ObjectResolved(String),
    RunPostAction { action: PostAction, request: PostRequest },
    QueryBroker { broker: String, txid: String },
    FetchTransaction { hash: String },
    PollCrawler { after: Option<Duration> },
    Finish { after: Option<Duration> },
    Fail(AdapterError),
}

pub struct Reconciler {
    settings: ReconcileSettings,
    blob: MetaBlob,
    object_callback: Option<String>,
    post_action: Option<PostAction>,
    wait: Option<ConfirmationWait>,
    backoff: Backoff,
}

impl Reconciler {
    /// `blob` is the metadata carried from the submission; `object_callback`
    /// names the ledger entry type to report once confirmed.
    pub fn new(settings: ReconcileSettings, blob: MetaBlob, object_callback: Option<String>) -> Self {
        let object_callback = object_callback.or_else(|| {
            (blob.redirect.as_deref() == Some(OBJECT_REDIRECT)).then(|| OBJECT_CALLBACK_ENTRY.to_string())
        });
        let backoff = Backoff::new(settings.backoff_base_ms, settings.backoff_max_ms);
        Self {
            settings,
            blob,
            object_callback,
            post_action: None,
            wait: None,
            backoff,
        }
    }

    pub fn confirmation(&self) -> Option<&ConfirmationWait> {
        self.wait.as_ref()
    }

    pub fn begin(&mut self, signed: &SignedResult) -> Vec<Directive> {
        if self.blob.is_sign_only() {
            return self.begin_detached(signed);
        }

        let mut out = Vec::new();
        let txid = signed.response.txid.clone().filter(|t| !t.is_empty());

        if let Some(account) = signed.response.account.clone() {
            if self.blob.broker.is_none() {
                out.push(Directive::PersistIdentity {
                    address: account.clone(),
                    wallet: self.settings.wallet.clone(),
                });
                let target = match self.blob.redirect.as_deref() {
                    Some("nfts") => Some(format!("/nfts/{}", account)),
                    Some("account") => Some(format!(
                        "{}/explorer/{}",
                        self.settings.site_url.trim_end_matches('/'),
                        account
                    )),
                    _ => None,
                };
                if let Some(target) = target {
                    out.push(Directive::Navigate(target));
                    out.push(Directive::Finish { after: None });
                    return out;
                }
            }
        }

        if let Some(broker) = self.blob.broker.clone() {
            out.push(Directive::Status(format!("Waiting for {} to settle the offer", broker)));
            match txid {
                Some(txid) => out.push(Directive::QueryBroker { broker, txid }),
                None => out.push(self.settle()),
            }
            return out;
        }

        if signed.is_nft_operation() {
            out.push(awaiting_indexer());
            match txid {
                Some(hash) => out.push(Directive::FetchTransaction { hash }),
                None => out.push(self.settle()),
            }
            return out;
        }

        out.push(Directive::Finish { after: None });
        out
    }

    fn begin_detached(&mut self, signed: &SignedResult) -> Vec<Directive> {
        let Some(action) = self.blob.action().and_then(PostAction::parse) else {
            tracing::debug!(action = ?self.blob.action(), "Detached signature without a post action");
            return vec![Directive::Finish { after: None }];
        };
        let Some(blob) = signed.response.hex.clone() else {
            return vec![Directive::Fail(AdapterError::Decode(
                "signed result without a signature blob".to_string(),
            ))];
        };

        let request = match action {
            PostAction::ProAddAddress => {
                let data = self.blob.data.clone().unwrap_or_default();
                PostRequest {
                    address: data.address,
                    name: data.name,
                    blob,
                }
            }
            PostAction::SetAvatar => PostRequest {
                address: signed.response.account.clone(),
                name: None,
                blob,
            },
        };
        self.post_action = Some(action);
        vec![Directive::RunPostAction { action, request }]
    }

    pub fn on_post_action(&mut self, result: AdapterResult<()>) -> Vec<Directive> {
        match result {
            Ok(()) => {
                let delayed = self.post_action.map(|a| a.needs_settle_delay()).unwrap_or(false);
                if delayed {
                    vec![self.settle()]
                } else {
                    vec![Directive::Finish { after: None }]
                }
            }
            Err(e) => vec![Directive::Fail(e)],
        }
    }

    pub fn on_broker(&mut self, result: AdapterResult<Option<String>>) -> Vec<Directive> {
        let broker = self.blob.broker.clone().unwrap_or_default();
        match result {
            Ok(Some(hash)) => {
                tracing::debug!(broker = %broker, hash = %hash, "Broker settlement found");
                vec![awaiting_indexer(), Directive::FetchTransaction { hash }]
            }
            Ok(None) => {
                tracing::warn!(broker = %broker, "Broker reported no settlement");
                vec![
                    Directive::Status(format!("{} has not settled the offer yet", broker)),
                    self.settle(),
                ]
            }
            Err(e) => {
                tracing::warn!(broker = %broker, error = %e, "Broker lookup failed");
                vec![
                    Directive::Status(format!("Failed to get a response from {}", broker)),
                    self.settle(),
                ]
            }
        }
    }

    pub fn on_transaction(
        &mut self,
        hash: &str,
        result: AdapterResult<Option<TransactionStatus>>,
        now: Instant,
    ) -> Vec<Directive> {
        let tx = match result {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                tracing::debug!(hash = %hash, "Transaction unknown to the indexer");
                return vec![self.settle()];
            }
            Err(e) => {
                tracing::warn!(hash = %hash, error = %e, "Transaction lookup failed");
                return vec![self.settle()];
            }
        };

        let sequence = match tx.included_ledger() {
            Some(sequence) if tx.validated => sequence,
            _ => {
                tracing::debug!(hash = %hash, "Transaction not validated yet");
                return vec![self.settle()];
            }
        };

        let object_id = self
            .object_callback
            .as_deref()
            .and_then(|entry| tx.first_created(entry));
        if self.object_callback.is_some() && object_id.is_none() {
            tracing::debug!(hash = %hash, "Transaction created no matching ledger object");
        }

        self.wait = Some(ConfirmationWait::new(hash, sequence, object_id, now));
        vec![Directive::PollCrawler { after: None }]
    }

    pub fn on_crawler(&mut self, result: AdapterResult<CrawlerStatus>, now: Instant) -> Vec<Directive> {
        let threshold = self.settings.lag_threshold;
        let Some(wait) = self.wait.as_mut() else {
            return Vec::new();
        };

        let retry_after = match result {
            Ok(status) => {
                wait.poll_attempts += 1;
                wait.consecutive_errors = 0;
                wait.last_crawler_sequence = Some(status.ledger_index);
                self.backoff.reset();

                if wait.is_confirmed(status.ledger_index, threshold) {
                    tracing::debug!(
                        hash = %wait.reference_hash,
                        included = wait.observed_ledger_sequence,
                        crawler = status.ledger_index,
                        polls = wait.poll_attempts,
                        "Transaction confirmed by crawler"
                    );
                    let object_id = wait.object_id.clone();
                    self.wait = None;
                    let mut out = Vec::new();
                    if let Some(object_id) = object_id {
                        out.push(Directive::ObjectResolved(object_id));
                    }
                    out.push(Directive::Finish { after: None });
                    return out;
                }
                self.settings.poll_interval
            }
            Err(e) => {
                wait.consecutive_errors += 1;
                tracing::warn!(
                    hash = %wait.reference_hash,
                    errors = wait.consecutive_errors,
                    error = %e,
                    "Crawler status poll failed"
                );
                self.backoff.next_delay()
            }
        };

        if wait.elapsed(now) >= self.settings.max_confirmation {
            tracing::warn!(
                hash = %wait.reference_hash,
                polls = wait.poll_attempts,
                "Giving up on crawler confirmation"
            );
            self.wait = None;
            metrics::record_confirmation_abandoned();
            return vec![
                Directive::Status(
                    "The indexer has not caught up yet, check back later".to_string(),
                ),
                Directive::Finish { after: None },
            ];
        }

        vec![Directive::PollCrawler {
            after: Some(retry_after),
        }]
    }

    fn settle(&self) -> Directive {
        Directive::Finish {
            after: Some(self.settings.settle_delay),
        }
    }
}

fn awaiting_indexer() -> Directive {
    Directive::Status("Waiting for the indexer to confirm the transaction".to_string())
}
