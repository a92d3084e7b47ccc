//! Shared fakes and helpers for the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use sign_orchestrator::channels::{
    BrokerLookup, Collaborators, CrawlerStatus, LedgerIndex, PostProcessor, PostRequest, PushEvent,
    PushListener, SignedResult, SubmissionReceipt, TransactionStatus, WalletProvider,
};
use sign_orchestrator::encoder::SignPayload;
use sign_orchestrator::error::{AdapterError, AdapterResult};
use sign_orchestrator::intent::PostAction;
use sign_orchestrator::session::{
    Effect, MachineSettings, Orchestrator, OrchestratorHandle, SessionSnapshot,
};
use sign_orchestrator::storage::TokenStore;
use sign_orchestrator::Shutdown;

/// Wallet provider issuing `ref-1`, `ref-2`, ...
#[derive(Default)]
pub struct FakeProvider {
    counter: AtomicU32,
    pub created: Mutex<Vec<SignPayload>>,
    pub voided: Mutex<Vec<String>>,
    pub signed: Mutex<HashMap<String, SignedResult>>,
    pub create_error: Mutex<Option<AdapterError>>,
    pub pushed: bool,
}

impl FakeProvider {
    pub fn reference(n: u32) -> String {
        format!("ref-{}", n)
    }

    pub fn push_url(reference: &str) -> String {
        format!("wss://push.test/{}", reference)
    }

    pub fn sign(&self, reference: &str, result: SignedResult) {
        self.signed.lock().unwrap().insert(reference.to_string(), result);
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn voided(&self) -> Vec<String> {
        self.voided.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletProvider for FakeProvider {
    async fn create_payload(&self, payload: &SignPayload) -> AdapterResult<SubmissionReceipt> {
        if let Some(error) = self.create_error.lock().unwrap().clone() {
            return Err(error);
        }
        self.created.lock().unwrap().push(payload.clone());
        let reference = Self::reference(self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        Ok(SubmissionReceipt {
            qr_image_url: Some(format!("https://qr.test/{}.png", reference)),
            deep_link_url: Some(format!("https://wallet.test/sign/{}", reference)),
            websocket_url: Some(Self::push_url(&reference)),
            pushed: self.pushed,
            reference,
        })
    }

    async fn cancel_payload(&self, reference: &str) -> AdapterResult<()> {
        self.voided.lock().unwrap().push(reference.to_string());
        Ok(())
    }

    async fn fetch_signed(&self, reference: &str) -> AdapterResult<SignedResult> {
        Ok(self
            .signed
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .unwrap_or_default())
    }
}

/// Push listener whose channels are driven by the test.
#[derive(Default)]
pub struct FakePush {
    senders: Mutex<HashMap<String, mpsc::Sender<PushEvent>>>,
}

impl FakePush {
    /// Wait until the orchestrator subscribed to `url`.
    pub async fn sender(&self, url: &str) -> mpsc::Sender<PushEvent> {
        for _ in 0..500 {
            let found = self.senders.lock().unwrap().get(url).cloned();
            if let Some(tx) = found {
                return tx;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no push subscription for {}", url);
    }

    pub async fn send(&self, url: &str, event: PushEvent) {
        self.sender(url).await.send(event).await.unwrap();
    }

    /// Drop the sending side, closing the channel.
    pub fn close(&self, url: &str) {
        self.senders.lock().unwrap().remove(url);
    }
}

#[async_trait]
impl PushListener for FakePush {
    async fn subscribe(&self, url: &str) -> AdapterResult<mpsc::Receiver<PushEvent>> {
        let (tx, rx) = mpsc::channel(16);
        self.senders.lock().unwrap().insert(url.to_string(), tx);
        Ok(rx)
    }
}

/// Indexer with a settable crawler position.
#[derive(Default)]
pub struct FakeLedger {
    pub transactions: Mutex<HashMap<String, TransactionStatus>>,
    pub crawler: AtomicU64,
    pub crawler_polls: AtomicU32,
    /// Number of upcoming crawler polls that fail.
    pub crawler_failures: AtomicU32,
}

impl FakeLedger {
    pub fn insert(&self, hash: &str, status: TransactionStatus) {
        self.transactions.lock().unwrap().insert(hash.to_string(), status);
    }

    pub fn set_crawler(&self, ledger_index: u64) {
        self.crawler.store(ledger_index, Ordering::SeqCst);
    }

    pub fn polls(&self) -> u32 {
        self.crawler_polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerIndex for FakeLedger {
    async fn transaction(&self, hash: &str) -> AdapterResult<Option<TransactionStatus>> {
        Ok(self.transactions.lock().unwrap().get(hash).cloned())
    }

    async fn crawler_status(&self) -> AdapterResult<CrawlerStatus> {
        self.crawler_polls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .crawler_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AdapterError::Status {
                code: 502,
                body: "bad gateway".into(),
            });
        }
        Ok(CrawlerStatus {
            ledger_index: self.crawler.load(Ordering::SeqCst),
        })
    }
}

#[derive(Default)]
pub struct FakeBroker {
    pub settlement: Mutex<Option<String>>,
    pub queries: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl BrokerLookup for FakeBroker {
    async fn settlement_hash(&self, broker: &str, txid: &str) -> AdapterResult<Option<String>> {
        self.queries
            .lock()
            .unwrap()
            .push((broker.to_string(), txid.to_string()));
        Ok(self.settlement.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakePost {
    pub calls: Mutex<Vec<(PostAction, PostRequest)>>,
    pub error: Mutex<Option<AdapterError>>,
}

#[async_trait]
impl PostProcessor for FakePost {
    async fn run(&self, action: PostAction, request: &PostRequest) -> AdapterResult<()> {
        self.calls.lock().unwrap().push((action, request.clone()));
        match self.error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Orchestrator wired to in-memory fakes.
pub struct Harness {
    pub handle: OrchestratorHandle,
    pub task: JoinHandle<()>,
    pub shutdown: Shutdown,
    pub effects: broadcast::Receiver<Effect>,
    pub provider: Arc<FakeProvider>,
    pub push: Arc<FakePush>,
    pub ledger: Arc<FakeLedger>,
    pub broker: Arc<FakeBroker>,
    pub post: Arc<FakePost>,
    pub tokens: TokenStore,
}

impl Harness {
    pub fn spawn() -> Self {
        Self::spawn_with(FakeProvider::default(), TokenStore::new(None))
    }

    pub fn spawn_with(provider: FakeProvider, tokens: TokenStore) -> Self {
        let provider = Arc::new(provider);
        let push = Arc::new(FakePush::default());
        let ledger = Arc::new(FakeLedger::default());
        let broker = Arc::new(FakeBroker::default());
        let post = Arc::new(FakePost::default());
        let collaborators = Collaborators {
            provider: provider.clone(),
            push: push.clone(),
            ledger: ledger.clone(),
            broker: broker.clone(),
            post: post.clone(),
        };

        let shutdown = Shutdown::new();
        let (handle, task) = Orchestrator::spawn(
            MachineSettings::default(),
            collaborators,
            tokens.clone(),
            shutdown.subscribe(),
        );
        let effects = handle.subscribe();

        Self {
            handle,
            task,
            shutdown,
            effects,
            provider,
            push,
            ledger,
            broker,
            post,
            tokens,
        }
    }

    /// Poll snapshots until `pred` holds.
    pub async fn wait_for(&self, pred: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
        wait_for(&self.handle, pred).await
    }

    /// Effects broadcast so far.
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        let mut out = Vec::new();
        while let Ok(effect) = self.effects.try_recv() {
            out.push(effect);
        }
        out
    }
}

/// Poll snapshots every 10ms (60s budget) until `pred` holds.
pub async fn wait_for(
    handle: &OrchestratorHandle,
    pred: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut last = None;
    for _ in 0..6000 {
        let snapshot = handle.snapshot().await.unwrap();
        if pred(&snapshot) {
            return snapshot;
        }
        last = Some(snapshot);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached, last snapshot: {:?}", last);
}

/// Serve `router` on an ephemeral port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Run `f` with a fresh temp file path that is removed afterwards.
pub async fn with_temp_path<F, Fut>(f: F)
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = ()>,
{
    let path = std::env::temp_dir().join(format!("signer-test-{}.json", uuid::Uuid::new_v4()));
    let path_str = path.to_string_lossy().to_string();
    f(path_str).await;
    let _ = std::fs::remove_file(path);
}
