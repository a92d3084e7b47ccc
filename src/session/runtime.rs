//! Orchestrator runtime.
//!
//! Owns the `SessionMachine` and serializes every input through one mpsc
//! inbox. Commands produced by the machine are executed as spawned tasks that
//! post their result back into the same inbox, tagged with the session they
//! were issued for.
//!
//! # Data Flow
//! ```text
//! OrchestratorHandle ──▶ inbox ──▶ SessionMachine::handle ──▶ Step
//!                          ▲                                   │
//!                          │                     effects ──▶ broadcast (subscribers)
//!                          │                    commands ──▶ spawned adapter tasks
//!                          └──────────── tagged results ◀──────┘
//! ```
//!
//! # Design Decisions
//! - Tasks are tracked per session tag; `CancelScheduled` aborts them, `ClosePush`
//!   aborts the push subscription
//! - Submission and void calls are never aborted: a payload created for a
//!   superseded session still has to come back so it can be voided

use std::collections::HashMap;
use std::future::Future;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::channels::Collaborators;
use crate::encoder::ClientContext;
use crate::intent::{AckInput, SignIntent};
use crate::observability::metrics;
use crate::session::effects::{Command, Effect, Input};
use crate::session::machine::{MachineSettings, SessionMachine, SessionSnapshot};
use crate::session::state::{Now, SessionTag};
use crate::storage::TokenStore;

const INBOX_CAPACITY: usize = 64;
const EFFECT_CAPACITY: usize = 256;

enum Envelope {
    Input(Input),
    Request {
        input: Input,
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

/// The orchestrator task has exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("orchestrator stopped")]
pub struct OrchestratorStopped;

/// Cloneable front door to the orchestrator task.
#[derive(Clone)]
pub struct OrchestratorHandle {
    inbox: mpsc::Sender<Envelope>,
    effects: broadcast::Sender<Effect>,
}

impl OrchestratorHandle {
    /// Deliver `input` and wait for the resulting snapshot.
    pub async fn send(&self, input: Input) -> Result<SessionSnapshot, OrchestratorStopped> {
        let (reply, rx) = oneshot::channel();
        self.inbox
            .send(Envelope::Request { input, reply })
            .await
            .map_err(|_| OrchestratorStopped)?;
        rx.await.map_err(|_| OrchestratorStopped)
    }

    pub async fn start(
        &self,
        intent: SignIntent,
        client: ClientContext,
    ) -> Result<SessionSnapshot, OrchestratorStopped> {
        self.send(Input::Start { intent, client }).await
    }

    pub async fn acknowledge(&self, input: AckInput) -> Result<SessionSnapshot, OrchestratorStopped> {
        self.send(Input::Acknowledge(input)).await
    }

    pub async fn agree(&self) -> Result<SessionSnapshot, OrchestratorStopped> {
        self.send(Input::Agree).await
    }

    pub async fn cancel(&self) -> Result<SessionSnapshot, OrchestratorStopped> {
        self.send(Input::Cancel).await
    }

    pub async fn restart(&self) -> Result<SessionSnapshot, OrchestratorStopped> {
        self.send(Input::Restart).await
    }

    pub async fn return_redirect(&self, reference: String) -> Result<SessionSnapshot, OrchestratorStopped> {
        self.send(Input::ReturnRedirect { reference }).await
    }

    pub async fn set_account(&self, account: Option<String>) -> Result<SessionSnapshot, OrchestratorStopped> {
        self.send(Input::SetAccount(account)).await
    }

    pub async fn sign_out(&self) -> Result<SessionSnapshot, OrchestratorStopped> {
        self.send(Input::SignOut).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, OrchestratorStopped> {
        let (reply, rx) = oneshot::channel();
        self.inbox
            .send(Envelope::Snapshot(reply))
            .await
            .map_err(|_| OrchestratorStopped)?;
        rx.await.map_err(|_| OrchestratorStopped)
    }

    /// Stream of effects published after every transition.
    pub fn subscribe(&self) -> broadcast::Receiver<Effect> {
        self.effects.subscribe()
    }
}

pub struct Orchestrator {
    machine: SessionMachine,
    collaborators: Collaborators,
    tokens: TokenStore,
    provider_name: String,
    inbox: mpsc::Sender<Envelope>,
    effects: broadcast::Sender<Effect>,
    tasks: HashMap<SessionTag, Vec<JoinHandle<()>>>,
    push_tasks: HashMap<SessionTag, JoinHandle<()>>,
}

impl Orchestrator {
    /// Spawn the orchestrator task. It stops when `shutdown` fires.
    pub fn spawn(
        settings: MachineSettings,
        collaborators: Collaborators,
        tokens: TokenStore,
        shutdown: broadcast::Receiver<()>,
    ) -> (OrchestratorHandle, JoinHandle<()>) {
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let (effects_tx, _) = broadcast::channel(EFFECT_CAPACITY);

        let provider_name = settings.reconcile.wallet.clone();
        let user_token = tokens.get(&provider_name);
        tracing::info!(provider = %provider_name, signed_in = user_token.is_some(), "Orchestrator starting");

        let orchestrator = Orchestrator {
            machine: SessionMachine::new(settings, user_token),
            collaborators,
            tokens,
            provider_name,
            inbox: inbox_tx.clone(),
            effects: effects_tx.clone(),
            tasks: HashMap::new(),
            push_tasks: HashMap::new(),
        };
        let task = tokio::spawn(orchestrator.run(inbox_rx, shutdown));

        let handle = OrchestratorHandle {
            inbox: inbox_tx,
            effects: effects_tx,
        };
        (handle, task)
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<Envelope>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                envelope = inbox.recv() => {
                    match envelope {
                        Some(Envelope::Input(input)) => self.dispatch(input),
                        Some(Envelope::Request { input, reply }) => {
                            self.dispatch(input);
                            let _ = reply.send(self.machine.snapshot());
                        }
                        Some(Envelope::Snapshot(reply)) => {
                            let _ = reply.send(self.machine.snapshot());
                        }
                        None => break,
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Orchestrator received shutdown signal, exiting loop");
                    break;
                }
            }
        }
        self.abort_all();
    }

    fn dispatch(&mut self, input: Input) {
        let name = input.name();
        let step = self.machine.handle(input, Now::current());
        tracing::trace!(
            input = name,
            session = %self.machine.session().tag,
            effects = step.effects.len(),
            commands = step.commands.len(),
            "Input handled"
        );

        for effect in step.effects {
            self.persist(&effect);
            // no subscribers is fine
            let _ = self.effects.send(effect);
        }
        for command in step.commands {
            self.execute(command);
        }
    }

    fn persist(&self, effect: &Effect) {
        let result = match effect {
            Effect::PersistUserToken { token } => self.tokens.set(&self.provider_name, token),
            Effect::ClearUserToken => self.tokens.clear(&self.provider_name),
            _ => return,
        };
        if let Err(e) = result {
            tracing::error!(provider = %self.provider_name, error = %e, "Failed to persist user token");
        }
    }

    fn execute(&mut self, command: Command) {
        let c = self.collaborators.clone();
        match command {
            Command::Submit { tag, payload } => self.spawn_detached(async move {
                let result = c
                    .provider
                    .create_payload(&payload)
                    .await
                    .inspect_err(|_| metrics::record_adapter_error("provider"));
                Some(Input::Submitted { tag, result })
            }),
            Command::VoidPayload { reference } => self.spawn_detached(async move {
                if let Err(e) = c.provider.cancel_payload(&reference).await {
                    metrics::record_adapter_error("provider");
                    tracing::warn!(reference = %reference, error = %e, "Failed to void payload");
                }
                None
            }),
            Command::SubscribePush { tag, url } => self.subscribe_push(tag, url),
            Command::ClosePush { tag } => {
                if let Some(handle) = self.push_tasks.remove(&tag) {
                    handle.abort();
                }
            }
            Command::FetchSigned { tag, reference } => self.spawn_tracked(tag, async move {
                let result = c
                    .provider
                    .fetch_signed(&reference)
                    .await
                    .inspect_err(|_| metrics::record_adapter_error("provider"));
                Input::SignedFetched { tag, result }
            }),
            Command::QueryBroker { tag, broker, txid } => self.spawn_tracked(tag, async move {
                let result = c
                    .broker
                    .settlement_hash(&broker, &txid)
                    .await
                    .inspect_err(|_| metrics::record_adapter_error("broker"));
                Input::BrokerResolved { tag, result }
            }),
            Command::FetchTransaction { tag, hash } => self.spawn_tracked(tag, async move {
                let result = c
                    .ledger
                    .transaction(&hash)
                    .await
                    .inspect_err(|_| metrics::record_adapter_error("indexer"));
                Input::TransactionFetched { tag, hash, result }
            }),
            Command::PollCrawler { tag } => {
                metrics::record_confirmation_poll();
                self.spawn_tracked(tag, async move {
                    let result = c
                        .ledger
                        .crawler_status()
                        .await
                        .inspect_err(|_| metrics::record_adapter_error("indexer"));
                    Input::CrawlerPolled { tag, result }
                })
            }
            Command::RunPostAction { tag, action, request } => self.spawn_tracked(tag, async move {
                let result = c
                    .post
                    .run(action, &request)
                    .await
                    .inspect_err(|_| metrics::record_adapter_error("post_action"));
                Input::PostActionDone { tag, result }
            }),
            Command::Schedule { tag, delay, timer } => self.spawn_tracked(tag, async move {
                tokio::time::sleep(delay).await;
                Input::TimerFired { tag, timer }
            }),
            Command::CancelScheduled { tag } => {
                if let Some(handles) = self.tasks.remove(&tag) {
                    for handle in handles {
                        handle.abort();
                    }
                }
            }
        }
    }

    fn subscribe_push(&mut self, tag: SessionTag, url: String) {
        let push = self.collaborators.push.clone();
        let inbox = self.inbox.clone();
        let handle = tokio::spawn(async move {
            let input = match push.subscribe(&url).await {
                Ok(mut events) => {
                    while let Some(event) = events.recv().await {
                        metrics::record_push_event(event.name());
                        if inbox.send(Envelope::Input(Input::Push { tag, event })).await.is_err() {
                            return;
                        }
                    }
                    Input::PushClosed { tag }
                }
                Err(error) => {
                    metrics::record_adapter_error("push");
                    Input::PushFailed { tag, error }
                }
            };
            let _ = inbox.send(Envelope::Input(input)).await;
        });
        if let Some(previous) = self.push_tasks.insert(tag, handle) {
            previous.abort();
        }
    }

    /// Spawn a task owned by session `tag`; its result is posted back to the inbox.
    fn spawn_tracked<F>(&mut self, tag: SessionTag, fut: F)
    where
        F: Future<Output = Input> + Send + 'static,
    {
        let inbox = self.inbox.clone();
        let handle = tokio::spawn(async move {
            let input = fut.await;
            let _ = inbox.send(Envelope::Input(input)).await;
        });
        let tasks = self.tasks.entry(tag).or_default();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    fn spawn_detached<F>(&self, fut: F)
    where
        F: Future<Output = Option<Input>> + Send + 'static,
    {
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            if let Some(input) = fut.await {
                let _ = inbox.send(Envelope::Input(input)).await;
            }
        });
    }

    fn abort_all(&mut self) {
        for (_, handles) in self.tasks.drain() {
            for handle in handles {
                handle.abort();
            }
        }
        for (_, handle) in self.push_tasks.drain() {
            handle.abort();
        }
        tracing::info!("Orchestrator stopped");
    }
}
