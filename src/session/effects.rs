//! Messages in and out of the session machine.
//!
//! `Input` is everything the machine reacts to: user actions and adapter
//! results tagged with the session they belong to. `Effect`s are observed by
//! the surrounding application; `Command`s are executed by the runtime.

use std::time::Duration;

use serde::Serialize;

use crate::channels::{
    CrawlerStatus, PostRequest, PushEvent, SignedResult, SubmissionReceipt, TransactionStatus,
};
use crate::encoder::{ClientContext, SignPayload};
use crate::error::{AdapterError, AdapterResult, FormField};
use crate::intent::{AckInput, PostAction, SignIntent};
use crate::session::state::{SessionState, SessionTag};

/// Observable side effect of a transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    StateChanged { tag: SessionTag, state: SessionState },
    Status { text: String },
    FormError { field: FormField, message: String },
    AcknowledgmentUpdated { accepted: bool },
    ShowQr { image: String, deep_link: Option<String> },
    QrExpired,
    HideQr,
    Navigate { target: String },
    PersistIdentity { address: String, wallet: String },
    PersistUserToken { token: String },
    ClearUserToken,
    ObjectResolved { object_id: String },
    /// Monotonically increasing; the application reloads its state on change.
    Refresh { token: u64 },
}

/// Delayed input scheduled by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Timer {
    Finish,
    PollCrawler,
}

/// Adapter work requested by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Submit { tag: SessionTag, payload: SignPayload },
    SubscribePush { tag: SessionTag, url: String },
    ClosePush { tag: SessionTag },
    /// Best effort; failures are logged only.
    VoidPayload { reference: String },
    FetchSigned { tag: SessionTag, reference: String },
    QueryBroker { tag: SessionTag, broker: String, txid: String },
    FetchTransaction { tag: SessionTag, hash: String },
    PollCrawler { tag: SessionTag },
    RunPostAction { tag: SessionTag, action: PostAction, request: PostRequest },
    Schedule { tag: SessionTag, delay: Duration, timer: Timer },
    /// Abort every pending task and timer owned by `tag`.
    CancelScheduled { tag: SessionTag },
}

#[derive(Debug)]
pub enum Input {
    Start { intent: SignIntent, client: ClientContext },
    Acknowledge(AckInput),
    Agree,
    Cancel,
    Restart,
    ReturnRedirect { reference: String },
    SetAccount(Option<String>),
    SignOut,
    Submitted { tag: SessionTag, result: AdapterResult<SubmissionReceipt> },
    Push { tag: SessionTag, event: PushEvent },
    PushClosed { tag: SessionTag },
    PushFailed { tag: SessionTag, error: AdapterError },
    SignedFetched { tag: SessionTag, result: AdapterResult<SignedResult> },
    PostActionDone { tag: SessionTag, result: AdapterResult<()> },
    BrokerResolved { tag: SessionTag, result: AdapterResult<Option<String>> },
    TransactionFetched {
        tag: SessionTag,
        hash: String,
        result: AdapterResult<Option<TransactionStatus>>,
    },
    CrawlerPolled { tag: SessionTag, result: AdapterResult<CrawlerStatus> },
    TimerFired { tag: SessionTag, timer: Timer },
}

impl Input {
    pub fn name(&self) -> &'static str {
        match self {
            Input::Start { .. } => "start",
            Input::Acknowledge(_) => "acknowledge",
            Input::Agree => "agree",
            Input::Cancel => "cancel",
            Input::Restart => "restart",
            Input::ReturnRedirect { .. } => "return_redirect",
            Input::SetAccount(_) => "set_account",
            Input::SignOut => "sign_out",
            Input::Submitted { .. } => "submitted",
            Input::Push { .. } => "push",
            Input::PushClosed { .. } => "push_closed",
            Input::PushFailed { .. } => "push_failed",
            Input::SignedFetched { .. } => "signed_fetched",
            Input::PostActionDone { .. } => "post_action_done",
            Input::BrokerResolved { .. } => "broker_resolved",
            Input::TransactionFetched { .. } => "transaction_fetched",
            Input::CrawlerPolled { .. } => "crawler_polled",
            Input::TimerFired { .. } => "timer_fired",
        }
    }
}

/// Output of one transition.
#[derive(Debug, Default, PartialEq)]
pub struct Step {
    pub effects: Vec<Effect>,
    pub commands: Vec<Command>,
}

impl Step {
    pub fn effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn command(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty() && self.commands.is_empty()
    }
}
