//! Signing session state machine.
//!
//! `SessionMachine::handle` is a pure transition function: it consumes one
//! `Input`, mutates the machine, and returns the effects to publish and the
//! commands to execute. It never awaits and never touches the network.
//!
//! # Data Flow
//! ```text
//! Start ──▶ Idle ──▶ AwaitingAcknowledgment ──(Agree)──▶ Submitting
//!             └──────────────────────────────────────────────┘│
//!                                                              ▼
//!       Submitted ──▶ AwaitingSignature ──(Push: signed / ReturnRedirect)──▶ Reconciling
//!                          │  canceled ──▶ Terminal(Rejected)                   │
//!                          │  expiry ≤ 0 ──▶ Terminal(Expired) ──(Restart)──▶ Submitting
//!                          ▼                                                    ▼
//!                      Terminal(Failed)                     Terminal(Success | Failed)
//! ```
//!
//! # Design Decisions
//! - Every adapter result carries the `SessionTag` it was issued for; results
//!   for any other tag are ignored (a payload created for a superseded session
//!   is voided)
//! - Teardown emits `CancelScheduled` so pending timers and polls die with the session
//! - The intent is never mutated in place; acknowledgment input replaces it

use serde::Serialize;

use crate::channels::{PushEvent, SignedResult, SubmissionReceipt};
use crate::config::SignerConfig;
use crate::encoder::{encode, ClientContext, EncoderContext, MetaBlob};
use crate::error::{AdapterError, AdapterResult, SigningError, ValidationError};
use crate::intent::{AckInput, AcknowledgmentState, IntentKind, SignIntent, LOGIN_TRANSACTION_TYPE};
use crate::observability::metrics;
use crate::reconcile::{Directive, ReconcileSettings, Reconciler};
use crate::session::effects::{Command, Effect, Input, Step, Timer};
use crate::session::state::{Now, Outcome, PushState, SessionState, SessionTag, SigningSession};

/// Environment the machine needs to encode payloads and reconcile results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineSettings {
    pub network_id: u32,
    pub site_url: String,
    pub expiry_minutes: u32,
    pub default_return_url: Option<String>,
    pub reconcile: ReconcileSettings,
}

impl MachineSettings {
    pub fn from_config(config: &SignerConfig) -> Self {
        Self {
            network_id: config.network.network_id,
            site_url: config.network.site_url.clone(),
            expiry_minutes: config.provider.expiry_minutes,
            default_return_url: config.network.return_url.clone(),
            reconcile: ReconcileSettings::from_config(config),
        }
    }
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self::from_config(&SignerConfig::default())
    }
}

/// Read-only view of the machine, returned by every API call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session: SigningSession,
    pub intent: Option<SignIntent>,
    pub acknowledgment: Option<AcknowledgmentState>,
    /// Crawler polls made by the current confirmation wait.
    pub confirmation_polls: Option<u32>,
    pub account: Option<String>,
    pub signed_in: bool,
    pub refresh: u64,
}

pub struct SessionMachine {
    settings: MachineSettings,
    session: SigningSession,
    intent: Option<SignIntent>,
    client: ClientContext,
    ack: Option<AcknowledgmentState>,
    reconciler: Option<Reconciler>,
    account: Option<String>,
    user_token: Option<String>,
    last_refresh: u64,
}

impl SessionMachine {
    pub fn new(settings: MachineSettings, user_token: Option<String>) -> Self {
        Self {
            settings,
            session: SigningSession::new(SessionTag(0)),
            intent: None,
            client: ClientContext::default(),
            ack: None,
            reconciler: None,
            account: None,
            user_token,
            last_refresh: 0,
        }
    }

    pub fn session(&self) -> &SigningSession {
        &self.session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.session.clone(),
            intent: self.intent.clone(),
            acknowledgment: self.ack.clone(),
            confirmation_polls: self
                .reconciler
                .as_ref()
                .and_then(|r| r.confirmation())
                .map(|w| w.poll_attempts),
            account: self.account.clone(),
            signed_in: self.user_token.is_some(),
            refresh: self.last_refresh,
        }
    }

    pub fn handle(&mut self, input: Input, now: Now) -> Step {
        let mut step = Step::default();
        match input {
            Input::Start { intent, client } => self.start(intent, client, &mut step),
            Input::Acknowledge(input) => self.acknowledge(input, &mut step),
            Input::Agree => self.agree(&mut step),
            Input::Cancel => self.cancel(&mut step),
            Input::Restart => self.restart(&mut step),
            Input::ReturnRedirect { reference } => self.return_redirect(reference, &mut step),
            Input::SetAccount(account) => self.account = account,
            Input::SignOut => {
                self.account = None;
                self.user_token = None;
                step.effect(Effect::ClearUserToken);
            }
            Input::Submitted { tag, result } => self.submitted(tag, result, &mut step),
            Input::Push { tag, event } => self.push_event(tag, event, now, &mut step),
            Input::PushClosed { tag } => self.push_lost(tag, AdapterError::ChannelClosed, &mut step),
            Input::PushFailed { tag, error } => self.push_lost(tag, error, &mut step),
            Input::SignedFetched { tag, result } => self.signed_fetched(tag, result, now, &mut step),
            Input::PostActionDone { tag, result } => {
                if let Some(reconciler) = self.reconciling(tag) {
                    let directives = reconciler.on_post_action(result);
                    self.apply_directives(directives, now, &mut step);
                }
            }
            Input::BrokerResolved { tag, result } => {
                if let Some(reconciler) = self.reconciling(tag) {
                    let directives = reconciler.on_broker(result);
                    self.apply_directives(directives, now, &mut step);
                }
            }
            Input::TransactionFetched { tag, hash, result } => {
                if let Some(reconciler) = self.reconciling(tag) {
                    let directives = reconciler.on_transaction(&hash, result, now.instant);
                    self.apply_directives(directives, now, &mut step);
                }
            }
            Input::CrawlerPolled { tag, result } => {
                if let Some(reconciler) = self.reconciling(tag) {
                    let directives = reconciler.on_crawler(result, now.instant);
                    self.apply_directives(directives, now, &mut step);
                }
            }
            Input::TimerFired { tag, timer } => {
                if self.reconciling(tag).is_some() {
                    match timer {
                        Timer::Finish => self.finish(now, &mut step),
                        Timer::PollCrawler => step.command(Command::PollCrawler { tag }),
                    }
                }
            }
        }
        step
    }

    // --- user actions ---

    fn start(&mut self, intent: SignIntent, client: ClientContext, step: &mut Step) {
        if self.session.state.is_active() {
            tracing::info!(
                session = %self.session.tag,
                state = %self.session.state,
                "Replacing active signing session"
            );
        }
        self.close_current(step);
        self.reset(step);
        metrics::record_session_started();
        tracing::info!(session = %self.session.tag, kind = intent.kind.name(), "Signing session started");

        self.client = client;
        if intent.requires_acknowledgment {
            self.ack = Some(AcknowledgmentState::for_intent(&intent));
            self.intent = Some(intent);
            self.set_state(SessionState::AwaitingAcknowledgment, step);
            step.effect(Effect::AcknowledgmentUpdated { accepted: false });
        } else {
            self.intent = Some(intent);
            self.submit(false, step);
        }
    }

    fn acknowledge(&mut self, input: AckInput, step: &mut Step) {
        if self.session.state != SessionState::AwaitingAcknowledgment {
            tracing::debug!(state = %self.session.state, "Ignoring acknowledgment input");
            return;
        }
        let (Some(intent), Some(ack)) = (self.intent.as_ref(), self.ack.as_mut()) else {
            return;
        };

        match ack.apply(intent, input) {
            Ok(Some(amended)) => self.intent = Some(amended),
            Ok(None) => {}
            Err(e) => step.effect(Effect::FormError {
                field: e.field(),
                message: e.to_string(),
            }),
        }
        step.effect(Effect::AcknowledgmentUpdated {
            accepted: ack.accepted,
        });
    }

    fn agree(&mut self, step: &mut Step) {
        if self.session.state != SessionState::AwaitingAcknowledgment {
            tracing::debug!(state = %self.session.state, "Ignoring agree");
            return;
        }
        self.submit(false, step);
    }

    /// Escape hatch: any state returns to `Idle`.
    fn cancel(&mut self, step: &mut Step) {
        if self.session.state.is_active() {
            tracing::info!(session = %self.session.tag, state = %self.session.state, "Signing session canceled");
        }
        self.close_current(step);
        self.reset(step);
    }

    fn restart(&mut self, step: &mut Step) {
        if self.session.state != SessionState::Terminal(Outcome::Expired) || self.intent.is_none() {
            tracing::debug!(state = %self.session.state, "Restart is only available after expiry");
            return;
        }
        self.release(false, step);
        let intent = self.intent.take();
        self.reset(step);
        self.intent = intent;
        metrics::record_session_started();
        tracing::info!(session = %self.session.tag, "Restarting expired signing request");
        self.submit(true, step);
    }

    fn return_redirect(&mut self, reference: String, step: &mut Step) {
        if self.session.reference.as_deref() == Some(reference.as_str()) {
            match self.session.state {
                SessionState::AwaitingSignature => {
                    self.close_push(step);
                    self.begin_reconciling(reference, step);
                    return;
                }
                SessionState::Reconciling => {
                    tracing::debug!(reference = %reference, "Result already being processed");
                    return;
                }
                _ => {}
            }
        }

        self.close_current(step);
        self.reset(step);
        metrics::record_session_started();
        tracing::info!(session = %self.session.tag, reference = %reference, "Resuming signing session from return redirect");
        self.session.reference = Some(reference.clone());
        self.set_state(SessionState::AwaitingSignature, step);
        self.begin_reconciling(reference, step);
    }

    // --- adapter results ---

    fn submitted(&mut self, tag: SessionTag, result: AdapterResult<SubmissionReceipt>, step: &mut Step) {
        if tag != self.session.tag || self.session.state != SessionState::Submitting {
            if let Ok(receipt) = result {
                tracing::info!(reference = %receipt.reference, "Voiding payload created for a superseded session");
                step.command(Command::VoidPayload {
                    reference: receipt.reference,
                });
            }
            return;
        }

        let receipt = match result {
            Ok(receipt) => receipt,
            Err(e) => {
                self.fail(SigningError::Adapter(e), step);
                return;
            }
        };

        tracing::info!(session = %tag, reference = %receipt.reference, pushed = receipt.pushed, "Payload created");
        self.session.reference = Some(receipt.reference.clone());
        self.set_state(SessionState::AwaitingSignature, step);

        if self.client.mobile {
            if let Some(link) = receipt.deep_link_url.clone() {
                self.session.deep_link = Some(link.clone());
                self.status("Opening the wallet app", step);
                step.effect(Effect::Navigate { target: link });
                return;
            }
            tracing::warn!(reference = %receipt.reference, "No deep link for mobile client, showing QR");
        }

        self.session.qr_image = receipt.qr_image_url.clone();
        self.session.deep_link = receipt.deep_link_url.clone();
        if let Some(image) = receipt.qr_image_url {
            step.effect(Effect::ShowQr {
                image,
                deep_link: receipt.deep_link_url,
            });
        }
        if receipt.pushed {
            self.status("Check your wallet app for the sign request", step);
        } else {
            self.status("Scan the QR code with the wallet app", step);
        }
        if let Some(url) = receipt.websocket_url {
            self.session.push = PushState::Open;
            step.command(Command::SubscribePush { tag, url });
        }
    }

    fn push_event(&mut self, tag: SessionTag, event: PushEvent, now: Now, step: &mut Step) {
        if tag != self.session.tag || self.session.state != SessionState::AwaitingSignature {
            tracing::debug!(session = %tag, event = event.name(), "Ignoring push event for inactive session");
            return;
        }

        match event {
            PushEvent::Opened => self.status("The request was opened in the wallet app", step),
            PushEvent::Signed { reference } => {
                let reference = Some(reference)
                    .filter(|r| !r.is_empty())
                    .or_else(|| self.session.reference.clone());
                self.close_push(step);
                match reference {
                    Some(reference) => self.begin_reconciling(reference, step),
                    None => self.fail(
                        SigningError::Adapter(AdapterError::Decode("signed event without reference".into())),
                        step,
                    ),
                }
            }
            PushEvent::Canceled => {
                self.release(false, step);
                self.session.error = Some(SigningError::UserRejected.to_string());
                self.status("The request was rejected in the wallet app", step);
                self.set_state(SessionState::Terminal(Outcome::Rejected), step);
                self.clear_transient();
                self.refresh(now, step);
            }
            PushEvent::Expiry { seconds } if seconds <= 0 => {
                self.close_push(step);
                self.session.qr_expired = true;
                self.session.expires_at = Some(now.unix_ms);
                self.session.error = Some(SigningError::ProtocolTimeout.to_string());
                step.effect(Effect::QrExpired);
                self.status("The request expired", step);
                self.set_state(SessionState::Terminal(Outcome::Expired), step);
            }
            PushEvent::Expiry { seconds } => {
                let remaining_ms = u64::try_from(seconds).unwrap_or(0).saturating_mul(1000);
                self.session.expires_at = Some(now.unix_ms.saturating_add(remaining_ms));
            }
            PushEvent::Other => {}
        }
    }

    fn push_lost(&mut self, tag: SessionTag, error: AdapterError, step: &mut Step) {
        if tag != self.session.tag || self.session.push != PushState::Open {
            return;
        }
        self.session.push = PushState::Closed;
        if self.session.state == SessionState::AwaitingSignature {
            tracing::warn!(session = %tag, error = %error, "Push channel lost while awaiting signature");
            self.fail(SigningError::Adapter(error), step);
        }
    }

    fn signed_fetched(&mut self, tag: SessionTag, result: AdapterResult<SignedResult>, now: Now, step: &mut Step) {
        if tag != self.session.tag || self.session.state != SessionState::Reconciling {
            return;
        }
        let signed = match result {
            Ok(signed) => signed,
            Err(e) => {
                self.fail(SigningError::Adapter(e), step);
                return;
            }
        };

        let is_login = match &self.intent {
            Some(intent) => intent.kind == IntentKind::Login && !intent.is_sign_only(),
            None => {
                signed.payload.tx_type.as_deref() == Some(LOGIN_TRANSACTION_TYPE)
                    && !signed.custom_meta.blob.is_sign_only()
            }
        };
        if is_login {
            if let Some(token) = signed.application.issued_user_token.clone() {
                self.user_token = Some(token.clone());
                step.effect(Effect::PersistUserToken { token });
            }
        }

        let (blob, object_callback) = match &self.intent {
            Some(intent) => (
                MetaBlob {
                    redirect: intent.redirect.clone(),
                    broker: intent.broker.clone(),
                    data: intent.data.clone(),
                },
                intent.object_callback.clone(),
            ),
            None => (signed.custom_meta.blob.clone(), None),
        };

        let mut reconciler = Reconciler::new(self.settings.reconcile.clone(), blob, object_callback);
        let directives = reconciler.begin(&signed);
        self.reconciler = Some(reconciler);
        self.apply_directives(directives, now, step);
    }

    fn reconciling(&mut self, tag: SessionTag) -> Option<&mut Reconciler> {
        if tag != self.session.tag || self.session.state != SessionState::Reconciling {
            return None;
        }
        self.reconciler.as_mut()
    }

    fn apply_directives(&mut self, directives: Vec<Directive>, now: Now, step: &mut Step) {
        let tag = self.session.tag;
        for directive in directives {
            match directive {
                Directive::Status(text) => self.status(text, step),
                Directive::PersistIdentity { address, wallet } => {
                    self.account = Some(address.clone());
                    step.effect(Effect::PersistIdentity { address, wallet });
                }
                Directive::Navigate(target) => step.effect(Effect::Navigate { target }),
                Directive::ObjectResolved(object_id) => step.effect(Effect::ObjectResolved { object_id }),
                Directive::RunPostAction { action, request } => {
                    step.command(Command::RunPostAction { tag, action, request })
                }
                Directive::QueryBroker { broker, txid } => {
                    step.command(Command::QueryBroker { tag, broker, txid })
                }
                Directive::FetchTransaction { hash } => step.command(Command::FetchTransaction { tag, hash }),
                Directive::PollCrawler { after: None } => step.command(Command::PollCrawler { tag }),
                Directive::PollCrawler { after: Some(delay) } => step.command(Command::Schedule {
                    tag,
                    delay,
                    timer: Timer::PollCrawler,
                }),
                Directive::Finish { after: None } => {
                    self.finish(now, step);
                    return;
                }
                Directive::Finish { after: Some(delay) } => step.command(Command::Schedule {
                    tag,
                    delay,
                    timer: Timer::Finish,
                }),
                Directive::Fail(e) => {
                    self.fail(SigningError::Adapter(e), step);
                    return;
                }
            }
        }
    }

    // --- transitions ---

    fn submit(&mut self, already_finalized: bool, step: &mut Step) {
        let Some(intent) = self.intent.clone() else {
            return;
        };
        let finalized = match (&self.ack, already_finalized) {
            (Some(ack), false) => match ack.finalize(&intent) {
                Ok(finalized) => finalized,
                Err(e) => {
                    self.reject_submission(e, step);
                    return;
                }
            },
            _ => intent,
        };

        let payload = match encode(&finalized, &self.encoder_context()) {
            Ok(payload) => payload,
            Err(e) => {
                self.reject_submission(e, step);
                return;
            }
        };

        self.intent = Some(finalized);
        if self.set_state(SessionState::Submitting, step) {
            self.ack = None;
            self.status("Creating the signing request", step);
            step.command(Command::Submit {
                tag: self.session.tag,
                payload,
            });
        }
    }

    /// Validation failures keep (or put) the session on the acknowledgment screen.
    fn reject_submission(&mut self, error: ValidationError, step: &mut Step) {
        tracing::debug!(session = %self.session.tag, error = %error, "Signing request not submitted");
        if self.ack.is_none() {
            if let Some(intent) = &self.intent {
                self.ack = Some(AcknowledgmentState::for_intent(intent));
            }
        }
        if let Some(ack) = self.ack.as_mut() {
            ack.form_errors.insert(error.field(), error.to_string());
        }
        if self.session.state != SessionState::AwaitingAcknowledgment {
            self.set_state(SessionState::AwaitingAcknowledgment, step);
        }
        step.effect(Effect::FormError {
            field: error.field(),
            message: error.to_string(),
        });
    }

    fn begin_reconciling(&mut self, reference: String, step: &mut Step) {
        if self.session.qr_image.take().is_some() {
            step.effect(Effect::HideQr);
        }
        if self.set_state(SessionState::Reconciling, step) {
            self.status("Signed, processing the result", step);
            step.command(Command::FetchSigned {
                tag: self.session.tag,
                reference,
            });
        }
    }

    fn finish(&mut self, now: Now, step: &mut Step) {
        self.release(false, step);
        self.set_state(SessionState::Terminal(Outcome::Success), step);
        tracing::info!(session = %self.session.tag, reference = ?self.session.reference, "Signing session finished");
        self.clear_transient();
        self.refresh(now, step);
    }

    fn fail(&mut self, error: SigningError, step: &mut Step) {
        let text = error.to_string();
        tracing::warn!(session = %self.session.tag, state = %self.session.state, error = %text, "Signing session failed");
        self.release(false, step);
        self.session.error = Some(text.clone());
        self.status(text, step);
        self.set_state(SessionState::Terminal(Outcome::Failed), step);
        self.ack = None;
        self.reconciler = None;
    }

    /// Tear down whatever the current session still holds. An active session
    /// is force-canceled and its payload voided.
    fn close_current(&mut self, step: &mut Step) {
        if self.session.state.is_active() {
            self.release(true, step);
            metrics::record_session_finished("canceled");
        } else {
            self.release(false, step);
        }
    }

    /// Close the push channel, optionally void the payload, abort timers, hide the QR.
    fn release(&mut self, void: bool, step: &mut Step) {
        let tag = self.session.tag;
        self.close_push(step);
        if void && self.session.state == SessionState::AwaitingSignature {
            if let Some(reference) = self.session.reference.clone() {
                step.command(Command::VoidPayload { reference });
            }
        }
        step.command(Command::CancelScheduled { tag });
        if self.session.qr_image.take().is_some() || self.session.qr_expired {
            step.effect(Effect::HideQr);
        }
    }

    fn close_push(&mut self, step: &mut Step) {
        if self.session.push == PushState::Open {
            self.session.push = PushState::Closed;
            step.command(Command::ClosePush {
                tag: self.session.tag,
            });
        }
    }

    /// New tag in `Idle`; everything belonging to the old session is dropped.
    fn reset(&mut self, step: &mut Step) {
        let tag = self.session.tag.next();
        self.session = SigningSession::new(tag);
        self.clear_transient();
        metrics::set_session_active(false);
        step.effect(Effect::StateChanged {
            tag,
            state: SessionState::Idle,
        });
    }

    fn clear_transient(&mut self) {
        self.intent = None;
        self.ack = None;
        self.reconciler = None;
    }

    fn set_state(&mut self, next: SessionState, step: &mut Step) -> bool {
        let current = self.session.state;
        if !current.can_transition_to(next) {
            tracing::error!(session = %self.session.tag, from = %current, to = %next, "Rejected invalid session transition");
            return false;
        }
        self.session.state = next;
        tracing::debug!(session = %self.session.tag, from = %current, to = %next, "Session transition");

        if let SessionState::Terminal(outcome) = next {
            metrics::record_session_finished(outcome.as_str());
        }
        metrics::set_session_active(next.is_active());
        step.effect(Effect::StateChanged {
            tag: self.session.tag,
            state: next,
        });
        true
    }

    fn status(&mut self, text: impl Into<String>, step: &mut Step) {
        let text = text.into();
        self.session.last_status = Some(text.clone());
        step.effect(Effect::Status { text });
    }

    fn refresh(&mut self, now: Now, step: &mut Step) {
        let token = now.unix_ms.max(self.last_refresh + 1);
        self.last_refresh = token;
        step.effect(Effect::Refresh { token });
    }

    fn encoder_context(&self) -> EncoderContext {
        EncoderContext {
            network_id: self.settings.network_id,
            site_url: self.settings.site_url.clone(),
            account: self.account.clone(),
            user_token: self.user_token.clone(),
            expiry_minutes: self.settings.expiry_minutes,
            default_return_url: self.settings.default_return_url.clone(),
            client: self.client.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::SubmissionReceipt;
    use crate::error::FormField;
    use crate::intent::{TxJson, VoteTopic};
    use serde_json::json;
    use tokio::time::Instant;

    fn now() -> Now {
        Now {
            instant: Instant::now(),
            unix_ms: 1_700_000_000_000,
        }
    }

    fn tx(value: serde_json::Value) -> TxJson {
        value.as_object().cloned().unwrap()
    }

    fn payment() -> SignIntent {
        SignIntent::transaction(tx(json!({
            "TransactionType": "Payment",
            "Destination": "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh",
            "Amount": "1000"
        })))
    }

    fn accept_offer(amount: &str) -> SignIntent {
        SignIntent::transaction(tx(json!({
            "TransactionType": "NFTokenAcceptOffer",
            "NFTokenSellOffer": "ABC"
        })))
        .with_offer_amount(amount)
    }

    fn receipt(reference: &str) -> SubmissionReceipt {
        SubmissionReceipt {
            reference: reference.to_string(),
            qr_image_url: Some(format!("https://qr.example/{}.png", reference)),
            deep_link_url: Some(format!("https://wallet.example/sign/{}", reference)),
            websocket_url: Some(format!("wss://wallet.example/sign/{}", reference)),
            pushed: false,
        }
    }

    fn machine() -> SessionMachine {
        SessionMachine::new(MachineSettings::default(), None)
    }

    fn submit_tag(step: &Step) -> Option<SessionTag> {
        step.commands.iter().find_map(|c| match c {
            Command::Submit { tag, .. } => Some(*tag),
            _ => None,
        })
    }

    fn refreshes(step: &Step) -> usize {
        step.effects
            .iter()
            .filter(|e| matches!(e, Effect::Refresh { .. }))
            .count()
    }

    /// Start `intent` and deliver the provider receipt; returns the session tag.
    fn awaiting_signature(m: &mut SessionMachine, intent: SignIntent, reference: &str) -> SessionTag {
        let step = m.handle(
            Input::Start {
                intent,
                client: ClientContext::default(),
            },
            now(),
        );
        let tag = submit_tag(&step).unwrap();
        m.handle(
            Input::Submitted {
                tag,
                result: Ok(receipt(reference)),
            },
            now(),
        );
        assert_eq!(m.session().state, SessionState::AwaitingSignature);
        tag
    }

    #[test]
    fn test_acknowledgment_gates_submission() {
        let mut m = machine();
        let step = m.handle(
            Input::Start {
                intent: accept_offer("10"),
                client: ClientContext::default(),
            },
            now(),
        );
        assert_eq!(m.session().state, SessionState::AwaitingAcknowledgment);
        assert!(submit_tag(&step).is_none());

        let step = m.handle(Input::Agree, now());
        assert!(submit_tag(&step).is_none());
        assert!(step.effects.contains(&Effect::FormError {
            field: FormField::Consent,
            message: ValidationError::AcknowledgmentRequired.to_string(),
        }));
        assert_eq!(m.session().state, SessionState::AwaitingAcknowledgment);

        m.handle(Input::Acknowledge(AckInput::Accept(true)), now());
        let step = m.handle(Input::Agree, now());
        assert!(submit_tag(&step).is_some());
        assert_eq!(m.session().state, SessionState::Submitting);
        assert!(m.snapshot().acknowledgment.is_none());
    }

    #[test]
    fn test_free_offer_skips_acknowledgment() {
        let mut m = machine();
        let step = m.handle(
            Input::Start {
                intent: accept_offer("0"),
                client: ClientContext::default(),
            },
            now(),
        );
        assert!(submit_tag(&step).is_some());
        assert_eq!(m.session().state, SessionState::Submitting);
        assert!(!step
            .effects
            .iter()
            .any(|e| matches!(e, Effect::StateChanged { state: SessionState::AwaitingAcknowledgment, .. })));
    }

    #[test]
    fn test_reward_rate_out_of_range_stays_on_form() {
        let mut m = machine();
        let vote = SignIntent::new(
            IntentKind::CastVote(VoteTopic::RewardRate),
            Some(tx(json!({"TransactionType": "Invoke"}))),
        );
        m.handle(
            Input::Start {
                intent: vote,
                client: ClientContext::default(),
            },
            now(),
        );

        let step = m.handle(Input::Acknowledge(AckInput::RewardRate("1.5".into())), now());
        assert!(step.effects.contains(&Effect::FormError {
            field: FormField::RewardRate,
            message: "Rate should be a number from 0 to 1".into(),
        }));
        assert!(step.effects.contains(&Effect::AcknowledgmentUpdated { accepted: false }));

        let step = m.handle(Input::Agree, now());
        assert!(submit_tag(&step).is_none());
        assert_eq!(m.session().state, SessionState::AwaitingAcknowledgment);
        assert_eq!(m.snapshot().acknowledgment.map(|a| a.accepted), Some(false));
    }

    #[test]
    fn test_expiry_then_restart_issues_new_reference() {
        let mut m = machine();
        let tag = awaiting_signature(&mut m, payment(), "ref-1");

        for event in [PushEvent::Opened, PushEvent::Expiry { seconds: 30 }] {
            m.handle(Input::Push { tag, event }, now());
            assert_eq!(m.session().state, SessionState::AwaitingSignature);
        }
        assert_eq!(m.session().expires_at, Some(now().unix_ms + 30_000));

        let step = m.handle(
            Input::Push {
                tag,
                event: PushEvent::Expiry { seconds: 0 },
            },
            now(),
        );
        assert_eq!(m.session().state, SessionState::Terminal(Outcome::Expired));
        assert!(m.session().qr_expired);
        assert!(step.effects.contains(&Effect::QrExpired));
        assert!(step.commands.contains(&Command::ClosePush { tag }));

        let step = m.handle(Input::Restart, now());
        let new_tag = submit_tag(&step).unwrap();
        assert_ne!(new_tag, tag);
        m.handle(
            Input::Submitted {
                tag: new_tag,
                result: Ok(receipt("ref-2")),
            },
            now(),
        );
        assert_eq!(m.session().reference.as_deref(), Some("ref-2"));
        assert_eq!(m.session().state, SessionState::AwaitingSignature);
    }

    #[test]
    fn test_huge_expiry_heartbeat_saturates() {
        let mut m = machine();
        let tag = awaiting_signature(&mut m, payment(), "ref-1");

        m.handle(
            Input::Push {
                tag,
                event: PushEvent::Expiry { seconds: i64::MAX },
            },
            now(),
        );
        assert_eq!(m.session().state, SessionState::AwaitingSignature);
        assert_eq!(m.session().expires_at, Some(u64::MAX));
    }

    #[test]
    fn test_new_intent_force_cancels_previous_session() {
        let mut m = machine();
        let first = awaiting_signature(&mut m, payment(), "ref-1");

        let step = m.handle(
            Input::Start {
                intent: payment(),
                client: ClientContext::default(),
            },
            now(),
        );
        assert!(step.commands.contains(&Command::ClosePush { tag: first }));
        assert!(step.commands.contains(&Command::VoidPayload {
            reference: "ref-1".into()
        }));
        assert!(step.commands.contains(&Command::CancelScheduled { tag: first }));
        assert_ne!(submit_tag(&step), Some(first));

        // late event for the superseded session
        let step = m.handle(
            Input::Push {
                tag: first,
                event: PushEvent::Canceled,
            },
            now(),
        );
        assert!(step.is_empty());
        assert_eq!(m.session().state, SessionState::Submitting);
    }

    #[test]
    fn test_payload_for_canceled_session_is_voided() {
        let mut m = machine();
        let step = m.handle(
            Input::Start {
                intent: payment(),
                client: ClientContext::default(),
            },
            now(),
        );
        let tag = submit_tag(&step).unwrap();
        m.handle(Input::Cancel, now());
        assert_eq!(m.session().state, SessionState::Idle);

        let step = m.handle(
            Input::Submitted {
                tag,
                result: Ok(receipt("ref-1")),
            },
            now(),
        );
        assert_eq!(
            step.commands,
            vec![Command::VoidPayload {
                reference: "ref-1".into()
            }]
        );
        assert_eq!(m.session().state, SessionState::Idle);
    }

    #[test]
    fn test_cancel_while_awaiting_signature() {
        let mut m = machine();
        let tag = awaiting_signature(&mut m, payment(), "ref-1");
        let step = m.handle(Input::Cancel, now());

        assert_eq!(m.session().state, SessionState::Idle);
        assert!(m.session().qr_image.is_none());
        assert!(m.session().last_status.is_none());
        assert!(step.commands.contains(&Command::ClosePush { tag }));
        assert!(step.commands.contains(&Command::VoidPayload {
            reference: "ref-1".into()
        }));
        assert!(step.effects.contains(&Effect::HideQr));
        assert_eq!(refreshes(&step), 0);
    }

    #[test]
    fn test_wallet_rejection() {
        let mut m = machine();
        let tag = awaiting_signature(&mut m, payment(), "ref-1");
        let step = m.handle(
            Input::Push {
                tag,
                event: PushEvent::Canceled,
            },
            now(),
        );
        assert_eq!(m.session().state, SessionState::Terminal(Outcome::Rejected));
        assert_eq!(refreshes(&step), 1);
        assert!(m.snapshot().intent.is_none());
    }

    #[test]
    fn test_submission_error_is_verbatim() {
        let mut m = machine();
        let step = m.handle(
            Input::Start {
                intent: payment(),
                client: ClientContext::default(),
            },
            now(),
        );
        let tag = submit_tag(&step).unwrap();
        let step = m.handle(
            Input::Submitted {
                tag,
                result: Err(AdapterError::Provider("Invalid payload".into())),
            },
            now(),
        );
        assert_eq!(m.session().state, SessionState::Terminal(Outcome::Failed));
        assert_eq!(m.session().last_status.as_deref(), Some("Invalid payload"));
        assert_eq!(refreshes(&step), 0);
    }

    #[test]
    fn test_broker_without_settlement_succeeds_after_delay() {
        let mut m = machine();
        let tag = awaiting_signature(&mut m, accept_offer("0").with_broker("bidds"), "ref-1");
        let step = m.handle(
            Input::Push {
                tag,
                event: PushEvent::Signed {
                    reference: "ref-1".into(),
                },
            },
            now(),
        );
        assert_eq!(m.session().state, SessionState::Reconciling);
        assert!(step.commands.contains(&Command::FetchSigned {
            tag,
            reference: "ref-1".into()
        }));

        let signed: SignedResult = serde_json::from_value(json!({
            "response": {"account": "rAlice", "txid": "T1"},
            "payload": {"tx_type": "NFTokenAcceptOffer"}
        }))
        .unwrap();
        let step = m.handle(Input::SignedFetched { tag, result: Ok(signed) }, now());
        assert!(step.commands.contains(&Command::QueryBroker {
            tag,
            broker: "bidds".into(),
            txid: "T1".into()
        }));

        let step = m.handle(Input::BrokerResolved { tag, result: Ok(None) }, now());
        assert!(step.commands.contains(&Command::Schedule {
            tag,
            delay: std::time::Duration::from_millis(3000),
            timer: Timer::Finish
        }));
        assert_eq!(m.session().state, SessionState::Reconciling);

        let step = m.handle(
            Input::TimerFired {
                tag,
                timer: Timer::Finish,
            },
            now(),
        );
        assert_eq!(m.session().state, SessionState::Terminal(Outcome::Success));
        assert_eq!(refreshes(&step), 1);

        // a duplicate timer is a no-op
        let step = m.handle(
            Input::TimerFired {
                tag,
                timer: Timer::Finish,
            },
            now(),
        );
        assert!(step.is_empty());
    }

    #[test]
    fn test_mobile_redirects_instead_of_qr() {
        let mut m = machine();
        let step = m.handle(
            Input::Start {
                intent: payment(),
                client: ClientContext {
                    mobile: true,
                    return_url: Some("https://site.example/account".into()),
                },
            },
            now(),
        );
        let tag = submit_tag(&step).unwrap();
        let step = m.handle(
            Input::Submitted {
                tag,
                result: Ok(receipt("ref-1")),
            },
            now(),
        );
        assert!(step.effects.contains(&Effect::Navigate {
            target: "https://wallet.example/sign/ref-1".into()
        }));
        assert!(!step.effects.iter().any(|e| matches!(e, Effect::ShowQr { .. })));
        assert!(!step.commands.iter().any(|c| matches!(c, Command::SubscribePush { .. })));

        let step = m.handle(
            Input::ReturnRedirect {
                reference: "ref-1".into(),
            },
            now(),
        );
        assert_eq!(m.session().state, SessionState::Reconciling);
        assert!(step.commands.contains(&Command::FetchSigned {
            tag,
            reference: "ref-1".into()
        }));
    }

    #[test]
    fn test_return_redirect_without_session() {
        let mut m = machine();
        let step = m.handle(
            Input::ReturnRedirect {
                reference: "ref-9".into(),
            },
            now(),
        );
        assert_eq!(m.session().state, SessionState::Reconciling);
        assert_eq!(m.session().reference.as_deref(), Some("ref-9"));
        assert!(step
            .commands
            .iter()
            .any(|c| matches!(c, Command::FetchSigned { reference, .. } if reference == "ref-9")));
    }

    #[test]
    fn test_login_persists_user_token() {
        let mut m = machine();
        let tag = awaiting_signature(&mut m, SignIntent::login(), "ref-1");
        m.handle(
            Input::Push {
                tag,
                event: PushEvent::Signed {
                    reference: String::new(),
                },
            },
            now(),
        );
        let signed: SignedResult = serde_json::from_value(json!({
            "application": {"issued_user_token": "tok-1"},
            "response": {"account": "rAlice"},
            "payload": {"tx_type": "SignIn"}
        }))
        .unwrap();
        let step = m.handle(Input::SignedFetched { tag, result: Ok(signed) }, now());

        assert!(step.effects.contains(&Effect::PersistUserToken {
            token: "tok-1".into()
        }));
        assert!(step.effects.contains(&Effect::PersistIdentity {
            address: "rAlice".into(),
            wallet: "xaman".into()
        }));
        assert_eq!(m.session().state, SessionState::Terminal(Outcome::Success));
        let snapshot = m.snapshot();
        assert!(snapshot.signed_in);
        assert_eq!(snapshot.account.as_deref(), Some("rAlice"));

        let step = m.handle(Input::SignOut, now());
        assert_eq!(step.effects, vec![Effect::ClearUserToken]);
        assert!(!m.snapshot().signed_in);
    }

    #[test]
    fn test_refresh_token_is_monotonic() {
        let mut m = machine();
        let mut last = 0;
        for i in 0..3 {
            let tag = awaiting_signature(&mut m, payment(), &format!("ref-{}", i));
            m.handle(
                Input::Push {
                    tag,
                    event: PushEvent::Canceled,
                },
                now(),
            );
            let token = m.snapshot().refresh;
            assert!(token > last);
            last = token;
        }
    }
}
