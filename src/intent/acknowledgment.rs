//! Consent and secondary-input handling for intents that need acknowledgment.
//!
//! # Responsibilities
//! - Track whether the user agreed to the risks of the current intent
//! - Validate form input (reward delay/rate, hook value, seat address, ...)
//! - Produce amended intents carrying the validated input
//!
//! # Design Decisions
//! - Amendments return a new `SignIntent`; the caller swaps it in
//! - A failed input clears `accepted` and records a message for that field
//! - Vote parameters for hook and seat votes are assembled at `finalize`,
//!   once every selector has its final value

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FormField, ValidationError};
use crate::intent::address;
use crate::intent::hook::{self, ERASED_HOOK, TOPIC_REWARD_DELAY, TOPIC_REWARD_RATE, VACATED_SEAT};
use crate::intent::types::{IntentKind, SignIntent, VoteTopic};

const DEFAULT_HOOK_TOPIC: u8 = 2;
const DEFAULT_SEAT: u8 = 19;
const MAX_HOOK_TOPIC: u8 = 9;
const MAX_SEAT: u8 = 19;
const HOOK_VALUE_LEN: usize = 64;

/// One user interaction on the acknowledgment screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "input", content = "value", rename_all = "snake_case")]
pub enum AckInput {
    /// Consent checkbox.
    Accept(bool),
    RewardDelay(String),
    RewardRate(String),
    /// Hook vote place, 0-9.
    HookTopic(u8),
    HookValue(String),
    /// Seat number, 0-19.
    Seat(u8),
    SeatAddress(String),
    /// Erase the hook or vacate the seat instead of voting for a value.
    Erase(bool),
    TargetLayer(u8),
    Destination(String),
    Amount(String),
    Domain(String),
}

impl AckInput {
    pub fn field(&self) -> FormField {
        match self {
            AckInput::Accept(_) | AckInput::Erase(_) => FormField::Consent,
            AckInput::RewardDelay(_) => FormField::RewardDelay,
            AckInput::RewardRate(_) => FormField::RewardRate,
            AckInput::HookTopic(_) => FormField::HookTopic,
            AckInput::HookValue(_) => FormField::HookValue,
            AckInput::Seat(_) => FormField::Seat,
            AckInput::SeatAddress(_) => FormField::SeatAddress,
            AckInput::TargetLayer(_) => FormField::TargetLayer,
            AckInput::Destination(_) => FormField::Destination,
            AckInput::Amount(_) => FormField::Amount,
            AckInput::Domain(_) => FormField::Domain,
        }
    }
}

/// Transient consent state for one intent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcknowledgmentState {
    pub accepted: bool,
    pub form_errors: BTreeMap<FormField, String>,
    pub hook_topic: u8,
    pub hook_value: Option<String>,
    pub seat: u8,
    pub seat_address: Option<String>,
    pub erase: bool,
    pub target_layer: u8,
}

impl AcknowledgmentState {
    pub fn for_intent(intent: &SignIntent) -> Self {
        Self {
            accepted: false,
            form_errors: BTreeMap::new(),
            hook_topic: DEFAULT_HOOK_TOPIC,
            hook_value: None,
            seat: DEFAULT_SEAT,
            seat_address: None,
            erase: false,
            target_layer: intent.layer.unwrap_or(1),
        }
    }

    /// Apply one input. Returns the amended intent when the input changed the payload.
    pub fn apply(
        &mut self,
        intent: &SignIntent,
        input: AckInput,
    ) -> Result<Option<SignIntent>, ValidationError> {
        let field = input.field();
        self.form_errors.remove(&field);

        let result = self.apply_inner(intent, input);
        if let Err(err) = &result {
            self.form_errors.insert(err.field(), err.to_string());
        }
        result
    }

    fn apply_inner(
        &mut self,
        intent: &SignIntent,
        input: AckInput,
    ) -> Result<Option<SignIntent>, ValidationError> {
        match input {
            AckInput::Accept(accepted) => {
                if intent.kind.consent_from_input() {
                    return Err(ValidationError::invalid(
                        FormField::Consent,
                        "Fill in the form to continue",
                    ));
                }
                self.accepted = accepted;
                Ok(None)
            }
            AckInput::RewardDelay(raw) => {
                expect_kind(intent, IntentKind::CastVote(VoteTopic::RewardDelay), FormField::RewardDelay)?;
                self.accepted = false;
                let delay = raw.trim();
                let valid = delay
                    .parse::<u64>()
                    .ok()
                    .filter(|n| *n > 0 && n.to_string() == delay);
                let value = valid.and_then(|_| hook::to_xfl_hex(delay)).ok_or_else(|| {
                    ValidationError::invalid(FormField::RewardDelay, "Delay should be a positive integer")
                })?;
                self.accepted = true;
                Ok(Some(with_vote(intent, 1, TOPIC_REWARD_DELAY, &value)))
            }
            AckInput::RewardRate(raw) => {
                expect_kind(intent, IntentKind::CastVote(VoteTopic::RewardRate), FormField::RewardRate)?;
                self.accepted = false;
                let rate = raw.trim();
                let in_range = rate
                    .parse::<f64>()
                    .ok()
                    .filter(|r| (0.0..=1.0).contains(r));
                let value = in_range.and_then(|_| hook::to_xfl_hex(rate)).ok_or_else(|| {
                    ValidationError::invalid(FormField::RewardRate, "Rate should be a number from 0 to 1")
                })?;
                self.accepted = true;
                Ok(Some(with_vote(intent, 1, TOPIC_REWARD_RATE, &value)))
            }
            AckInput::HookTopic(topic) => {
                expect_kind(intent, IntentKind::CastVote(VoteTopic::Hook), FormField::HookTopic)?;
                if topic > MAX_HOOK_TOPIC {
                    return Err(ValidationError::invalid(FormField::HookTopic, "Invalid place"));
                }
                self.hook_topic = topic;
                Ok(None)
            }
            AckInput::HookValue(value) => {
                expect_kind(intent, IntentKind::CastVote(VoteTopic::Hook), FormField::HookValue)?;
                self.accepted = self.erase;
                self.hook_value = None;
                let value = value.trim();
                if value.is_empty() {
                    return Ok(None);
                }
                if value.len() != HOOK_VALUE_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(ValidationError::invalid(FormField::HookValue, "Invalid Hook value"));
                }
                self.hook_value = Some(value.to_ascii_uppercase());
                self.accepted = true;
                Ok(None)
            }
            AckInput::Seat(seat) => {
                expect_kind(intent, IntentKind::CastVote(VoteTopic::Seat), FormField::Seat)?;
                if seat > MAX_SEAT {
                    return Err(ValidationError::invalid(FormField::Seat, "Invalid seat"));
                }
                self.seat = seat;
                Ok(None)
            }
            AckInput::SeatAddress(value) => {
                expect_kind(intent, IntentKind::CastVote(VoteTopic::Seat), FormField::SeatAddress)?;
                self.accepted = self.erase;
                self.seat_address = None;
                let value = value.trim();
                if value.is_empty() {
                    return Ok(None);
                }
                if !address::is_valid_address(value) {
                    return Err(ValidationError::invalid(FormField::SeatAddress, "Invalid address"));
                }
                self.seat_address = Some(value.to_string());
                self.accepted = true;
                Ok(None)
            }
            AckInput::Erase(erase) => {
                let has_value = match intent.kind {
                    IntentKind::CastVote(VoteTopic::Hook) => self.hook_value.is_some(),
                    IntentKind::CastVote(VoteTopic::Seat) => self.seat_address.is_some(),
                    _ => {
                        return Err(ValidationError::invalid(
                            FormField::Consent,
                            "Nothing to erase for this request",
                        ))
                    }
                };
                self.erase = erase;
                self.accepted = erase || has_value;
                Ok(None)
            }
            AckInput::TargetLayer(layer) => {
                if !matches!(
                    intent.kind,
                    IntentKind::CastVote(VoteTopic::Hook) | IntentKind::CastVote(VoteTopic::Seat)
                ) {
                    return Err(wrong_input(intent, FormField::TargetLayer));
                }
                if !(1..=2).contains(&layer) {
                    return Err(ValidationError::invalid(FormField::TargetLayer, "Layer should be 1 or 2"));
                }
                self.target_layer = layer;
                Ok(None)
            }
            AckInput::Destination(value) => {
                if !matches!(intent.kind, IntentKind::NftTransfer | IntentKind::NftCreateOffer) {
                    return Err(wrong_input(intent, FormField::Destination));
                }
                let value = value.trim().to_string();
                if value.is_empty() {
                    return Ok(Some(intent.amend_payload(|tx| {
                        tx.remove("Destination");
                    })));
                }
                if !address::is_valid_address(&value) {
                    return Err(ValidationError::invalid(FormField::Destination, "Invalid address"));
                }
                Ok(Some(intent.amend_payload(|tx| {
                    tx.insert("Destination".into(), Value::String(value));
                })))
            }
            AckInput::Amount(value) => {
                if intent.kind != IntentKind::NftCreateOffer {
                    return Err(wrong_input(intent, FormField::Amount));
                }
                let value = value.trim().to_string();
                if value.is_empty() {
                    return Ok(Some(intent.amend_payload(|tx| {
                        tx.remove("Amount");
                    })));
                }
                if !value.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(ValidationError::invalid(
                        FormField::Amount,
                        "Price should be a whole number of drops",
                    ));
                }
                Ok(Some(intent.amend_payload(|tx| {
                    tx.insert("Amount".into(), Value::String(value));
                })))
            }
            AckInput::Domain(value) => {
                expect_kind(intent, IntentKind::SetDomain, FormField::Domain)?;
                self.accepted = false;
                let domain = value.trim();
                if domain.is_empty() {
                    return Err(ValidationError::invalid(FormField::Domain, "Enter a domain"));
                }
                let encoded = hex::encode_upper(domain.as_bytes());
                self.accepted = true;
                Ok(Some(intent.amend_payload(|tx| {
                    tx.insert("Domain".into(), Value::String(encoded));
                })))
            }
        }
    }

    /// Consent check before submission; builds the vote parameters that
    /// depend on several selectors.
    pub fn finalize(&self, intent: &SignIntent) -> Result<SignIntent, ValidationError> {
        if !intent.requires_acknowledgment {
            return Ok(intent.clone());
        }
        if !self.accepted {
            return Err(ValidationError::AcknowledgmentRequired);
        }

        match intent.kind {
            IntentKind::CastVote(VoteTopic::Hook) => {
                let value = match (self.erase, &self.hook_value) {
                    (true, _) => ERASED_HOOK.to_string(),
                    (false, Some(value)) => value.clone(),
                    (false, None) => return Err(missing(intent, FormField::HookValue)),
                };
                Ok(with_vote(intent, self.target_layer, &hook::hook_topic(self.hook_topic), &value))
            }
            IntentKind::CastVote(VoteTopic::Seat) => {
                let value = if self.erase {
                    VACATED_SEAT.to_string()
                } else {
                    self.seat_address
                        .as_deref()
                        .and_then(address::account_id_hex)
                        .ok_or_else(|| missing(intent, FormField::SeatAddress))?
                };
                Ok(with_vote(intent, self.target_layer, &hook::seat_topic(self.seat), &value))
            }
            _ => Ok(intent.clone()),
        }
    }
}

fn with_vote(intent: &SignIntent, layer: u8, topic: &str, value: &str) -> SignIntent {
    let params = hook::vote_parameters(layer, topic, value);
    intent.amend_payload(|tx| {
        tx.insert("HookParameters".into(), params);
    })
}

fn expect_kind(intent: &SignIntent, kind: IntentKind, field: FormField) -> Result<(), ValidationError> {
    if intent.kind == kind {
        Ok(())
    } else {
        Err(wrong_input(intent, field))
    }
}

fn wrong_input(intent: &SignIntent, field: FormField) -> ValidationError {
    ValidationError::invalid(field, format!("not an input of a {}", intent.kind.name()))
}

fn missing(intent: &SignIntent, field: FormField) -> ValidationError {
    ValidationError::MissingField {
        kind: intent.kind.name().to_string(),
        field,
    }
}
