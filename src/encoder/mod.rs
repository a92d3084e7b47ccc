//! Payload Encoder.
//!
//! Turns a finalized `SignIntent` into the wire payload for the wallet
//! provider. Pure function: no I/O, no shared state.
//!
//! # Responsibilities
//! - Default the transaction type to the login marker
//! - Append the site memo and source tag on broadcast intents
//! - Stamp `NetworkID` on networks that require it
//! - Fill `Account` from the connected address when absent
//! - Reject intents missing a field their kind requires
//!
//! # Data Flow
//! ```text
//! SignIntent + EncoderContext ──▶ encode() ──▶ SignPayload ──▶ WalletProvider::create_payload
//! ```

pub mod payload;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{FormField, ValidationError};
use crate::intent::{IntentKind, SignIntent, TxJson, LOGIN_TRANSACTION_TYPE};

pub use payload::{CustomMeta, MetaBlob, PayloadOptions, ReturnUrl, SignPayload};

/// Source identifier stamped on every broadcast transaction.
pub const SOURCE_TAG: u32 = 42697468;

/// Networks whose transactions must carry an explicit `NetworkID`.
const NETWORK_ID_REQUIRED: [u32; 2] = [21337, 21338];

/// Where the signing request was started from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientContext {
    /// Constrained device: redirect to the wallet app instead of showing a QR.
    pub mobile: bool,
    /// Page the wallet app should return to on mobile.
    pub return_url: Option<String>,
}

/// Environment the encoder stamps into the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderContext {
    pub network_id: u32,
    pub site_url: String,
    /// Currently connected address.
    pub account: Option<String>,
    /// Previously issued user token (desktop push).
    pub user_token: Option<String>,
    pub expiry_minutes: u32,
    /// Return page used when the client did not name one.
    pub default_return_url: Option<String>,
    pub client: ClientContext,
}

/// Build the signing payload for `intent`.
pub fn encode(intent: &SignIntent, ctx: &EncoderContext) -> Result<SignPayload, ValidationError> {
    let mut tx = intent.payload.clone().unwrap_or_default();
    if intent.is_sign_only() || !tx.contains_key("TransactionType") {
        tx.insert("TransactionType".into(), json!(LOGIN_TRANSACTION_TYPE));
    }

    validate_structure(intent, &mut tx)?;

    if !intent.is_sign_only() {
        append_site_memo(&mut tx, &site_host(&ctx.site_url));
        tx.insert("SourceTag".into(), json!(SOURCE_TAG));
    }

    if !tx.contains_key("Account") {
        if let Some(account) = &ctx.account {
            tx.insert("Account".into(), json!(account));
        }
    }

    if NETWORK_ID_REQUIRED.contains(&ctx.network_id) {
        tx.insert("NetworkID".into(), json!(ctx.network_id));
    }

    let is_payment = tx.get("TransactionType").and_then(Value::as_str) == Some("Payment");

    let mut options = PayloadOptions {
        expire: ctx.expiry_minutes,
        submit: intent.is_sign_only().then_some(false),
        return_url: None,
        force_network: force_network(ctx.network_id).map(str::to_string),
    };

    let mut user_token = None;
    if ctx.client.mobile {
        let base = ctx
            .client
            .return_url
            .clone()
            .or_else(|| ctx.default_return_url.clone())
            .unwrap_or_else(|| format!("{}/", ctx.site_url.trim_end_matches('/')));
        let separator = if base.contains('?') { '&' } else { '?' };
        let mut app = format!("{}{}uuid={{id}}", base, separator);
        if is_payment {
            app.push_str("&receipt=true");
        }
        options.return_url = Some(ReturnUrl { app });
    } else {
        user_token = ctx.user_token.clone();
    }

    Ok(SignPayload {
        options,
        txjson: tx,
        user_token,
        custom_meta: CustomMeta {
            blob: MetaBlob {
                redirect: intent.redirect.clone(),
                broker: intent.broker.clone(),
                data: intent.data.clone(),
            },
        },
    })
}

fn validate_structure(intent: &SignIntent, tx: &mut TxJson) -> Result<(), ValidationError> {
    let missing = |field| ValidationError::MissingField {
        kind: intent.kind.name().to_string(),
        field,
    };
    let has = |tx: &TxJson, key: &str| match tx.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    };

    match intent.kind {
        IntentKind::NftTransfer => {
            tx.insert("Amount".into(), json!("0"));
            if !has(tx, "Destination") {
                return Err(missing(FormField::Destination));
            }
        }
        IntentKind::NftCreateOffer => {
            if intent.private_offer && !has(tx, "Destination") {
                return Err(missing(FormField::Destination));
            }
            if !has(tx, "Amount") {
                return Err(missing(FormField::Amount));
            }
        }
        IntentKind::CastVote(_) => {
            let has_params = tx
                .get("HookParameters")
                .and_then(Value::as_array)
                .map(|params| !params.is_empty())
                .unwrap_or(false);
            if !has_params {
                return Err(missing(FormField::Transaction));
            }
        }
        IntentKind::SetDomain => {
            if !tx.contains_key("Domain") {
                return Err(missing(FormField::Domain));
            }
        }
        _ => {}
    }
    Ok(())
}

/// Host part of the site URL, scheme stripped.
fn site_host(site_url: &str) -> String {
    match url::Url::parse(site_url) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => site_url.to_string(),
        },
        Err(_) => site_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string(),
    }
}

/// Append the site memo unless an identical one is already present.
fn append_site_memo(tx: &mut TxJson, host: &str) {
    let memo_data = hex::encode_upper(host.as_bytes());
    let memo = json!({ "Memo": { "MemoData": memo_data } });

    match tx.get_mut("Memos").and_then(Value::as_array_mut) {
        Some(memos) => {
            let present = memos
                .iter()
                .any(|m| m["Memo"]["MemoData"].as_str() == Some(memo_data.as_str()));
            if !present {
                memos.push(memo);
            }
        }
        None => {
            tx.insert("Memos".into(), Value::Array(vec![memo]));
        }
    }
}

fn force_network(network_id: u32) -> Option<&'static str> {
    match network_id {
        0 => Some("MAINNET"),
        1 => Some("TESTNET"),
        2 => Some("DEVNET"),
        _ => None,
    }
}
