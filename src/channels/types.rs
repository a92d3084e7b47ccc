//! Wire types exchanged with the external collaborators.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::encoder::payload::null_as_default;
use crate::encoder::CustomMeta;
use crate::error::AdapterError;

/// Result of creating a payload at the wallet provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    /// Session reference issued by the provider.
    pub reference: String,
    pub qr_image_url: Option<String>,
    /// Deep link opening the wallet app (used on mobile).
    pub deep_link_url: Option<String>,
    /// Websocket URL streaming status events for this payload.
    pub websocket_url: Option<String>,
    /// The provider pushed a notification to a device holding the user token.
    pub pushed: bool,
}

/// Raw provider response to a payload creation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatedPayload {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub next: Option<NextRefs>,
    #[serde(default)]
    pub refs: Option<PayloadRefs>,
    #[serde(default)]
    pub pushed: bool,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NextRefs {
    #[serde(default)]
    pub always: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayloadRefs {
    #[serde(default)]
    pub qr_png: Option<String>,
    #[serde(default)]
    pub websocket_status: Option<String>,
}

impl CreatedPayload {
    /// Provider errors are surfaced with their text verbatim.
    pub fn into_receipt(self) -> Result<SubmissionReceipt, AdapterError> {
        if let Some(error) = self.error {
            let text = match error {
                Value::String(text) => text,
                Value::Object(map) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| Value::Object(map).to_string()),
                other => other.to_string(),
            };
            return Err(AdapterError::Provider(text));
        }

        let reference = self
            .uuid
            .filter(|uuid| !uuid.is_empty())
            .ok_or_else(|| AdapterError::Decode("payload response without uuid".to_string()))?;
        let refs = self.refs.unwrap_or_default();

        Ok(SubmissionReceipt {
            reference,
            qr_image_url: refs.qr_png,
            deep_link_url: self.next.and_then(|next| next.always),
            websocket_url: refs.websocket_status,
            pushed: self.pushed,
        })
    }
}

/// Typed event from the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PushEvent {
    /// The wallet app opened the request.
    Opened,
    /// Signed; the result must be fetched by reference.
    Signed { reference: String },
    /// Rejected in the wallet app.
    Canceled,
    /// Remaining lifetime heartbeat.
    Expiry { seconds: i64 },
    /// Anything else (welcome banners, keepalives).
    Other,
}

impl PushEvent {
    pub fn parse(text: &str) -> PushEvent {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            return PushEvent::Other;
        };

        if value.get("status").and_then(Value::as_str) == Some("canceled") {
            return PushEvent::Canceled;
        }
        if value.get("opened").and_then(Value::as_bool) == Some(true) {
            return PushEvent::Opened;
        }
        match value.get("signed").and_then(Value::as_bool) {
            Some(true) => {
                let reference = value
                    .get("payload_uuidv4")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                return PushEvent::Signed { reference };
            }
            Some(false) => return PushEvent::Canceled,
            None => {}
        }
        if let Some(seconds) = value.get("expires_in_seconds").and_then(Value::as_i64) {
            return PushEvent::Expiry { seconds };
        }
        PushEvent::Other
    }

    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::Opened => "opened",
            PushEvent::Signed { .. } => "signed",
            PushEvent::Canceled => "canceled",
            PushEvent::Expiry { .. } => "expiry",
            PushEvent::Other => "other",
        }
    }
}

/// Signed result fetched from the wallet provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignedResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub application: ApplicationInfo,
    #[serde(default, deserialize_with = "null_as_default")]
    pub response: SignedResponse,
    #[serde(default, deserialize_with = "null_as_default")]
    pub payload: PayloadInfo,
    #[serde(default, deserialize_with = "null_as_default")]
    pub custom_meta: CustomMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    #[serde(default)]
    pub issued_user_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignedResponse {
    /// Signed transaction blob.
    #[serde(default)]
    pub hex: Option<String>,
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub signer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadInfo {
    #[serde(default)]
    pub tx_type: Option<String>,
}

impl SignedResult {
    /// NFT-domain results need a crawler confirmation wait.
    pub fn is_nft_operation(&self) -> bool {
        self.payload
            .tx_type
            .as_deref()
            .map(|t| t.contains("NFToken") || t.contains("URIToken"))
            .unwrap_or(false)
    }
}

/// Ledger view of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionStatus {
    #[serde(default)]
    pub validated: bool,
    #[serde(default, rename = "inLedger")]
    pub in_ledger: Option<u64>,
    #[serde(default)]
    pub ledger_index: Option<u64>,
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMeta {
    #[serde(default, rename = "AffectedNodes")]
    pub affected_nodes: Vec<Value>,
}

impl TransactionStatus {
    /// Ledger sequence the transaction was included in.
    pub fn included_ledger(&self) -> Option<u64> {
        self.in_ledger
            .filter(|seq| *seq > 0)
            .or(self.ledger_index.filter(|seq| *seq > 0))
    }

    /// Id of the first ledger object of `entry_type` this transaction created.
    pub fn first_created(&self, entry_type: &str) -> Option<String> {
        self.meta
            .as_ref()?
            .affected_nodes
            .iter()
            .filter_map(|node| node.get("CreatedNode"))
            .find(|created| created.get("LedgerEntryType").and_then(Value::as_str) == Some(entry_type))
            .and_then(|created| created.get("LedgerIndex"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Crawler progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlerStatus {
    #[serde(rename = "ledgerIndex")]
    pub ledger_index: u64,
}

/// Body sent to a detached-signature post-processing routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub blob: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_event_parse() {
        assert_eq!(PushEvent::parse(r#"{"opened":true}"#), PushEvent::Opened);
        assert_eq!(
            PushEvent::parse(r#"{"signed":true,"payload_uuidv4":"abc","txid":"x"}"#),
            PushEvent::Signed { reference: "abc".into() }
        );
        assert_eq!(PushEvent::parse(r#"{"signed":false}"#), PushEvent::Canceled);
        assert_eq!(PushEvent::parse(r#"{"status":"canceled"}"#), PushEvent::Canceled);
        assert_eq!(
            PushEvent::parse(r#"{"expires_in_seconds":30}"#),
            PushEvent::Expiry { seconds: 30 }
        );
        assert_eq!(
            PushEvent::parse(r#"{"expires_in_seconds":-3}"#),
            PushEvent::Expiry { seconds: -3 }
        );
        assert_eq!(PushEvent::parse(r#"{"message":"Welcome"}"#), PushEvent::Other);
        assert_eq!(PushEvent::parse("not json"), PushEvent::Other);
    }

    #[test]
    fn test_created_payload() {
        let created: CreatedPayload = serde_json::from_value(json!({
            "uuid": "ref-1",
            "next": {"always": "https://xumm.app/sign/ref-1"},
            "refs": {"qr_png": "https://xumm.app/sign/ref-1_q.png", "websocket_status": "wss://xumm.app/sign/ref-1"},
            "pushed": true
        }))
        .unwrap();
        let receipt = created.into_receipt().unwrap();
        assert_eq!(receipt.reference, "ref-1");
        assert_eq!(receipt.deep_link_url.as_deref(), Some("https://xumm.app/sign/ref-1"));
        assert_eq!(receipt.websocket_url.as_deref(), Some("wss://xumm.app/sign/ref-1"));
        assert!(receipt.pushed);
    }

    #[test]
    fn test_created_payload_error_is_verbatim() {
        let created: CreatedPayload =
            serde_json::from_value(json!({"error": "Invalid transaction"})).unwrap();
        assert_eq!(
            created.into_receipt(),
            Err(AdapterError::Provider("Invalid transaction".into()))
        );

        let created: CreatedPayload = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(created.into_receipt(), Err(AdapterError::Decode(_))));
    }

    #[test]
    fn test_transaction_status() {
        let status: TransactionStatus = serde_json::from_value(json!({
            "validated": true,
            "ledger_index": 1200,
            "meta": {"AffectedNodes": [
                {"ModifiedNode": {"LedgerEntryType": "AccountRoot"}},
                {"CreatedNode": {"LedgerEntryType": "DirectoryNode", "LedgerIndex": "DIR"}},
                {"CreatedNode": {"LedgerEntryType": "URIToken", "LedgerIndex": "URI1"}},
                {"CreatedNode": {"LedgerEntryType": "URIToken", "LedgerIndex": "URI2"}}
            ]}
        }))
        .unwrap();
        assert_eq!(status.included_ledger(), Some(1200));
        assert_eq!(status.first_created("URIToken").as_deref(), Some("URI1"));
        assert_eq!(status.first_created("NFTokenOffer"), None);
    }

    #[test]
    fn test_signed_result_kind() {
        let signed: SignedResult = serde_json::from_value(json!({
            "response": {"txid": "ABC", "account": "rAcc"},
            "payload": {"tx_type": "URITokenBuy"},
            "application": null,
            "custom_meta": {"identifier": null, "blob": {"broker": "bidds"}, "instruction": null}
        }))
        .unwrap();
        assert!(signed.is_nft_operation());
        assert_eq!(signed.custom_meta.blob.broker.as_deref(), Some("bidds"));
    }
}
