//! Sign intent types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol-level transaction fields, kept as the ledger's JSON form.
pub type TxJson = serde_json::Map<String, Value>;

/// Transaction type used when the intent carries no explicit transaction.
pub const LOGIN_TRANSACTION_TYPE: &str = "SignIn";

/// Redirect name asking for the id of the ledger object the transaction creates.
pub const OBJECT_REDIRECT: &str = "nft";

/// Ledger entry type reported back for `OBJECT_REDIRECT`.
pub const OBJECT_CALLBACK_ENTRY: &str = "URIToken";

/// Vote topics offered by the governance hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteTopic {
    RewardDelay,
    RewardRate,
    Hook,
    Seat,
}

/// What the user is being asked to sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Login,
    Transaction,
    CastVote(VoteTopic),
    SetDomain,
    SetAvatar,
    NftTransfer,
    NftCreateOffer,
    NftAcceptOffer,
    NftBurn,
    Other,
}

impl IntentKind {
    /// Derive the kind from an explicit action name or the transaction type.
    pub fn classify(action: Option<&str>, tx: Option<&TxJson>) -> Self {
        if let Some(action) = action {
            return match action {
                "castVoteRewardDelay" => IntentKind::CastVote(VoteTopic::RewardDelay),
                "castVoteRewardRate" => IntentKind::CastVote(VoteTopic::RewardRate),
                "castVoteHook" => IntentKind::CastVote(VoteTopic::Hook),
                "castVoteSeat" => IntentKind::CastVote(VoteTopic::Seat),
                "setDomain" => IntentKind::SetDomain,
                "setAvatar" => IntentKind::SetAvatar,
                "nftTransfer" => IntentKind::NftTransfer,
                _ => IntentKind::Other,
            };
        }

        let Some(tx) = tx else {
            return IntentKind::Login;
        };
        match tx.get("TransactionType").and_then(Value::as_str) {
            None | Some(LOGIN_TRANSACTION_TYPE) => IntentKind::Login,
            Some("NFTokenAcceptOffer") => IntentKind::NftAcceptOffer,
            Some("NFTokenCreateOffer") | Some("URITokenCreateSellOffer") => IntentKind::NftCreateOffer,
            Some("NFTokenBurn") => IntentKind::NftBurn,
            Some(_) => IntentKind::Transaction,
        }
    }

    pub fn is_vote(&self) -> bool {
        matches!(self, IntentKind::CastVote(_))
    }

    /// Kinds whose consent comes from validated form input rather than a checkbox.
    pub fn consent_from_input(&self) -> bool {
        matches!(self, IntentKind::CastVote(_) | IntentKind::SetDomain)
    }

    pub fn name(&self) -> &'static str {
        match self {
            IntentKind::Login => "login",
            IntentKind::Transaction => "transaction",
            IntentKind::CastVote(VoteTopic::RewardDelay) => "reward delay vote",
            IntentKind::CastVote(VoteTopic::RewardRate) => "reward rate vote",
            IntentKind::CastVote(VoteTopic::Hook) => "hook vote",
            IntentKind::CastVote(VoteTopic::Seat) => "seat vote",
            IntentKind::SetDomain => "domain update",
            IntentKind::SetAvatar => "avatar update",
            IntentKind::NftTransfer => "NFT transfer",
            IntentKind::NftCreateOffer => "NFT offer",
            IntentKind::NftAcceptOffer => "NFT offer acceptance",
            IntentKind::NftBurn => "NFT burn",
            IntentKind::Other => "request",
        }
    }
}

/// Local routines that consume a detached signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostAction {
    /// Register an address for ownership verification.
    #[serde(rename = "pro-add-address")]
    ProAddAddress,
    /// Publish an on-chain avatar.
    #[serde(rename = "set-avatar")]
    SetAvatar,
}

impl PostAction {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "pro-add-address" => Some(PostAction::ProAddAddress),
            "set-avatar" => Some(PostAction::SetAvatar),
            _ => None,
        }
    }

    /// Routines whose result is processed asynchronously server-side.
    pub fn needs_settle_delay(&self) -> bool {
        matches!(self, PostAction::SetAvatar)
    }
}

/// Custom data carried through the wallet provider and returned with the result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentData {
    /// Detached signature: the provider must not broadcast.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sign_only: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Immutable request to sign. Amendments produce a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignIntent {
    pub kind: IntentKind,
    pub payload: Option<TxJson>,
    pub requires_acknowledgment: bool,
    /// Symbolic post-success destination ("nfts", "account", "nft").
    pub redirect: Option<String>,
    /// External settlement service name.
    pub broker: Option<String>,
    pub data: Option<IntentData>,
    /// Price of the offer being accepted; "0" marks a free transfer.
    pub offer_amount: Option<String>,
    /// Offer restricted to a destination account.
    pub private_offer: bool,
    /// Governance table layer (1 or 2).
    pub layer: Option<u8>,
    /// Ledger entry type whose created object id is reported back.
    pub object_callback: Option<String>,
}

impl SignIntent {
    pub fn new(kind: IntentKind, payload: Option<TxJson>) -> Self {
        let mut intent = Self {
            kind,
            payload,
            requires_acknowledgment: false,
            redirect: None,
            broker: None,
            data: None,
            offer_amount: None,
            private_offer: false,
            layer: None,
            object_callback: None,
        };
        intent.requires_acknowledgment = intent.derive_acknowledgment();
        intent
    }

    /// Plain login request.
    pub fn login() -> Self {
        Self::new(IntentKind::Login, None)
    }

    /// Intent for a raw transaction; the kind follows its `TransactionType`.
    pub fn transaction(tx: TxJson) -> Self {
        let kind = IntentKind::classify(None, Some(&tx));
        Self::new(kind, Some(tx))
    }

    pub fn with_redirect(mut self, redirect: impl Into<String>) -> Self {
        let redirect = redirect.into();
        if redirect == OBJECT_REDIRECT {
            self.object_callback = Some(OBJECT_CALLBACK_ENTRY.to_string());
        }
        self.redirect = Some(redirect);
        self
    }

    pub fn with_broker(mut self, broker: impl Into<String>) -> Self {
        self.broker = Some(broker.into());
        self
    }

    pub fn with_data(mut self, data: IntentData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_offer_amount(mut self, amount: impl Into<String>) -> Self {
        self.offer_amount = Some(amount.into());
        self.requires_acknowledgment = self.derive_acknowledgment();
        self
    }

    pub fn with_private_offer(mut self, private_offer: bool) -> Self {
        self.private_offer = private_offer;
        self
    }

    pub fn with_layer(mut self, layer: u8) -> Self {
        self.layer = Some(layer);
        self
    }

    /// New intent with the payload changed by `f`; `self` is left untouched.
    pub fn amend_payload(&self, f: impl FnOnce(&mut TxJson)) -> SignIntent {
        let mut amended = self.clone();
        let payload = amended.payload.get_or_insert_with(TxJson::new);
        f(payload);
        amended
    }

    /// Detached signature (signed but not broadcast).
    pub fn is_sign_only(&self) -> bool {
        self.data.as_ref().map(|d| d.sign_only).unwrap_or(false)
    }

    pub fn transaction_type(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|tx| tx.get("TransactionType"))
            .and_then(Value::as_str)
    }

    fn derive_acknowledgment(&self) -> bool {
        match self.kind {
            IntentKind::NftAcceptOffer => self.offer_amount.as_deref() != Some("0"),
            IntentKind::CastVote(_)
            | IntentKind::SetDomain
            | IntentKind::SetAvatar
            | IntentKind::NftTransfer
            | IntentKind::NftCreateOffer
            | IntentKind::NftBurn => true,
            IntentKind::Login | IntentKind::Transaction | IntentKind::Other => false,
        }
    }
}

/// Sign request as submitted by a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub request: Option<TxJson>,
    #[serde(default)]
    pub redirect: Option<String>,
    #[serde(default)]
    pub broker: Option<String>,
    #[serde(default)]
    pub data: Option<IntentData>,
    #[serde(default)]
    pub offer_amount: Option<String>,
    #[serde(default)]
    pub private_offer: bool,
    #[serde(default)]
    pub layer: Option<u8>,
}

impl From<SignRequest> for SignIntent {
    fn from(req: SignRequest) -> Self {
        let kind = IntentKind::classify(req.action.as_deref(), req.request.as_ref());
        let mut intent = SignIntent::new(kind, req.request).with_private_offer(req.private_offer);
        if let Some(redirect) = req.redirect {
            intent = intent.with_redirect(redirect);
        }
        if let Some(broker) = req.broker {
            intent = intent.with_broker(broker);
        }
        if let Some(data) = req.data {
            intent = intent.with_data(data);
        }
        if let Some(amount) = req.offer_amount {
            intent = intent.with_offer_amount(amount);
        }
        if let Some(layer) = req.layer {
            intent = intent.with_layer(layer);
        }
        intent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tx(value: Value) -> TxJson {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_classify() {
        assert_eq!(IntentKind::classify(None, None), IntentKind::Login);
        assert_eq!(
            IntentKind::classify(Some("castVoteSeat"), None),
            IntentKind::CastVote(VoteTopic::Seat)
        );
        assert_eq!(
            IntentKind::classify(None, Some(&tx(json!({"TransactionType": "URITokenCreateSellOffer"})))),
            IntentKind::NftCreateOffer
        );
        assert_eq!(
            IntentKind::classify(None, Some(&tx(json!({"TransactionType": "Payment"})))),
            IntentKind::Transaction
        );
        assert_eq!(IntentKind::classify(Some("somethingElse"), None), IntentKind::Other);
    }

    #[test]
    fn test_free_accept_skips_acknowledgment() {
        let accept = SignIntent::transaction(tx(json!({"TransactionType": "NFTokenAcceptOffer"})));
        assert!(accept.requires_acknowledgment);
        assert!(!accept.clone().with_offer_amount("0").requires_acknowledgment);
        assert!(accept.with_offer_amount("10").requires_acknowledgment);
    }

    #[test]
    fn test_amend_leaves_original() {
        let intent = SignIntent::transaction(tx(json!({"TransactionType": "Payment"})));
        let amended = intent.amend_payload(|p| {
            p.insert("Destination".into(), json!("rDest"));
        });
        assert!(intent.payload.as_ref().unwrap().get("Destination").is_none());
        assert_eq!(amended.payload.unwrap()["Destination"], json!("rDest"));
    }

    #[test]
    fn test_from_request() {
        let req: SignRequest = serde_json::from_value(json!({
            "request": {"TransactionType": "NFTokenCreateOffer", "Flags": 1},
            "redirect": "nft",
            "privateOffer": true,
            "data": {"signOnly": false}
        }))
        .unwrap();
        let intent = SignIntent::from(req);
        assert_eq!(intent.kind, IntentKind::NftCreateOffer);
        assert!(intent.requires_acknowledgment);
        assert!(intent.private_offer);
        assert_eq!(intent.object_callback.as_deref(), Some("URIToken"));
        assert!(!intent.is_sign_only());
    }

    #[test]
    fn test_post_action_names() {
        assert_eq!(PostAction::parse("set-avatar"), Some(PostAction::SetAvatar));
        assert_eq!(PostAction::parse("unknown"), None);
        assert!(PostAction::SetAvatar.needs_settle_delay());
        assert!(!PostAction::ProAddAddress.needs_settle_delay());
    }
}
