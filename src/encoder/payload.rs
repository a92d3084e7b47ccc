//! Wire-level signing payload accepted by the wallet-provider backend.

use serde::{Deserialize, Deserializer, Serialize};

use crate::intent::{IntentData, TxJson};

/// Payload posted to the wallet provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignPayload {
    pub options: PayloadOptions,
    pub txjson: TxJson,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_token: Option<String>,
    pub custom_meta: CustomMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadOptions {
    /// Lifetime in minutes.
    pub expire: u32,
    /// `Some(false)` for detached signatures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_url: Option<ReturnUrl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_network: Option<String>,
}

/// Where the wallet app sends the user after signing on a mobile device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnUrl {
    pub app: String,
}

/// Metadata echoed back by the provider with the signed result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomMeta {
    #[serde(default, deserialize_with = "null_as_default")]
    pub blob: MetaBlob,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaBlob {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<IntentData>,
}

impl MetaBlob {
    pub fn is_sign_only(&self) -> bool {
        self.data.as_ref().map(|d| d.sign_only).unwrap_or(false)
    }

    pub fn action(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.action.as_deref())
    }
}

/// Providers echo absent metadata as `null`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
