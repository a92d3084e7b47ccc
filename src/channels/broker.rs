//! Broker settlement lookups.
//!
//! Only `bidds` exposes a lookup: `GET {api}/v2/bidds/transaction/broker/{txid}`
//! answering `{ "status": bool, "data": { "hash": ... } | [ ... ] }`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::channels::{check_status, http_client, join_url, BrokerLookup};
use crate::config::BrokerConfig;
use crate::error::{AdapterError, AdapterResult};
use crate::resilience::with_timeout;

pub const BIDDS: &str = "bidds";

#[derive(Debug, Default, Deserialize)]
struct BrokerResponse {
    #[serde(default)]
    status: bool,
    #[serde(default)]
    data: Value,
}

impl BrokerResponse {
    fn settlement_hash(&self) -> Option<String> {
        if !self.status {
            return None;
        }
        let hash_of = |v: &Value| v.get("hash").and_then(Value::as_str).map(str::to_string);
        match &self.data {
            Value::Array(items) => items.iter().find_map(hash_of),
            other => hash_of(other),
        }
    }
}

pub struct HttpBrokerLookup {
    client: reqwest::Client,
    api_url: String,
    timeout_secs: u64,
}

impl HttpBrokerLookup {
    pub fn new(config: &BrokerConfig) -> AdapterResult<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_url: config.api_url.clone(),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl BrokerLookup for HttpBrokerLookup {
    async fn settlement_hash(&self, broker: &str, txid: &str) -> AdapterResult<Option<String>> {
        if broker != BIDDS {
            tracing::debug!(broker = %broker, "No settlement lookup for broker");
            return Ok(None);
        }

        let url = join_url(&self.api_url, &format!("v2/bidds/transaction/broker/{}", txid));
        with_timeout(self.timeout_secs, async {
            let response = check_status(self.client.get(&url).send().await?).await?;
            let body: BrokerResponse = response.json().await?;
            Ok::<_, AdapterError>(body.settlement_hash())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Option<String> {
        serde_json::from_value::<BrokerResponse>(value).unwrap().settlement_hash()
    }

    #[test]
    fn test_settlement_hash_shapes() {
        assert_eq!(
            parse(json!({"status": true, "data": {"hash": "H1"}})).as_deref(),
            Some("H1")
        );
        assert_eq!(
            parse(json!({"status": true, "data": [{"Amount": "1"}, {"hash": "H2"}]})).as_deref(),
            Some("H2")
        );
        assert_eq!(parse(json!({"status": false, "data": {"hash": "H1"}})), None);
        assert_eq!(parse(json!({"status": true, "data": []})), None);
        assert_eq!(parse(json!({})), None);
    }
}
