//! Wallet-provider (Xaman) payload API client.
//!
//! - `POST   {api}/payload`        create a signing payload
//! - `DELETE {api}/payload/{uuid}` void a payload
//! - `GET    {api}/payload/{uuid}` fetch the signed result

use async_trait::async_trait;

use crate::channels::types::{CreatedPayload, SignedResult, SubmissionReceipt};
use crate::channels::{check_status, http_client, join_url, WalletProvider};
use crate::config::ProviderConfig;
use crate::encoder::SignPayload;
use crate::error::{AdapterError, AdapterResult};
use crate::resilience::with_timeout;

pub struct XamanClient {
    client: reqwest::Client,
    api_url: String,
    timeout_secs: u64,
}

impl XamanClient {
    pub fn new(config: &ProviderConfig) -> AdapterResult<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_url: config.api_url.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn payload_url(&self, reference: Option<&str>) -> String {
        match reference {
            Some(reference) => join_url(&self.api_url, &format!("payload/{}", reference)),
            None => join_url(&self.api_url, "payload"),
        }
    }
}

#[async_trait]
impl WalletProvider for XamanClient {
    async fn create_payload(&self, payload: &SignPayload) -> AdapterResult<SubmissionReceipt> {
        let url = self.payload_url(None);
        let created = with_timeout(self.timeout_secs, async {
            let response = self.client.post(&url).json(payload).send().await?;
            // The provider reports rejections as `{ "error": ... }`, often with a 4xx
            let status = response.status();
            let body = response.text().await?;
            match serde_json::from_str::<CreatedPayload>(&body) {
                Ok(created) => Ok(created),
                Err(_) if !status.is_success() => Err(AdapterError::Status {
                    code: status.as_u16(),
                    body,
                }),
                Err(e) => Err(AdapterError::Decode(e.to_string())),
            }
        })
        .await?;

        let receipt = created.into_receipt()?;
        tracing::debug!(reference = %receipt.reference, pushed = receipt.pushed, "Payload created");
        Ok(receipt)
    }

    async fn cancel_payload(&self, reference: &str) -> AdapterResult<()> {
        let url = self.payload_url(Some(reference));
        with_timeout(self.timeout_secs, async {
            let response = self.client.delete(&url).send().await?;
            check_status(response).await?;
            Ok::<_, AdapterError>(())
        })
        .await
    }

    async fn fetch_signed(&self, reference: &str) -> AdapterResult<SignedResult> {
        let url = self.payload_url(Some(reference));
        with_timeout(self.timeout_secs, async {
            let response = check_status(self.client.get(&url).send().await?).await?;
            Ok::<_, AdapterError>(response.json::<SignedResult>().await?)
        })
        .await
    }
}
