//! Detached-signature post-processing routines.
//!
//! - `pro-add-address`: `POST {api}/v2/user/addresses`
//! - `set-avatar`: `POST {api}/v2/avatar`
//!
//! Both answer `{ "error": "..." }` on failure; that text is surfaced verbatim.

use async_trait::async_trait;
use serde::Deserialize;

use crate::channels::types::PostRequest;
use crate::channels::{http_client, join_url, PostProcessor};
use crate::config::PostActionConfig;
use crate::error::{AdapterError, AdapterResult};
use crate::intent::PostAction;
use crate::resilience::with_timeout;

#[derive(Debug, Default, Deserialize)]
struct PostResponse {
    #[serde(default)]
    error: Option<String>,
}

pub struct HttpPostProcessor {
    client: reqwest::Client,
    api_url: String,
    timeout_secs: u64,
}

impl HttpPostProcessor {
    pub fn new(config: &PostActionConfig) -> AdapterResult<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_url: config.api_url.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn route(action: PostAction) -> &'static str {
        match action {
            PostAction::ProAddAddress => "v2/user/addresses",
            PostAction::SetAvatar => "v2/avatar",
        }
    }
}

#[async_trait]
impl PostProcessor for HttpPostProcessor {
    async fn run(&self, action: PostAction, request: &PostRequest) -> AdapterResult<()> {
        let url = join_url(&self.api_url, Self::route(action));
        with_timeout(self.timeout_secs, async {
            let response = self.client.post(&url).json(request).send().await?;
            let status = response.status();
            let body = response.text().await?;
            let parsed: PostResponse = serde_json::from_str(&body).unwrap_or_default();
            if let Some(error) = parsed.error {
                return Err(AdapterError::Provider(error));
            }
            if !status.is_success() {
                return Err(AdapterError::Status {
                    code: status.as_u16(),
                    body,
                });
            }
            Ok(())
        })
        .await
    }
}
