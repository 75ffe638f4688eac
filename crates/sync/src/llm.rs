//! HTTP-backed label suggestion for the classifier fallback.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use crate::classify::IntentLlm;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for a label-suggestion endpoint (`POST {base}/classify`).
///
/// The classifier already bounds every call with its own timeout and treats
/// any error as "keep the rule label", so this client stays thin: no retries,
/// no streaming.
pub struct HttpIntentLlm {
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    label: String,
}

impl HttpIntentLlm {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl IntentLlm for HttpIntentLlm {
    async fn suggest_intent(&self, text: &str) -> Result<String> {
        let mut request = self
            .client
            .post(format!("{}/classify", self.base_url))
            .json(&json!({ "model": self.model, "input": text }));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.context("classify request failed")?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("classify endpoint returned {status}");
        }

        let body: ClassifyResponse =
            response.json().await.context("classify response was not valid json")?;
        Ok(body.label)
    }
}
