//! Summary generator collaborator.
//!
//! The build only sees the [`SummaryGenerator`] trait. The bundled
//! [`HttpSummarizer`] posts `{model, code}` to a configured endpoint and
//! expects `{"summary": "..."}` back.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{SummaryConfig, SummaryProvider};

/// Produces a one-paragraph summary for a code snippet
pub trait SummaryGenerator: Send + Sync {
    fn summarize(&self, code: &str, timeout: Duration) -> anyhow::Result<String>;
}

/// HTTP-backed generator using a blocking `reqwest` client
pub struct HttpSummarizer {
    endpoint: String,
    model: Option<String>,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpSummarizer {
    pub fn new(endpoint: impl Into<String>, model: Option<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model,
            api_key,
            client: reqwest::blocking::Client::builder()
                .build()
                .unwrap_or_default(),
        }
    }
}

impl SummaryGenerator for HttpSummarizer {
    fn summarize(&self, code: &str, timeout: Duration) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "code": code,
        });
        let mut request = self.client.post(&self.endpoint).timeout(timeout).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        let response = request.send()?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            anyhow::bail!("summary endpoint returned {}: {}", status, text);
        }
        let json: serde_json::Value = response.json()?;
        json.get("summary")
            .and_then(|s| s.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("summary endpoint response has no `summary` field"))
    }
}

/// Generator described by the `[summary]` config section, if any
pub fn from_config(config: &SummaryConfig) -> Option<Arc<dyn SummaryGenerator>> {
    match config.provider {
        SummaryProvider::None => None,
        SummaryProvider::Http => {
            let Some(endpoint) = config.endpoint.clone() else {
                tracing::warn!("summary provider is `http` but no endpoint is configured; generator disabled");
                return None;
            };
            let api_key = config
                .api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok());
            Some(Arc::new(HttpSummarizer::new(endpoint, config.model.clone(), api_key)))
        }
    }
}
