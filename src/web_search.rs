//! Web search helper backed by the Brave Search API.
//!
//! One GET per call, no retries. Provider results are normalized to
//! [`WebResult`] with missing fields defaulting to `""`.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::time::Duration;

use crate::config::SearchConfig;
use crate::models::WebResult;

pub struct WebSearchClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl WebSearchClient {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
        })
    }

    /// Reads the subscription token from the environment variable named by
    /// `config.api_key_env`. A missing token is not an error here; the API
    /// rejects the request instead.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            tracing::warn!(
                var = %config.api_key_env,
                "search API key not set, requests will be unauthorized"
            );
        }
        Self::new(&config.endpoint, api_key, config.timeout_secs)
    }

    /// Search the web for `query`, asking the provider for `count` results.
    pub async fn search(&self, query: &str, count: u32) -> Result<Vec<WebResult>> {
        tracing::info!(query = %query, count, "web search");

        let mut request = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .header("Accept-Encoding", "gzip")
            .query(&[("q", query.to_string()), ("count", count.to_string())]);
        if let Some(key) = &self.api_key {
            request = request.header("X-Subscription-Token", key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("search request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Brave search failed: {} {}", status, body);
        }

        let payload: Value = response
            .json()
            .await
            .context("search response is not valid JSON")?;
        Ok(normalize_response(&payload))
    }
}

/// Map `web.results[]` to `{title, link, snippet}` from `title`, `url`,
/// `description`. Absent or non-string fields become `""`.
pub fn normalize_response(payload: &Value) -> Vec<WebResult> {
    let Some(items) = payload
        .get("web")
        .and_then(|w| w.get("results"))
        .and_then(|r| r.as_array())
    else {
        return Vec::new();
    };

    items
        .iter()
        .map(|item| WebResult {
            title: string_field(item, "title"),
            link: string_field(item, "url"),
            snippet: string_field(item, "description"),
        })
        .collect()
}

fn string_field(item: &Value, key: &str) -> String {
    item.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}
