use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::{EvidenceClientError, Result};
use crate::types::SearchHit;

const SEARCH_URL: &str = "https://google.serper.dev/search";

/// Client for the Serper Google-search API. Generalized web fallback;
/// returns no relevance score of its own.
pub struct SerperClient {
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, Deserialize)]
struct SerperResult {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

impl SerperClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let body = serde_json::json!({
            "q": query,
            "num": max_results,
        });

        let resp = self
            .client
            .post(SEARCH_URL)
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(EvidenceClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let data: SerperResponse = resp
            .json()
            .await
            .map_err(|e| EvidenceClientError::Parse(e.to_string()))?;

        let hits: Vec<SearchHit> = data
            .organic
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                url: r.link,
                snippet: r.snippet,
                relevance: None,
            })
            .collect();

        info!(query, count = hits.len(), "Serper search complete");
        Ok(hits)
    }
}
