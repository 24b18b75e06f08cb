use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::{EvidenceClientError, Result};
use crate::types::SearchHit;

const BASE_URL: &str = "https://api.crossref.org";

/// Client for the Crossref works API (DOI metadata). Crossref scores are
/// unbounded; callers normalize before thresholding.
pub struct CrossrefClient {
    client: reqwest::Client,
    mailto: String,
}

#[derive(Debug, Deserialize)]
struct WorksResponse {
    message: WorksMessage,
}

#[derive(Debug, Deserialize)]
struct WorksMessage {
    #[serde(default)]
    items: Vec<Work>,
}

#[derive(Debug, Deserialize)]
struct Work {
    #[serde(default)]
    title: Vec<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
    /// JATS-flavored XML when present.
    r#abstract: Option<String>,
    score: Option<f32>,
}

impl CrossrefClient {
    pub fn new(mailto: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            mailto: mailto.to_string(),
        }
    }

    pub async fn search_works(&self, query: &str, rows: usize) -> Result<Vec<SearchHit>> {
        let url = format!("{BASE_URL}/works");
        let rows = rows.to_string();

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("query", query),
                ("rows", rows.as_str()),
                ("mailto", self.mailto.as_str()),
            ])
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

        let data: WorksResponse = resp
            .json()
            .await
            .map_err(|e| EvidenceClientError::Parse(e.to_string()))?;

        let hits: Vec<SearchHit> = data
            .message
            .items
            .into_iter()
            .filter_map(|work| {
                let url = work.url?;
                let title = work.title.into_iter().next().unwrap_or_default();
                let snippet = work
                    .r#abstract
                    .map(|a| strip_jats_tags(&a))
                    .unwrap_or_else(|| title.clone());
                Some(SearchHit {
                    title,
                    url,
                    snippet,
                    // Crossref scores range into the tens; squash to 0..1.
                    relevance: work.score.map(|s| (s / 100.0).clamp(0.0, 1.0)),
                })
            })
            .collect();

        info!(query, count = hits.len(), "Crossref search complete");
        Ok(hits)
    }
}

fn strip_jats_tags(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;
    for ch in raw.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_jats_tags_removes_markup() {
        let raw = "<jats:p>Sleep duration <jats:italic>declined</jats:italic> since 1990.</jats:p>";
        assert_eq!(strip_jats_tags(raw), "Sleep duration declined since 1990.");
    }
}
