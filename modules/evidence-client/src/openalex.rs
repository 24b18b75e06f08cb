use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::{EvidenceClientError, Result};
use crate::types::SearchHit;

const BASE_URL: &str = "https://api.openalex.org";

/// Client for the OpenAlex scholarly works API. No key required; a contact
/// email routes requests into their polite pool.
pub struct OpenAlexClient {
    client: reqwest::Client,
    mailto: String,
}

#[derive(Debug, Deserialize)]
struct WorksResponse {
    #[serde(default)]
    results: Vec<Work>,
}

#[derive(Debug, Deserialize)]
struct Work {
    #[serde(default)]
    display_name: String,
    relevance_score: Option<f32>,
    doi: Option<String>,
    primary_location: Option<Location>,
    abstract_inverted_index: Option<BTreeMap<String, Vec<u32>>>,
}

#[derive(Debug, Deserialize)]
struct Location {
    landing_page_url: Option<String>,
}

impl OpenAlexClient {
    pub fn new(mailto: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            mailto: mailto.to_string(),
        }
    }

    /// Search works by relevance. Returns title/url/abstract-snippet hits
    /// with OpenAlex's own relevance score attached.
    pub async fn search_works(&self, query: &str, per_page: usize) -> Result<Vec<SearchHit>> {
        let url = format!("{BASE_URL}/works");
        let per_page = per_page.to_string();

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("search", query),
                ("per-page", per_page.as_str()),
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
            .results
            .into_iter()
            .filter_map(|work| {
                let url = work
                    .primary_location
                    .and_then(|l| l.landing_page_url)
                    .or(work.doi)?;
                let snippet = work
                    .abstract_inverted_index
                    .map(|idx| reassemble_abstract(&idx))
                    .unwrap_or_else(|| work.display_name.clone());
                Some(SearchHit {
                    title: work.display_name,
                    url,
                    snippet,
                    relevance: work.relevance_score,
                })
            })
            .collect();

        info!(query, count = hits.len(), "OpenAlex search complete");
        Ok(hits)
    }
}

/// OpenAlex ships abstracts as word → positions maps; rebuild the text.
fn reassemble_abstract(index: &BTreeMap<String, Vec<u32>>) -> String {
    let mut positioned: Vec<(u32, &str)> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |&p| (p, word.as_str())))
        .collect();
    positioned.sort_by_key(|(p, _)| *p);
    positioned
        .into_iter()
        .map(|(_, w)| w)
        .collect::<Vec<_>>()
        .join(" ")
}
