use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use evidence_client::{CrossrefClient, OpenAlexClient, SearchHit, SerperClient};
use lumos_common::SourceRef;

/// Provider failures, classified for the chain's retry policy. Retryable
/// covers rate limits, 5xx-equivalents and transport errors; fatal covers
/// bad requests and misconfiguration and advances the chain immediately.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("retryable provider failure: {0}")]
    Retryable(String),

    #[error("provider failure: {0}")]
    Fatal(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Retryable(_))
    }
}

impl From<evidence_client::EvidenceClientError> for ProviderError {
    fn from(err: evidence_client::EvidenceClientError) -> Self {
        if err.is_retryable() {
            ProviderError::Retryable(err.to_string())
        } else {
            ProviderError::Fatal(err.to_string())
        }
    }
}

/// One evidence lookup capability: a text query in, zero or more candidate
/// sources out. Providers are interchangeable; the configured order is the
/// only thing that distinguishes them.
#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SourceRef>, ProviderError>;
    fn name(&self) -> &str;
}

/// How many candidates to request from each provider per query.
const RESULTS_PER_QUERY: usize = 5;

/// Query-term overlap score for providers that don't return a relevance
/// signal of their own. Fraction of meaningful query terms found in the
/// candidate's title + snippet.
pub(crate) fn term_overlap(query: &str, text: &str) -> f32 {
    const STOPWORDS: &[&str] = &[
        "the", "and", "that", "for", "with", "from", "this", "are", "was", "were", "has", "have",
        "than", "into", "about",
    ];
    let text = text.to_lowercase();
    let terms: Vec<String> = query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect();
    if terms.is_empty() {
        return 0.0;
    }
    let matched = terms.iter().filter(|t| text.contains(t.as_str())).count();
    matched as f32 / terms.len() as f32
}

fn to_sources(query: &str, hits: Vec<SearchHit>) -> Vec<SourceRef> {
    hits.into_iter()
        .map(|hit| {
            let relevance = hit
                .relevance
                .unwrap_or_else(|| term_overlap(query, &format!("{} {}", hit.title, hit.snippet)));
            SourceRef {
                title: hit.title,
                url: hit.url,
                snippet: hit.snippet,
                relevance,
            }
        })
        .collect()
}

// --- OpenAlex (academic index) ---

pub struct OpenAlexProvider {
    client: OpenAlexClient,
}

impl OpenAlexProvider {
    pub fn new(mailto: &str) -> Self {
        Self {
            client: OpenAlexClient::new(mailto),
        }
    }
}

#[async_trait]
impl EvidenceProvider for OpenAlexProvider {
    async fn search(&self, query: &str) -> Result<Vec<SourceRef>, ProviderError> {
        let hits = self.client.search_works(query, RESULTS_PER_QUERY).await?;
        // OpenAlex relevance scores are unbounded BM25-ish values; squash.
        let sources = hits
            .into_iter()
            .map(|mut hit| {
                hit.relevance = hit.relevance.map(|s| (s / (s + 10.0)).clamp(0.0, 1.0));
                hit
            })
            .collect();
        Ok(to_sources(query, sources))
    }

    fn name(&self) -> &str {
        "openalex"
    }
}

// --- Crossref (academic index) ---

pub struct CrossrefProvider {
    client: CrossrefClient,
}

impl CrossrefProvider {
    pub fn new(mailto: &str) -> Self {
        Self {
            client: CrossrefClient::new(mailto),
        }
    }
}

#[async_trait]
impl EvidenceProvider for CrossrefProvider {
    async fn search(&self, query: &str) -> Result<Vec<SourceRef>, ProviderError> {
        let hits = self.client.search_works(query, RESULTS_PER_QUERY).await?;
        Ok(to_sources(query, hits))
    }

    fn name(&self) -> &str {
        "crossref"
    }
}

// --- Serper (generalized web search, fallback) ---

pub struct SerperProvider {
    client: SerperClient,
}

impl SerperProvider {
    pub fn new(api_key: &str) -> Self {
        info!("Serper web-search fallback enabled");
        Self {
            client: SerperClient::new(api_key),
        }
    }
}

#[async_trait]
impl EvidenceProvider for SerperProvider {
    async fn search(&self, query: &str) -> Result<Vec<SourceRef>, ProviderError> {
        let hits = self.client.search(query, RESULTS_PER_QUERY).await?;
        Ok(to_sources(query, hits))
    }

    fn name(&self) -> &str {
        "serper"
    }
}
