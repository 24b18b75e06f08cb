use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use lumos_common::SourceRef;

use crate::providers::EvidenceProvider;

/// Base backoff between retries of the same provider. Actual delay is
/// base * 2^attempt + jitter.
const RETRY_BASE: Duration = Duration::from_millis(500);

/// What a chain run resolved to. Exhausting every provider without a
/// qualifying source is a normal outcome, not an error.
#[derive(Debug)]
pub enum ChainOutcome {
    Evidence {
        provider: String,
        sources: Vec<SourceRef>,
    },
    NoEvidence,
}

/// Ordered evidence lookups with per-call timeout and a small retry budget
/// per provider. Specialized academic indexes come first, generalized web
/// search last; the first provider returning a source above the relevance
/// threshold wins.
pub struct EvidenceProviderChain {
    providers: Vec<Arc<dyn EvidenceProvider>>,
    call_timeout: Duration,
    max_attempts: u32,
    relevance_threshold: f32,
}

impl EvidenceProviderChain {
    pub fn new(
        providers: Vec<Arc<dyn EvidenceProvider>>,
        call_timeout: Duration,
        max_attempts: u32,
        relevance_threshold: f32,
    ) -> Self {
        Self {
            providers,
            call_timeout,
            max_attempts: max_attempts.max(1),
            relevance_threshold,
        }
    }

    pub async fn run(&self, query: &str) -> ChainOutcome {
        for provider in &self.providers {
            if let Some(sources) = self.try_provider(provider.as_ref(), query).await {
                return ChainOutcome::Evidence {
                    provider: provider.name().to_string(),
                    sources,
                };
            }
        }
        debug!(query, "All providers exhausted with no qualifying evidence");
        ChainOutcome::NoEvidence
    }

    /// Run one provider through its attempt budget. Returns qualifying
    /// sources sorted by relevance, or None to advance down the chain.
    async fn try_provider(
        &self,
        provider: &dyn EvidenceProvider,
        query: &str,
    ) -> Option<Vec<SourceRef>> {
        for attempt in 0..self.max_attempts {
            let call = provider.search(query);
            match tokio::time::timeout(self.call_timeout, call).await {
                Ok(Ok(sources)) => {
                    let mut qualifying: Vec<SourceRef> = sources
                        .into_iter()
                        .filter(|s| s.relevance >= self.relevance_threshold)
                        .collect();
                    if qualifying.is_empty() {
                        debug!(
                            query,
                            provider = provider.name(),
                            "No sources above relevance threshold"
                        );
                        return None;
                    }
                    qualifying
                        .sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal));
                    return Some(qualifying);
                }
                Ok(Err(e)) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        query,
                        provider = provider.name(),
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Provider failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Ok(Err(e)) => {
                    warn!(
                        query,
                        provider = provider.name(),
                        retryable = e.is_retryable(),
                        error = %e,
                        "Provider failed, advancing to next provider"
                    );
                    return None;
                }
                Err(_) if attempt + 1 < self.max_attempts => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        query,
                        provider = provider.name(),
                        attempt = attempt + 1,
                        timeout_ms = self.call_timeout.as_millis() as u64,
                        "Provider timed out, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(_) => {
                    warn!(
                        query,
                        provider = provider.name(),
                        "Provider timed out on final attempt, advancing"
                    );
                    return None;
                }
            }
        }
        None
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let jitter = Duration::from_millis(rand::rng().random_range(0..250));
        RETRY_BASE * 2u32.pow(attempt) + jitter
    }
}
