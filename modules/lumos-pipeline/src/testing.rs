// Test mocks for the verification pipeline.
//
// MockProvider scripts provider behavior per call (sources, classified
// failures, or hanging until the chain's timeout fires) and counts
// invocations, so idempotence and fallback tests can assert on provider
// traffic. MockSink records emitted alerts. FailingCacheStore wraps the
// in-memory store to fault-inject cache writes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use lumos_common::{
    Alert, AlertFeedback, CacheEntry, Claim, ClaimId, Confidence, SourceRef, TranscriptSegment,
    Verdict, VerificationResult, VerificationStatus,
};

use crate::providers::{EvidenceProvider, ProviderError};
use crate::store::InMemoryStore;
use crate::traits::{AlertSink, ClaimStore};

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// One scripted provider response.
#[derive(Debug, Clone)]
pub enum MockCall {
    /// Return these sources.
    Sources(Vec<SourceRef>),
    /// Fail with a retryable error.
    Retryable(String),
    /// Fail with a non-retryable error.
    Fatal(String),
    /// Never return; the chain's call timeout has to fire.
    Hang,
}

/// Scripted evidence provider. Responses pop off the script in order; once
/// the script is empty the default response repeats forever.
pub struct MockProvider {
    name: String,
    script: Mutex<VecDeque<MockCall>>,
    default: MockCall,
    calls: AtomicU32,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self::always(name, MockCall::Sources(vec![]))
    }

    pub fn always(name: &str, default: MockCall) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            default,
            calls: AtomicU32::new(0),
        }
    }

    pub fn then(self, call: MockCall) -> Self {
        self.script
            .lock()
            .expect("mock script lock poisoned")
            .push_back(call);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvidenceProvider for MockProvider {
    async fn search(&self, _query: &str) -> std::result::Result<Vec<SourceRef>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let call = self
            .script
            .lock()
            .expect("mock script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| self.default.clone());
        match call {
            MockCall::Sources(sources) => Ok(sources),
            MockCall::Retryable(msg) => Err(ProviderError::Retryable(msg)),
            MockCall::Fatal(msg) => Err(ProviderError::Fatal(msg)),
            MockCall::Hang => std::future::pending().await,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

/// Records every emitted alert.
pub struct MockSink {
    emitted: Mutex<Vec<Alert>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            emitted: Mutex::new(Vec::new()),
        }
    }

    pub fn emitted(&self) -> Vec<Alert> {
        self.emitted.lock().expect("sink lock poisoned").clone()
    }
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertSink for MockSink {
    async fn emit(&self, alert: &Alert) -> Result<()> {
        self.emitted
            .lock()
            .expect("sink lock poisoned")
            .push(alert.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FailingCacheStore
// ---------------------------------------------------------------------------

/// Delegates to an in-memory store but fails cache writes on demand.
pub struct FailingCacheStore {
    inner: InMemoryStore,
    fail_cache_put: AtomicBool,
}

impl FailingCacheStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_cache_put: AtomicBool::new(false),
        }
    }

    pub fn fail_cache_puts(&self, fail: bool) {
        self.fail_cache_put.store(fail, Ordering::SeqCst);
    }
}

impl Default for FailingCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClaimStore for FailingCacheStore {
    async fn put_claims(&self, claims: &[Claim]) -> Result<()> {
        self.inner.put_claims(claims).await
    }

    async fn put_alerts(&self, alerts: &[Alert]) -> Result<()> {
        self.inner.put_alerts(alerts).await
    }

    async fn set_alert_feedback(&self, alert_id: Uuid, feedback: AlertFeedback) -> Result<()> {
        self.inner.set_alert_feedback(alert_id, feedback).await
    }

    async fn get_cache_entry(&self, video_id: &str) -> Result<Option<CacheEntry>> {
        self.inner.get_cache_entry(video_id).await
    }

    async fn put_cache_entry(&self, entry: &CacheEntry) -> Result<()> {
        if self.fail_cache_put.load(Ordering::SeqCst) {
            anyhow::bail!("injected cache write failure");
        }
        self.inner.put_cache_entry(entry).await
    }

    async fn delete_video(&self, video_id: &str) -> Result<()> {
        self.inner.delete_video(video_id).await
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn segment(text: &str, start: f64) -> TranscriptSegment {
    TranscriptSegment {
        text: text.to_string(),
        start_time_seconds: start,
        end_time_seconds: start + 20.0,
    }
}

pub fn source(title: &str, url: &str, snippet: &str, relevance: f32) -> SourceRef {
    SourceRef {
        title: title.to_string(),
        url: url.to_string(),
        snippet: snippet.to_string(),
        relevance,
    }
}

/// A source whose snippet repeats the finding, so lexical corroboration
/// resolves the claim as verified.
pub fn corroborating_source(finding: &str) -> SourceRef {
    source(
        "Corroborating study",
        "https://example.org/study",
        finding,
        0.9,
    )
}

/// A terminal verified claim at the given timestamp.
pub fn resolved_claim_at(video_id: &str, ordinal: u32, timestamp: f64) -> Claim {
    let now = Utc::now();
    Claim {
        id: ClaimId::new(video_id, ordinal),
        video_id: video_id.to_string(),
        segment_text: format!("claim {ordinal} segment text"),
        word_count: 4,
        author: None,
        institution: None,
        finding: format!("finding for claim {ordinal}"),
        confidence: Confidence::Medium,
        search_query: format!("finding claim {ordinal}"),
        fallback_queries: vec![],
        timestamp_seconds: timestamp,
        status: VerificationStatus::Verified,
        result: Some(VerificationResult {
            verdict: Verdict::Verified,
            reasoning: "corroborated by test fixture".to_string(),
            sources: vec![source(
                "Fixture",
                "https://example.org/fixture",
                "fixture snippet",
                0.9,
            )],
            provider: Some("mock".to_string()),
        }),
        created_at: now,
        updated_at: now,
    }
}
