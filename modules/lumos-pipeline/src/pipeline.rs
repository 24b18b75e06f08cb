use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};
use uuid::Uuid;

use lumos_common::{
    Alert, CacheEntry, Claim, ClaimId, Confidence, LumosError, TranscriptSegment,
    Verdict, VerificationResult, VerificationStatus,
};

use crate::cache::ResultCache;
use crate::extractor::ClaimExtractor;
use crate::grouper::{AlertGrouper, UserRateLimiter};
use crate::traits::{AlertSink, ClaimStore};
use crate::verifier::ClaimVerifier;

/// Stats from one pipeline run.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub claims_extracted: u32,
    pub by_confidence: [u32; 3], // High, Medium, Low
    pub verified: u32,
    pub refuted: u32,
    pub inconclusive: u32,
    pub timed_out: u32,
    pub alerts_emitted: u32,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Pipeline Run Complete ===")?;
        writeln!(f, "Claims extracted: {}", self.claims_extracted)?;
        writeln!(f, "  High:   {}", self.by_confidence[0])?;
        writeln!(f, "  Medium: {}", self.by_confidence[1])?;
        writeln!(f, "  Low:    {}", self.by_confidence[2])?;
        writeln!(f, "Verdicts:")?;
        writeln!(f, "  Verified:     {}", self.verified)?;
        writeln!(f, "  Refuted:      {}", self.refuted)?;
        writeln!(f, "  Inconclusive: {} ({} timed out)", self.inconclusive, self.timed_out)?;
        writeln!(f, "Alerts emitted: {}", self.alerts_emitted)?;
        Ok(())
    }
}

/// End-to-end per-video flow: validate → cache check → extract → verify
/// (bounded fan-out) → group → emit → cache store. At most one full run per
/// video is ever in flight; concurrent callers for the same video share the
/// first run's result.
pub struct PipelineOrchestrator {
    extractor: ClaimExtractor,
    verifier: Arc<ClaimVerifier>,
    cache: ResultCache,
    store: Arc<dyn ClaimStore>,
    sink: Arc<dyn AlertSink>,
    limiter: Arc<UserRateLimiter>,
    verify_concurrency: usize,
    run_deadline: Option<Duration>,
    inflight: Mutex<HashMap<String, Arc<OnceCell<Vec<Alert>>>>>,
}

impl PipelineOrchestrator {
    pub fn new(
        extractor: ClaimExtractor,
        verifier: ClaimVerifier,
        store: Arc<dyn ClaimStore>,
        sink: Arc<dyn AlertSink>,
        limiter: Arc<UserRateLimiter>,
        verify_concurrency: usize,
        run_deadline: Option<Duration>,
    ) -> Self {
        Self {
            extractor,
            verifier: Arc::new(verifier),
            cache: ResultCache::new(store.clone()),
            store,
            sink,
            limiter,
            verify_concurrency: verify_concurrency.max(1),
            run_deadline,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Run the full pipeline for a video. Returns the complete alert
    /// sequence, or a validation error; never a partial result.
    pub async fn run(
        &self,
        video_id: &str,
        duration_seconds: Option<f64>,
        segments: &[TranscriptSegment],
        user_id: Uuid,
    ) -> Result<Vec<Alert>, LumosError> {
        validate_segments(segments)?;

        if let Some(entry) = self
            .cache
            .lookup(video_id, duration_seconds, Utc::now())
            .await
        {
            info!(
                video_id,
                alerts = entry.alerts.len(),
                "Cache hit, replaying pre-grouped alerts"
            );
            return Ok(entry.alerts);
        }

        // One cell per video; concurrent callers share it, so the second
        // request awaits the first run instead of duplicating it.
        let cell = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(video_id.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell
            .get_or_try_init(|| self.run_uncached(video_id, duration_seconds, segments, user_id))
            .await
            .map(|alerts| alerts.clone());

        self.inflight.lock().await.remove(video_id);
        result
    }

    async fn run_uncached(
        &self,
        video_id: &str,
        duration_seconds: Option<f64>,
        segments: &[TranscriptSegment],
        user_id: Uuid,
    ) -> Result<Vec<Alert>, LumosError> {
        // A run that finished while we queued may have filled the cache.
        if let Some(entry) = self
            .cache
            .lookup(video_id, duration_seconds, Utc::now())
            .await
        {
            return Ok(entry.alerts);
        }

        let claims = self.extractor.extract(video_id, segments);
        let mut stats = PipelineStats {
            claims_extracted: claims.len() as u32,
            ..Default::default()
        };
        for claim in &claims {
            match claim.confidence {
                Confidence::High => stats.by_confidence[0] += 1,
                Confidence::Medium => stats.by_confidence[1] += 1,
                Confidence::Low => stats.by_confidence[2] += 1,
            }
        }

        let (mut claims, timed_out) = self.verify_all(claims).await;
        stats.timed_out = timed_out;
        for claim in &claims {
            match claim.status {
                VerificationStatus::Verified => stats.verified += 1,
                VerificationStatus::Refuted => stats.refuted += 1,
                VerificationStatus::Inconclusive => stats.inconclusive += 1,
                VerificationStatus::Pending => {}
            }
        }

        // Verification completes out of order; grouping is timestamp-based.
        claims.sort_by(|a, b| {
            a.timestamp_seconds
                .partial_cmp(&b.timestamp_seconds)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.ordinal.cmp(&b.id.ordinal))
        });

        let mut grouper = AlertGrouper::new(user_id, video_id, self.limiter.clone());
        let mut alerts = Vec::new();
        for claim in &claims {
            if let Some(alert) = grouper.ingest(claim.clone()).await {
                alerts.push(alert);
            }
        }
        if let Some(alert) = grouper.finish().await {
            alerts.push(alert);
        }
        stats.alerts_emitted = alerts.len() as u32;

        for alert in &alerts {
            // Over-cap alerts carry a future emission slot from the rate
            // limiter; hold delivery until that slot arrives.
            if let Ok(wait) = (alert.created_at - Utc::now()).to_std() {
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
            }
            if let Err(e) = self.sink.emit(alert).await {
                warn!(alert_id = %alert.id, error = %e, "Alert delivery failed, continuing");
            }
        }

        if let Err(e) = self.store.put_claims(&claims).await {
            warn!(video_id, error = %e, "Claim persistence failed, continuing");
        }
        if let Err(e) = self.store.put_alerts(&alerts).await {
            warn!(video_id, error = %e, "Alert persistence failed, continuing");
        }

        self.cache
            .store(&CacheEntry::new(
                video_id,
                claims,
                alerts.clone(),
                duration_seconds,
                Utc::now(),
            ))
            .await;

        info!(video_id, "{stats}");
        Ok(alerts)
    }

    /// Fan verification out across a bounded number of concurrent calls.
    /// On deadline expiry, claims still pending resolve to inconclusive so
    /// the run terminates with a complete, consistent result.
    async fn verify_all(&self, claims: Vec<Claim>) -> (Vec<Claim>, u32) {
        let snapshot = claims.clone();
        let completed: Arc<std::sync::Mutex<HashMap<ClaimId, Claim>>> =
            Arc::new(std::sync::Mutex::new(HashMap::new()));

        let fanout = {
            let completed = completed.clone();
            async move {
                let mut stream = stream::iter(claims.into_iter().map(|mut claim| {
                    let verifier = self.verifier.clone();
                    async move {
                        verifier.verify(&mut claim).await;
                        claim
                    }
                }))
                .buffer_unordered(self.verify_concurrency);
                while let Some(claim) = stream.next().await {
                    completed
                        .lock()
                        .expect("completed lock poisoned")
                        .insert(claim.id.clone(), claim);
                }
            }
        };

        let deadline_hit = match self.run_deadline {
            Some(deadline) => tokio::time::timeout(deadline, fanout).await.is_err(),
            None => {
                fanout.await;
                false
            }
        };

        let mut done = completed.lock().expect("completed lock poisoned");
        let now = Utc::now();
        let mut timed_out = 0;
        let claims = snapshot
            .into_iter()
            .map(|mut claim| match done.remove(&claim.id) {
                Some(resolved) => resolved,
                None => {
                    timed_out += 1;
                    claim.resolve(
                        VerificationResult {
                            verdict: Verdict::Inconclusive,
                            reasoning: "Verification timed out before this claim could be checked."
                                .to_string(),
                            sources: vec![],
                            provider: None,
                        },
                        now,
                    );
                    claim
                }
            })
            .collect();

        if deadline_hit {
            warn!(
                timed_out,
                "Run deadline expired, remaining claims marked inconclusive"
            );
        }
        (claims, timed_out)
    }
}

/// Reject malformed transcript input before extraction begins.
fn validate_segments(segments: &[TranscriptSegment]) -> Result<(), LumosError> {
    if segments.is_empty() {
        return Err(LumosError::Validation(
            "transcript has no segments".to_string(),
        ));
    }
    let mut prev_start = f64::NEG_INFINITY;
    for (i, segment) in segments.iter().enumerate() {
        if segment.text.trim().is_empty() {
            return Err(LumosError::Validation(format!(
                "segment {i} has empty text"
            )));
        }
        if !segment.start_time_seconds.is_finite()
            || !segment.end_time_seconds.is_finite()
            || segment.start_time_seconds < 0.0
        {
            return Err(LumosError::Validation(format!(
                "segment {i} has invalid timestamps"
            )));
        }
        if segment.end_time_seconds < segment.start_time_seconds {
            return Err(LumosError::Validation(format!(
                "segment {i} ends before it starts"
            )));
        }
        if segment.start_time_seconds < prev_start {
            return Err(LumosError::Validation(format!(
                "segment {i} is out of order"
            )));
        }
        prev_start = segment.start_time_seconds;
    }
    Ok(())
}
