use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cached per-video results stay valid this long.
pub const CACHE_TTL_DAYS: i64 = 30;

// --- Transcript input ---

/// One timestamped segment of a video transcript. Segmentation (chunking,
/// overlap stitching) happens upstream; the core never sees raw audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_time_seconds: f64,
    pub end_time_seconds: f64,
}

// --- Claim ---

/// Stable claim identity: (video, ordinal). Ordinals are assigned in
/// transcript order at extraction and never change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimId {
    pub video_id: String,
    pub ordinal: u32,
}

impl ClaimId {
    pub fn new(video_id: impl Into<String>, ordinal: u32) -> Self {
        Self {
            video_id: video_id.into(),
            ordinal,
        }
    }
}

impl std::fmt::Display for ClaimId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:claim:{}", self.video_id, self.ordinal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Verified,
    Refuted,
    Inconclusive,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Verified => write!(f, "verified"),
            Verdict::Refuted => write!(f, "refuted"),
            Verdict::Inconclusive => write!(f, "inconclusive"),
        }
    }
}

/// Claim verification lifecycle. Transitions only pending → terminal,
/// never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Refuted,
    Inconclusive,
}

impl VerificationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, VerificationStatus::Pending)
    }

    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            VerificationStatus::Pending => None,
            VerificationStatus::Verified => Some(Verdict::Verified),
            VerificationStatus::Refuted => Some(Verdict::Refuted),
            VerificationStatus::Inconclusive => Some(Verdict::Inconclusive),
        }
    }
}

impl From<Verdict> for VerificationStatus {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Verified => VerificationStatus::Verified,
            Verdict::Refuted => VerificationStatus::Refuted,
            Verdict::Inconclusive => VerificationStatus::Inconclusive,
        }
    }
}

/// An author mentioned in a segment, with the normalized form used for
/// queries and topic matching, plus common spelling variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorMention {
    pub raw: String,
    pub normalized: String,
    pub variants: Vec<String>,
}

/// A candidate source returned by an evidence provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub relevance: f32,
}

/// What verification produced for a claim: the verdict, a short
/// justification, and the sources that drove it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verdict: Verdict,
    pub reasoning: String,
    pub sources: Vec<SourceRef>,
    /// Name of the provider whose evidence decided the verdict, if any.
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub video_id: String,
    pub segment_text: String,
    pub word_count: u32,
    pub author: Option<AuthorMention>,
    pub institution: Option<String>,
    /// Free-text summary of the asserted finding.
    pub finding: String,
    pub confidence: Confidence,
    pub search_query: String,
    /// Progressively broader queries tried when the primary finds nothing.
    pub fallback_queries: Vec<String>,
    /// Segment start time; grouping windows key off this.
    pub timestamp_seconds: f64,
    pub status: VerificationStatus,
    pub result: Option<VerificationResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Claim {
    /// Resolve a pending claim to a terminal verdict. Terminal claims are
    /// left untouched; status never moves backward.
    pub fn resolve(&mut self, result: VerificationResult, now: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = result.verdict.into();
        self.result = Some(result);
        self.updated_at = now;
    }
}

// --- Alert ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    FactCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertFeedback {
    Helpful,
    NotHelpful,
}

/// Per-claim payload inside an alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertClaim {
    pub claim_id: ClaimId,
    pub claim_text: String,
    pub verdict: Verdict,
    pub reasoning: String,
    pub source_urls: Vec<String>,
    pub timestamp_seconds: f64,
}

/// A user-facing alert bundling 1-3 claims from one video whose
/// timestamps span at most the grouping window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub user_id: Uuid,
    pub video_id: String,
    pub alert_type: AlertType,
    pub claims: Vec<AlertClaim>,
    /// Shared by alerts whose claims were clustered from the same
    /// discussion thread (same author or institution).
    pub topic_key: Option<String>,
    pub feedback: Option<AlertFeedback>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Timestamp of the first bundled claim. Alerts are emitted downstream
    /// in this order.
    pub fn first_claim_seconds(&self) -> f64 {
        self.claims
            .first()
            .map(|c| c.timestamp_seconds)
            .unwrap_or(0.0)
    }

    /// Feedback is the only field mutable after creation.
    pub fn set_feedback(&mut self, feedback: AlertFeedback) {
        self.feedback = Some(feedback);
    }
}

// --- Cache entry ---

/// Full per-video pipeline output. Replaced wholesale on store, never
/// merged or partially read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub video_id: String,
    pub claims: Vec<Claim>,
    pub alerts: Vec<Alert>,
    /// Duration the entry was computed against. `None` for inputs without
    /// a known duration (live-stream-like); such entries never hit.
    pub duration_seconds: Option<f64>,
    pub computed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        video_id: impl Into<String>,
        claims: Vec<Claim>,
        alerts: Vec<Alert>,
        duration_seconds: Option<f64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            claims,
            alerts,
            duration_seconds,
            computed_at: now,
            expires_at: now + Duration::days(CACHE_TTL_DAYS),
        }
    }

    /// A hit requires an unexpired entry whose stored duration equals the
    /// current one. A missing duration on either side forces a miss.
    pub fn is_valid(&self, now: DateTime<Utc>, current_duration: Option<f64>) -> bool {
        if now >= self.expires_at {
            return false;
        }
        match (self.duration_seconds, current_duration) {
            (Some(stored), Some(current)) => (stored - current).abs() < f64::EPSILON,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_claim() -> Claim {
        let now = Utc::now();
        Claim {
            id: ClaimId::new("vid1", 0),
            video_id: "vid1".to_string(),
            segment_text: "a study found 40% of adults sleep less than 6 hours".to_string(),
            word_count: 10,
            author: None,
            institution: None,
            finding: "40% of adults sleep less than 6 hours".to_string(),
            confidence: Confidence::Medium,
            search_query: "40% adults sleep less than 6 hours study".to_string(),
            fallback_queries: vec![],
            timestamp_seconds: 12.0,
            status: VerificationStatus::Pending,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn claim_id_display_is_stable() {
        let id = ClaimId::new("abc123", 7);
        assert_eq!(id.to_string(), "abc123:claim:7");
    }

    #[test]
    fn resolve_moves_pending_to_terminal() {
        let mut claim = pending_claim();
        claim.resolve(
            VerificationResult {
                verdict: Verdict::Verified,
                reasoning: "corroborated".to_string(),
                sources: vec![],
                provider: Some("openalex".to_string()),
            },
            Utc::now(),
        );
        assert_eq!(claim.status, VerificationStatus::Verified);
        assert!(claim.status.is_terminal());
    }

    #[test]
    fn resolve_never_moves_backward() {
        let mut claim = pending_claim();
        claim.resolve(
            VerificationResult {
                verdict: Verdict::Refuted,
                reasoning: "contradicted".to_string(),
                sources: vec![],
                provider: None,
            },
            Utc::now(),
        );
        claim.resolve(
            VerificationResult {
                verdict: Verdict::Verified,
                reasoning: "should not apply".to_string(),
                sources: vec![],
                provider: None,
            },
            Utc::now(),
        );
        assert_eq!(claim.status, VerificationStatus::Refuted);
        assert_eq!(claim.result.unwrap().reasoning, "contradicted");
    }

    #[test]
    fn cache_entry_valid_within_ttl_and_same_duration() {
        let now = Utc::now();
        let entry = CacheEntry::new("vid1", vec![], vec![], Some(3600.0), now);
        assert!(entry.is_valid(now + Duration::days(1), Some(3600.0)));
    }

    #[test]
    fn cache_entry_misses_on_duration_change() {
        let now = Utc::now();
        let entry = CacheEntry::new("vid1", vec![], vec![], Some(3600.0), now);
        assert!(!entry.is_valid(now, Some(3700.0)));
    }

    #[test]
    fn cache_entry_misses_after_expiry() {
        let now = Utc::now();
        let entry = CacheEntry::new("vid1", vec![], vec![], Some(3600.0), now);
        assert!(!entry.is_valid(now + Duration::days(CACHE_TTL_DAYS), Some(3600.0)));
    }

    #[test]
    fn cache_entry_misses_without_duration() {
        let now = Utc::now();
        let entry = CacheEntry::new("vid1", vec![], vec![], None, now);
        assert!(!entry.is_valid(now, Some(3600.0)));
        let entry = CacheEntry::new("vid1", vec![], vec![], Some(3600.0), now);
        assert!(!entry.is_valid(now, None));
    }
}
