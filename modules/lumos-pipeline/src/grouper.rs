use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use lumos_common::{Alert, AlertClaim, AlertType, Claim};

/// Claims within this many seconds of a group's first claim bundle together.
pub const GROUP_WINDOW_SECS: f64 = 120.0;
/// Upper bound on claims per alert.
pub const MAX_CLAIMS_PER_ALERT: usize = 3;
/// At most this many alerts per user per rolling rate window.
pub const RATE_CAP: usize = 5;
/// Rolling rate window length.
pub const RATE_WINDOW_SECS: i64 = 60;

// --- Per-user rate limiter ---

/// Sliding-window emission limiter shared across all of a user's videos.
/// Flushes from different videos for the same user can race, so the
/// window state lives behind one mutex.
///
/// Over-cap flushes are scheduled, never dropped: `reserve` returns the
/// earliest instant the alert may be emitted, pushed past `now` when the
/// window is full, and monotonic per user so arrival order is preserved.
pub struct UserRateLimiter {
    windows: Mutex<HashMap<Uuid, VecDeque<DateTime<Utc>>>>,
}

impl UserRateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub async fn reserve(&self, user_id: Uuid, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut windows = self.windows.lock().await;

        // Users whose last reservation is a full window in the past can no
        // longer influence anything; drop their state.
        let idle_before = now - Duration::seconds(RATE_WINDOW_SECS);
        windows.retain(|id, w| {
            *id == user_id || w.back().is_some_and(|t| *t >= idle_before)
        });

        let window = windows.entry(user_id).or_default();

        let mut slot = now;
        if let Some(last) = window.back() {
            slot = slot.max(*last);
        }
        if window.len() >= RATE_CAP {
            let anchor = window[window.len() - RATE_CAP];
            slot = slot.max(anchor + Duration::seconds(RATE_WINDOW_SECS));
        }

        // Reservations older than one full window behind the new slot can
        // no longer influence any future reservation.
        let horizon = slot - Duration::seconds(RATE_WINDOW_SECS);
        while window.len() > RATE_CAP && window.front().is_some_and(|t| *t < horizon) {
            window.pop_front();
        }

        window.push_back(slot);
        slot
    }
}

impl Default for UserRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

// --- Alert grouper ---

struct OpenGroup {
    window_start: f64,
    claims: Vec<Claim>,
}

/// Windows verified claims for one (user, video) into alerts. Callers feed
/// claims in timestamp order (verification completes out of order; the
/// orchestrator re-sorts first). `finish` flushes the trailing group so no
/// alert waits forever for a third claim.
pub struct AlertGrouper {
    user_id: Uuid,
    video_id: String,
    limiter: std::sync::Arc<UserRateLimiter>,
    open: Option<OpenGroup>,
}

impl AlertGrouper {
    pub fn new(
        user_id: Uuid,
        video_id: impl Into<String>,
        limiter: std::sync::Arc<UserRateLimiter>,
    ) -> Self {
        Self {
            user_id,
            video_id: video_id.into(),
            limiter,
            open: None,
        }
    }

    /// Ingest one verified claim. Returns an alert when ingestion closed a
    /// previously open group. All terminal verdicts are groupable,
    /// inconclusive included.
    pub async fn ingest(&mut self, claim: Claim) -> Option<Alert> {
        if !claim.status.is_terminal() {
            warn!(claim_id = %claim.id, "Refusing to group a pending claim");
            return None;
        }

        if let Some(group) = &mut self.open {
            if group.claims.len() < MAX_CLAIMS_PER_ALERT
                && claim.timestamp_seconds - group.window_start <= GROUP_WINDOW_SECS
            {
                group.claims.push(claim);
                return None;
            }
        }

        let flushed = self.flush().await;
        self.open = Some(OpenGroup {
            window_start: claim.timestamp_seconds,
            claims: vec![claim],
        });
        flushed
    }

    /// Time-based flush for streaming callers: closes the open group once
    /// its window has elapsed with no new claim.
    pub async fn flush_idle(&mut self, stream_position_seconds: f64) -> Option<Alert> {
        let expired = self
            .open
            .as_ref()
            .is_some_and(|g| stream_position_seconds - g.window_start > GROUP_WINDOW_SECS);
        if expired {
            self.flush().await
        } else {
            None
        }
    }

    /// Flush the trailing group at end of input.
    pub async fn finish(&mut self) -> Option<Alert> {
        self.flush().await
    }

    async fn flush(&mut self) -> Option<Alert> {
        let group = self.open.take()?;
        let emit_at = self.limiter.reserve(self.user_id, Utc::now()).await;
        let topic_key = topic_key(&group.claims);

        debug!(
            video_id = self.video_id.as_str(),
            claims = group.claims.len(),
            window_start = group.window_start,
            "Flushing claim group into alert"
        );

        let claims = group
            .claims
            .into_iter()
            .map(|claim| {
                let result = claim.result.as_ref();
                AlertClaim {
                    claim_id: claim.id.clone(),
                    claim_text: claim.finding.clone(),
                    verdict: claim
                        .status
                        .verdict()
                        .unwrap_or(lumos_common::Verdict::Inconclusive),
                    reasoning: result.map(|r| r.reasoning.clone()).unwrap_or_default(),
                    source_urls: result
                        .map(|r| r.sources.iter().map(|s| s.url.clone()).collect())
                        .unwrap_or_default(),
                    timestamp_seconds: claim.timestamp_seconds,
                }
            })
            .collect();

        Some(Alert {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            video_id: self.video_id.clone(),
            alert_type: AlertType::FactCheck,
            claims,
            topic_key,
            feedback: None,
            created_at: emit_at,
        })
    }
}

/// Claims clustered from the same discussion thread share an author or an
/// institution; that shared signal becomes the alert's topic key.
fn topic_key(claims: &[Claim]) -> Option<String> {
    if claims.len() < 2 {
        return None;
    }
    let authors: Vec<&lumos_common::AuthorMention> = claims
        .iter()
        .filter_map(|c| c.author.as_ref())
        .collect();
    if authors.len() == claims.len() && authors.windows(2).all(|w| same_author(w[0], w[1])) {
        return Some(format!("author:{}", authors[0].normalized));
    }
    let institutions: Vec<String> = claims
        .iter()
        .filter_map(|c| c.institution.as_ref().map(|i| i.to_lowercase()))
        .collect();
    if institutions.len() == claims.len() && institutions.windows(2).all(|w| w[0] == w[1]) {
        return Some(format!("institution:{}", institutions[0]));
    }
    None
}

/// Two mentions name the same author when their normalized forms agree or
/// either's spelling variants cover the other.
fn same_author(a: &lumos_common::AuthorMention, b: &lumos_common::AuthorMention) -> bool {
    a.normalized == b.normalized
        || a.variants.iter().any(|v| v.eq_ignore_ascii_case(&b.normalized))
        || b.variants.iter().any(|v| v.eq_ignore_ascii_case(&a.normalized))
}
