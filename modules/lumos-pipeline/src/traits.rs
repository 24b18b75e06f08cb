// Trait abstractions for the orchestrator's external collaborators.
//
// Persistence and alert delivery are external systems; the core only
// defines the record schema and reaches them through these seams. Mocks
// in `testing` make the whole pipeline testable without network or
// database.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use lumos_common::{Alert, AlertFeedback, CacheEntry, Claim};

/// Durable claim/alert/cache storage, keyed simple create/read/update
/// operations. The storage technology behind it is not this crate's
/// concern.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Upsert the claims produced for a video.
    async fn put_claims(&self, claims: &[Claim]) -> Result<()>;

    /// Upsert finalized alerts.
    async fn put_alerts(&self, alerts: &[Alert]) -> Result<()>;

    /// Record user feedback on an alert, the only post-creation mutation.
    async fn set_alert_feedback(&self, alert_id: Uuid, feedback: AlertFeedback) -> Result<()>;

    /// Read the cached pipeline result for a video, if any.
    async fn get_cache_entry(&self, video_id: &str) -> Result<Option<CacheEntry>>;

    /// Replace the cached pipeline result for a video wholesale.
    async fn put_cache_entry(&self, entry: &CacheEntry) -> Result<()>;

    /// Cascade-delete everything stored for a removed video.
    async fn delete_video(&self, video_id: &str) -> Result<()>;
}

/// Downstream alert delivery (native notification, storage row, push).
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn emit(&self, alert: &Alert) -> Result<()>;
}
