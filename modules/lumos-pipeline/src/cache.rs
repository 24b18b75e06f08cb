//! Per-video result cache over the claim store.
//!
//! A hit requires an unexpired entry whose stored duration matches the
//! video's current duration; anything else is a miss and the stale entry
//! is superseded wholesale on the next store. Store failures downgrade to
//! a miss for the run; pipeline results are still returned to the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use lumos_common::CacheEntry;

use crate::traits::ClaimStore;

pub struct ResultCache {
    store: Arc<dyn ClaimStore>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn ClaimStore>) -> Self {
        Self { store }
    }

    /// Full-entry read or nothing; no partial reads. A read error is
    /// logged and treated as a miss.
    pub async fn lookup(
        &self,
        video_id: &str,
        current_duration: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<CacheEntry> {
        match self.store.get_cache_entry(video_id).await {
            Ok(Some(entry)) if entry.is_valid(now, current_duration) => {
                debug!(video_id, "Cache hit");
                Some(entry)
            }
            Ok(Some(_)) => {
                debug!(video_id, "Cache entry stale (expired or duration changed)");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(video_id, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Best-effort replace. Persistence failures are logged, not surfaced.
    pub async fn store(&self, entry: &CacheEntry) {
        if let Err(e) = self.store.put_cache_entry(entry).await {
            warn!(
                video_id = entry.video_id.as_str(),
                error = %e,
                "Cache store failed, continuing without cache"
            );
        }
    }
}
