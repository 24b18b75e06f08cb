use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use lumos_common::{Alert, AlertFeedback, CacheEntry, Claim, ClaimId};

use crate::traits::{AlertSink, ClaimStore};

/// In-memory store used by the binary and by tests. Real deployments plug
/// a database-backed implementation in behind the same trait.
pub struct InMemoryStore {
    claims: Mutex<HashMap<ClaimId, Claim>>,
    alerts: Mutex<HashMap<Uuid, Alert>>,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            claims: Mutex::new(HashMap::new()),
            alerts: Mutex::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn claim_count(&self) -> usize {
        self.claims.lock().expect("claims lock poisoned").len()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.lock().expect("alerts lock poisoned").len()
    }

    pub fn get_alert(&self, id: Uuid) -> Option<Alert> {
        self.alerts
            .lock()
            .expect("alerts lock poisoned")
            .get(&id)
            .cloned()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClaimStore for InMemoryStore {
    async fn put_claims(&self, claims: &[Claim]) -> Result<()> {
        let mut map = self.claims.lock().expect("claims lock poisoned");
        for claim in claims {
            map.insert(claim.id.clone(), claim.clone());
        }
        Ok(())
    }

    async fn put_alerts(&self, alerts: &[Alert]) -> Result<()> {
        let mut map = self.alerts.lock().expect("alerts lock poisoned");
        for alert in alerts {
            map.insert(alert.id, alert.clone());
        }
        Ok(())
    }

    async fn set_alert_feedback(&self, alert_id: Uuid, feedback: AlertFeedback) -> Result<()> {
        let mut map = self.alerts.lock().expect("alerts lock poisoned");
        match map.get_mut(&alert_id) {
            Some(alert) => {
                alert.set_feedback(feedback);
                Ok(())
            }
            None => anyhow::bail!("No alert with id {alert_id}"),
        }
    }

    async fn get_cache_entry(&self, video_id: &str) -> Result<Option<CacheEntry>> {
        Ok(self
            .cache
            .lock()
            .expect("cache lock poisoned")
            .get(video_id)
            .cloned())
    }

    async fn put_cache_entry(&self, entry: &CacheEntry) -> Result<()> {
        self.cache
            .lock()
            .expect("cache lock poisoned")
            .insert(entry.video_id.clone(), entry.clone());
        Ok(())
    }

    async fn delete_video(&self, video_id: &str) -> Result<()> {
        self.claims
            .lock()
            .expect("claims lock poisoned")
            .retain(|id, _| id.video_id != video_id);
        self.alerts
            .lock()
            .expect("alerts lock poisoned")
            .retain(|_, alert| alert.video_id != video_id);
        self.cache
            .lock()
            .expect("cache lock poisoned")
            .remove(video_id);
        Ok(())
    }
}

/// Sink that logs emitted alerts. Delivery to real channels lives outside
/// the core.
pub struct TracingSink;

#[async_trait]
impl AlertSink for TracingSink {
    async fn emit(&self, alert: &Alert) -> Result<()> {
        info!(
            alert_id = %alert.id,
            video_id = alert.video_id.as_str(),
            claims = alert.claims.len(),
            topic_key = alert.topic_key.as_deref().unwrap_or("-"),
            first_claim_s = alert.first_claim_seconds(),
            "Alert emitted"
        );
        Ok(())
    }
}
