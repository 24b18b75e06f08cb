use serde::{Deserialize, Serialize};

/// One candidate source returned by a provider API. `relevance` is the
/// provider's own score when it exposes one; callers derive a score for
/// providers that don't.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub relevance: Option<f32>,
}
