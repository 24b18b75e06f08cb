use std::env;

use tracing::info;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Serper API key for the web-search fallback provider. Empty disables it.
    pub serper_api_key: String,
    /// Contact email sent to OpenAlex/Crossref (their polite-pool convention).
    pub contact_email: String,

    /// Per-provider-call timeout in seconds.
    pub provider_timeout_secs: u64,
    /// Retry attempts per provider before advancing down the chain.
    pub provider_max_attempts: u32,
    /// Minimum relevance for a source to qualify as evidence.
    pub relevance_threshold: f32,

    /// Concurrent verification calls per pipeline run.
    pub verify_concurrency: usize,
    /// Outer deadline for a full pipeline run, in seconds. 0 disables it.
    pub run_deadline_secs: u64,
}

impl Config {
    /// Load configuration from environment variables. Provider keys are
    /// optional (the matching provider is skipped); tunables have defaults.
    pub fn from_env() -> Self {
        Self {
            serper_api_key: env::var("SERPER_API_KEY").unwrap_or_default(),
            contact_email: env::var("LUMOS_CONTACT_EMAIL")
                .unwrap_or_else(|_| "ops@lumos.app".to_string()),
            provider_timeout_secs: parsed_env("PROVIDER_TIMEOUT_SECS", 10),
            provider_max_attempts: parsed_env("PROVIDER_MAX_ATTEMPTS", 3),
            relevance_threshold: parsed_env("RELEVANCE_THRESHOLD", 0.3),
            verify_concurrency: parsed_env("VERIFY_CONCURRENCY", 4),
            run_deadline_secs: parsed_env("RUN_DEADLINE_SECS", 300),
        }
    }

    /// Log the effective config without secrets.
    pub fn log_redacted(&self) {
        info!(
            serper = !self.serper_api_key.is_empty(),
            contact_email = self.contact_email.as_str(),
            provider_timeout_secs = self.provider_timeout_secs,
            provider_max_attempts = self.provider_max_attempts,
            relevance_threshold = self.relevance_threshold,
            verify_concurrency = self.verify_concurrency,
            run_deadline_secs = self.run_deadline_secs,
            "Config loaded"
        );
    }
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid number, got {raw:?}")),
        Err(_) => default,
    }
}
