use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvidenceClientError>;

#[derive(Debug, Error)]
pub enum EvidenceClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl EvidenceClientError {
    /// Rate limits, server-side failures and transport errors are worth
    /// retrying against the same provider; anything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            EvidenceClientError::Network(_) => true,
            EvidenceClientError::Api { status, .. } => *status == 429 || *status >= 500,
            EvidenceClientError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for EvidenceClientError {
    fn from(err: reqwest::Error) -> Self {
        EvidenceClientError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for EvidenceClientError {
    fn from(err: serde_json::Error) -> Self {
        EvidenceClientError::Parse(err.to_string())
    }
}
