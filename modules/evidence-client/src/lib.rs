pub mod crossref;
pub mod error;
pub mod openalex;
pub mod serper;
pub mod types;

pub use crossref::CrossrefClient;
pub use error::{EvidenceClientError, Result};
pub use openalex::OpenAlexClient;
pub use serper::SerperClient;
pub use types::SearchHit;
