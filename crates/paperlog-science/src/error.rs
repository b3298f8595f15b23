use paperlog_core::PaperlogError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScienceError {
    #[error("invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("invalid PMID: {0}")]
    InvalidPmid(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {0}: {1}")]
    ApiError(String, String),

    #[error("rate limit from {0}, retry after {1}s")]
    RateLimit(String, u64),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("lookup for {0} is cooling down and nothing is stored for it")]
    CoolingDown(String),

    #[error("no metadata found for {0}")]
    NotFound(String),

    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("paper store error: {0}")]
    Store(#[from] PaperlogError),
}

impl ScienceError {
    /// Malformed caller input, detected before any network call.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InvalidDoi(_) | Self::InvalidPmid(_))
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimit(..))
    }
}

pub type Result<T> = std::result::Result<T, ScienceError>;
