use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {0}: {1}")]
    Api(String, String),

    #[error("rate limit from {0} after {1} retries")]
    RateLimit(String, u32),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("identifier not found: {0}")]
    IdentifierNotFound(String),

    #[error("store error: {0}")]
    Store(#[from] litmon_core::CoreError),
}

pub type Result<T> = std::result::Result<T, SourceError>;
