use thiserror::Error;

pub type Result<T> = std::result::Result<T, RankError>;

#[derive(Error, Debug)]
pub enum RankError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("oracle API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("API key environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("oracle returned no usable content")]
    EmptyCompletion,

    #[error("not enough feedback: {0}")]
    InsufficientFeedback(String),

    #[error("store error: {0}")]
    Store(#[from] litmon_core::CoreError),
}
