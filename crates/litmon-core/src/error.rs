use thiserror::Error;

/// All errors that can occur in litmon-core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("paper not found: {0}")]
    PaperNotFound(String),

    #[error("suggestion not found: {0}")]
    SuggestionNotFound(i64),

    #[error("config error: {0}")]
    Config(String),

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
