//! litmon core — paper data model, configuration, and the SQLite paper store.

pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use config::{Config, JournalTier, Project};
pub use error::{CoreError, Result};
pub use models::{
    ConfigSuggestion, Feedback, Paper, PaperSource, SearchRun, SuggestionKind, SuggestionStatus,
};
pub use storage::{FeedbackStats, PaperStore, StoreStats};
