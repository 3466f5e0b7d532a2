mod paper_repository;
mod run_repository;
mod suggestion_repository;

pub use paper_repository::{FeedbackStats, PaperRepository, SqlitePaperRepository};
pub use run_repository::{RunRepository, SqliteRunRepository};
pub use suggestion_repository::{SqliteSuggestionRepository, SuggestionRepository};
