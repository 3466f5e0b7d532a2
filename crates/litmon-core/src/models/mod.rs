mod paper;
mod run;
mod suggestion;

pub use paper::{Feedback, Paper, PaperSource};
pub use run::SearchRun;
pub use suggestion::{ConfigSuggestion, SuggestionKind, SuggestionStatus};
