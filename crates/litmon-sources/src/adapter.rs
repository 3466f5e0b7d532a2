use async_trait::async_trait;

use litmon_core::Paper;

use crate::error::Result;

/// A bibliographic source that can be searched for recent papers.
///
/// Implementations are restartable and hold no persisted state between
/// calls; rate limiter state lives inside each instance and is never shared
/// across sources.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Search the source for papers matching `query` published or indexed in
    /// the last `days_back` days, returning at most `max_results` records.
    async fn search_and_fetch(
        &self,
        query: &str,
        max_results: u32,
        days_back: u32,
    ) -> Result<Vec<Paper>>;
}

/// A source-scoped failure captured during discovery. One source failing
/// never aborts sibling sources; the caller aggregates these alongside the
/// unified result sequence.
#[derive(Debug, Clone)]
pub struct SourceFailure {
    pub source: String,
    pub query: String,
    pub message: String,
}

impl std::fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (query \"{}\"): {}", self.source, self.query, self.message)
    }
}
