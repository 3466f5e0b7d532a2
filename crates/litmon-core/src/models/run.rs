use serde::{Deserialize, Serialize};

/// Audit record of one discovery cycle. Created once per pipeline invocation
/// and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRun {
    pub id: i64,
    pub run_at: String,
    pub papers_found: u32,
    pub new_papers: u32,
    pub high_priority_count: u32,
}
