//! litmon rank — scoring oracle client, feedback-calibrated prompts, and
//! config suggestion generation.

pub mod error;
pub mod feedback;
pub mod oracle;
pub mod ranker;
pub mod suggest;
pub mod verdict;

pub use error::{RankError, Result};
pub use oracle::{HttpOracle, ScoringOracle};
pub use ranker::{PaperRanker, RankedPaper};
pub use verdict::OracleVerdict;
