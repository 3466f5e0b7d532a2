use tracing::{info, warn};

use litmon_core::{Config, Paper, PaperStore};

use crate::error::Result;
use crate::oracle::ScoringOracle;
use crate::verdict::{OracleVerdict, FALLBACK_SUMMARY};

const MAX_PROMPT_AUTHORS: usize = 5;

/// A paper's verdict after journal weighting, ready for display or storage.
#[derive(Debug, Clone)]
pub struct RankedPaper {
    pub paper_id: String,
    pub title: String,
    pub verdict: OracleVerdict,
}

/// Scores papers one at a time against the configured research context.
/// The feedback section is built once per session and reused for every
/// prompt in the batch.
pub struct PaperRanker<'a> {
    config: &'a Config,
    oracle: &'a dyn ScoringOracle,
    feedback_section: Option<String>,
}

impl<'a> PaperRanker<'a> {
    pub fn new(
        config: &'a Config,
        oracle: &'a dyn ScoringOracle,
        feedback_section: Option<String>,
    ) -> Self {
        Self {
            config,
            oracle,
            feedback_section,
        }
    }

    fn system_prompt(&self) -> String {
        let mut prompt = String::from(
            "You assess newly published papers for a researcher. \
             Their active projects are:\n",
        );
        for project in &self.config.projects {
            prompt.push_str(&format!(
                "- {}: {}\n",
                project.name,
                project.keywords.join(", ")
            ));
        }

        if let Some(section) = &self.feedback_section {
            prompt.push('\n');
            prompt.push_str(section);
        }

        prompt.push_str(
            "\nFor the paper in the next message, respond with JSON only, no prose, \
             using exactly these fields:\n\
             {\"summary\": \"<2-3 sentence summary>\", \
             \"relevance_score\": <0.0-1.0>, \
             \"ranking_rationale\": \"<1 sentence>\", \
             \"matched_projects\": [\"<project names from the list above>\"]}",
        );
        prompt
    }

    fn paper_prompt(&self, paper: &Paper) -> String {
        let authors = if paper.authors.len() > MAX_PROMPT_AUTHORS {
            format!(
                "{} et al. ({} authors)",
                paper.authors[..MAX_PROMPT_AUTHORS].join(", "),
                paper.authors.len()
            )
        } else if paper.authors.is_empty() {
            "Unknown".to_string()
        } else {
            paper.authors.join(", ")
        };

        let weight = self.config.journal_weight(&paper.journal);
        let journal = if weight > 1.0 {
            format!("{} (high-impact venue)", paper.journal)
        } else if weight < 1.0 {
            format!("{} (lower-tier venue)", paper.journal)
        } else {
            paper.journal.clone()
        };

        let mut prompt = format!(
            "Title: {}\nAuthors: {}\nJournal: {}\nPublished: {}\n",
            paper.title, authors, journal, paper.pub_date
        );

        let watched = self.config.watched_among(&paper.authors);
        if !watched.is_empty() {
            prompt.push_str(&format!(
                "Note: includes watched author(s): {}\n",
                watched.join(", ")
            ));
        }

        if paper.abstract_text.is_empty() {
            prompt.push_str("Abstract: [No abstract available]\n");
        } else {
            prompt.push_str(&format!("Abstract: {}\n", paper.abstract_text));
        }
        prompt
    }

    /// Score one paper. An oracle transport failure degrades to a zero-score
    /// verdict so one bad call never sinks the batch.
    pub async fn rank_paper(&self, paper: &Paper) -> RankedPaper {
        let system = self.system_prompt();
        let prompt = self.paper_prompt(paper);

        let verdict = match self.oracle.complete(&system, &prompt).await {
            Ok(reply) => {
                let mut verdict = OracleVerdict::parse(&reply);
                verdict.retain_known_projects(&self.config.project_names());
                // The parse-failure fallback stays at exactly 0.5; only
                // genuine scores get the journal adjustment.
                if !verdict.is_fallback() {
                    let weight = self.config.journal_weight(&paper.journal);
                    verdict.relevance_score = (verdict.relevance_score * weight).min(1.0);
                }
                verdict
            }
            Err(e) => {
                warn!(paper = %paper.id, error = %e, "ranking call failed");
                OracleVerdict {
                    summary: FALLBACK_SUMMARY.to_string(),
                    relevance_score: 0.0,
                    ranking_rationale: format!("[Ranking failed: {e}]"),
                    matched_projects: Vec::new(),
                }
            }
        };

        RankedPaper {
            paper_id: paper.id.clone(),
            title: paper.title.clone(),
            verdict,
        }
    }

    /// Score a batch sequentially, returning results sorted by adjusted
    /// score descending.
    pub async fn rank_papers(&self, papers: &[Paper]) -> Vec<RankedPaper> {
        let mut results = Vec::with_capacity(papers.len());
        for paper in papers {
            results.push(self.rank_paper(paper).await);
        }
        results.sort_by(|a, b| {
            b.verdict
                .relevance_score
                .total_cmp(&a.verdict.relevance_score)
        });
        results
    }

    /// Score a batch and persist every verdict. Persistence is per paper
    /// and independent of the returned display order.
    pub async fn rank_and_store(
        &self,
        store: &PaperStore,
        papers: &[Paper],
    ) -> Result<Vec<RankedPaper>> {
        let results = self.rank_papers(papers).await;
        for result in &results {
            store.update_ranking(
                &result.paper_id,
                &result.verdict.summary,
                result.verdict.relevance_score,
                &result.verdict.ranking_rationale,
                &result.verdict.matched_projects,
            )?;
        }
        info!(ranked = results.len(), "ranking batch stored");
        Ok(results)
    }
}
