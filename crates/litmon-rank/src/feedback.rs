use std::collections::HashSet;

use litmon_core::{Feedback, Paper, PaperStore};

use crate::error::Result;

/// How many feedback papers to pull from the store per polarity.
const POOL_LIMIT: u32 = 20;
/// How many examples of each polarity end up in the prompt.
const EXAMPLES_PER_POLARITY: usize = 5;

const TITLE_MAX_CHARS: usize = 60;

/// How much a feedback example would teach the oracle. A starred paper the
/// model already scored high (or a dismissed paper it scored low) confirms
/// the status quo and carries little signal; a correction carries a lot.
fn informativeness(paper: &Paper, polarity: Feedback) -> f64 {
    let score = paper.relevance_score.unwrap_or(0.5);
    match polarity {
        Feedback::Star => 1.0 - score,
        Feedback::Dismiss => score,
    }
}

/// Pick up to `max_count` examples, most informative first, greedily
/// preferring candidates that introduce a project not yet represented.
/// Remaining slots are filled from the passed-over candidates in order, so
/// project overlap alone never starves the selection.
pub fn select_examples(papers: &[Paper], polarity: Feedback, max_count: usize) -> Vec<&Paper> {
    let mut ranked: Vec<&Paper> = papers.iter().collect();
    ranked.sort_by(|a, b| {
        informativeness(b, polarity).total_cmp(&informativeness(a, polarity))
    });

    let mut selected: Vec<&Paper> = Vec::with_capacity(max_count);
    let mut passed_over: Vec<&Paper> = Vec::new();
    let mut seen_projects: HashSet<&str> = HashSet::new();

    for paper in ranked {
        if selected.len() >= max_count {
            break;
        }
        let adds_project = paper.matched_projects.is_empty()
            || paper
                .matched_projects
                .iter()
                .any(|p| !seen_projects.contains(p.as_str()));
        if adds_project {
            seen_projects.extend(paper.matched_projects.iter().map(String::as_str));
            selected.push(paper);
        } else {
            passed_over.push(paper);
        }
    }

    for paper in passed_over {
        if selected.len() >= max_count {
            break;
        }
        selected.push(paper);
    }

    selected
}

/// One prompt line for a feedback example.
pub fn render_example(paper: &Paper) -> String {
    let title: String = if paper.title.chars().count() > TITLE_MAX_CHARS {
        let truncated: String = paper.title.chars().take(TITLE_MAX_CHARS - 3).collect();
        format!("{}...", truncated.trim_end())
    } else {
        paper.title.clone()
    };

    let journal = if paper.journal.is_empty() {
        "unknown journal"
    } else {
        &paper.journal
    };
    let score = match paper.relevance_score {
        Some(s) => format!("score was {s:.2}"),
        None => "unscored".to_string(),
    };

    let mut line = format!("- \"{title}\" ({journal}, {score})");
    if !paper.matched_projects.is_empty() {
        line.push_str(&format!(" [Projects: {}]", paper.matched_projects.join(", ")));
    }
    line
}

/// Build the calibration block for the system prompt, or `None` when the
/// reader has given no feedback yet.
pub fn build_feedback_section(store: &PaperStore) -> Result<Option<String>> {
    let starred = store.starred(POOL_LIMIT)?;
    let dismissed = store.dismissed(POOL_LIMIT)?;
    if starred.is_empty() && dismissed.is_empty() {
        return Ok(None);
    }

    let mut section = String::from("## Reader feedback calibration\n");
    if !starred.is_empty() {
        section.push_str("\nPapers the reader starred (score similar work higher):\n");
        for paper in select_examples(&starred, Feedback::Star, EXAMPLES_PER_POLARITY) {
            section.push_str(&render_example(paper));
            section.push('\n');
        }
    }
    if !dismissed.is_empty() {
        section.push_str("\nPapers the reader dismissed (score similar work lower):\n");
        for paper in select_examples(&dismissed, Feedback::Dismiss, EXAMPLES_PER_POLARITY) {
            section.push_str(&render_example(paper));
            section.push('\n');
        }
    }
    Ok(Some(section))
}

#[cfg(test)]
mod tests {
    use super::*;
    use litmon_core::PaperSource;

    fn paper(id: &str, score: Option<f64>, projects: &[&str]) -> Paper {
        let mut p = Paper::new(id, PaperSource::Pubmed, format!("Title {id}"));
        p.relevance_score = score;
        p.matched_projects = projects.iter().map(|s| s.to_string()).collect();
        p.journal = "J".to_string();
        p
    }

    #[test]
    fn starred_low_scores_come_first() {
        let papers = vec![
            paper("high", Some(0.9), &[]),
            paper("low", Some(0.1), &[]),
            paper("mid", Some(0.5), &[]),
        ];
        let picked = select_examples(&papers, Feedback::Star, 2);
        assert_eq!(picked[0].id, "low");
        assert_eq!(picked[1].id, "mid");
    }

    #[test]
    fn dismissed_high_scores_come_first() {
        let papers = vec![paper("low", Some(0.1), &[]), paper("high", Some(0.9), &[])];
        let picked = select_examples(&papers, Feedback::Dismiss, 1);
        assert_eq!(picked[0].id, "high");
    }

    #[test]
    fn unseen_project_is_preferred_but_overlap_never_starves() {
        let papers = vec![
            paper("a", Some(0.1), &["p1"]),
            paper("b", Some(0.2), &["p1"]),
            paper("c", Some(0.3), &["p2"]),
            paper("d", Some(0.4), &["p1"]),
        ];
        let picked = select_examples(&papers, Feedback::Star, 3);
        let ids: Vec<&str> = picked.iter().map(|p| p.id.as_str()).collect();
        // "c" jumps the queue for introducing p2; the last slot falls back
        // to an overlapping candidate.
        assert!(ids.contains(&"a"));
        assert!(ids.contains(&"c"));
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn unscored_papers_rank_as_neutral() {
        let papers = vec![paper("scored", Some(0.9), &[]), paper("unscored", None, &[])];
        let picked = select_examples(&papers, Feedback::Star, 2);
        assert_eq!(picked[0].id, "unscored");
    }

    #[test]
    fn example_line_format() {
        let mut p = paper("x", Some(0.823), &["fibrosis"]);
        p.title = "Short title".to_string();
        assert_eq!(
            render_example(&p),
            "- \"Short title\" (J, score was 0.82) [Projects: fibrosis]"
        );

        p.relevance_score = None;
        p.matched_projects.clear();
        assert_eq!(render_example(&p), "- \"Short title\" (J, unscored)");
    }

    #[test]
    fn long_titles_are_truncated() {
        let mut p = paper("x", Some(0.5), &[]);
        p.title = "A".repeat(100);
        let line = render_example(&p);
        assert!(line.contains(&format!("{}...", "A".repeat(57))));
        assert!(!line.contains(&"A".repeat(58)));
    }

    #[test]
    fn no_feedback_yields_no_section() {
        let store = PaperStore::open_in_memory().unwrap();
        store.insert(&paper("1", Some(0.5), &[])).unwrap();
        assert!(build_feedback_section(&store).unwrap().is_none());
    }

    #[test]
    fn section_contains_both_polarities() {
        let store = PaperStore::open_in_memory().unwrap();
        store.insert(&paper("starred", Some(0.2), &["p1"])).unwrap();
        store.insert(&paper("dismissed", Some(0.8), &[])).unwrap();
        store.set_feedback("starred", Some(Feedback::Star)).unwrap();
        store
            .set_feedback("dismissed", Some(Feedback::Dismiss))
            .unwrap();

        let section = build_feedback_section(&store).unwrap().unwrap();
        assert!(section.contains("starred (score similar work higher)"));
        assert!(section.contains("dismissed (score similar work lower)"));
        assert!(section.contains("Title starred"));
        assert!(section.contains("Title dismissed"));
    }
}
