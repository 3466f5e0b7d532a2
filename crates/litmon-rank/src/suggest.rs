use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use litmon_core::{Config, ConfigSuggestion, PaperStore, SuggestionKind};

use crate::error::{RankError, Result};
use crate::feedback::render_example;
use crate::oracle::ScoringOracle;
use crate::verdict::strip_code_fence;

/// Feedback floor below which suggestions would be noise.
const MIN_STARRED: u32 = 5;
/// How many papers of each polarity go into the suggestion prompt.
const PROMPT_PAPER_LIMIT: u32 = 30;

#[derive(Deserialize)]
struct RawSuggestion {
    #[serde(rename = "type")]
    kind: String,
    text: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    rationale: String,
}

/// Ask the oracle to propose config changes from accumulated feedback, and
/// persist the valid ones as pending suggestions. Returns what was stored.
pub async fn generate_suggestions(
    config: &Config,
    store: &PaperStore,
    oracle: &dyn ScoringOracle,
) -> Result<Vec<ConfigSuggestion>> {
    let stats = store.feedback_stats()?;
    if stats.starred < MIN_STARRED {
        return Err(RankError::InsufficientFeedback(format!(
            "{} starred papers recorded, {MIN_STARRED} required",
            stats.starred
        )));
    }

    let starred = store.starred(PROMPT_PAPER_LIMIT)?;
    let dismissed = store.dismissed(PROMPT_PAPER_LIMIT)?;
    let prompt = build_prompt(config, &starred, &dismissed, stats.starred, stats.dismissed);

    let system = "You tune the configuration of a literature monitor based on \
                  the reader's feedback history. Respond with a JSON array only, no prose.";
    let reply = oracle.complete(system, &prompt).await?;
    let raw = parse_suggestions(&reply);
    if raw.is_empty() {
        info!("suggestion run produced nothing usable");
        return Ok(Vec::new());
    }

    let mut stored = Vec::new();
    for suggestion in raw {
        let kind = match SuggestionKind::from_str(&suggestion.kind) {
            Ok(kind) => kind,
            Err(e) => {
                warn!(error = %e, "dropping suggestion with unknown kind");
                continue;
            }
        };
        let id = store.add_suggestion(
            kind,
            &suggestion.text,
            suggestion.data.as_ref(),
            &suggestion.rationale,
        )?;
        stored.push(ConfigSuggestion {
            id,
            kind,
            text: suggestion.text,
            data: suggestion.data,
            rationale: suggestion.rationale,
            status: litmon_core::SuggestionStatus::Pending,
            created_at: String::new(),
            reviewed_at: None,
        });
    }
    info!(count = stored.len(), "config suggestions stored");
    Ok(stored)
}

fn build_prompt(
    config: &Config,
    starred: &[litmon_core::Paper],
    dismissed: &[litmon_core::Paper],
    total_starred: u32,
    total_dismissed: u32,
) -> String {
    let mut prompt = String::from("Current configuration:\n");
    prompt.push_str(&format!(
        "Search queries:\n{}\n",
        config
            .search_queries
            .iter()
            .map(|q| format!("- {q}"))
            .collect::<Vec<_>>()
            .join("\n")
    ));
    prompt.push_str("Projects:\n");
    for project in &config.projects {
        prompt.push_str(&format!("- {}: {}\n", project.name, project.keywords.join(", ")));
    }
    if !config.watched_authors.is_empty() {
        prompt.push_str(&format!(
            "Watched authors: {}\n",
            config.watched_authors.join(", ")
        ));
    }

    prompt.push_str(&format!(
        "\nFeedback so far: {total_starred} starred, {total_dismissed} dismissed.\n"
    ));
    prompt.push_str("\nStarred papers:\n");
    for paper in starred {
        prompt.push_str(&render_example(paper));
        prompt.push('\n');
    }
    if !dismissed.is_empty() {
        prompt.push_str("\nDismissed papers:\n");
        for paper in dismissed {
            prompt.push_str(&render_example(paper));
            prompt.push('\n');
        }
    }

    prompt.push_str(
        "\nPropose up to 5 configuration changes that would surface more papers like \
         the starred ones and fewer like the dismissed ones. Reply with a JSON array \
         of objects with fields: \"type\" (one of search_query, project_keyword, \
         watched_author, new_project), \"text\" (the proposed value), \"data\" \
         (optional structured patch), \"rationale\" (one sentence).",
    );
    prompt
}

/// Decode the reply. Anything short of a JSON array of objects yields an
/// empty list rather than an error.
fn parse_suggestions(reply: &str) -> Vec<RawSuggestion> {
    let body = strip_code_fence(reply);
    match serde_json::from_str::<Vec<RawSuggestion>>(body) {
        Ok(suggestions) => suggestions,
        Err(e) => {
            warn!(error = %e, "unparseable suggestion response");
            Vec::new()
        }
    }
}
