use serde::Deserialize;
use tracing::warn;

pub const FALLBACK_SUMMARY: &str = "[Failed to generate summary]";
pub const FALLBACK_RATIONALE: &str = "[Failed to parse ranking response]";

/// The oracle's per-paper assessment, decoded from its JSON reply.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OracleVerdict {
    #[serde(default)]
    pub summary: String,
    #[serde(default = "default_score")]
    pub relevance_score: f64,
    #[serde(default)]
    pub ranking_rationale: String,
    #[serde(default)]
    pub matched_projects: Vec<String>,
}

fn default_score() -> f64 {
    0.5
}

impl OracleVerdict {
    /// Decode a completion. Any malformed reply degrades to the fixed
    /// fallback verdict rather than failing the paper.
    pub fn parse(raw: &str) -> Self {
        let body = strip_code_fence(raw);
        match serde_json::from_str::<OracleVerdict>(body) {
            Ok(mut verdict) => {
                verdict.relevance_score = verdict.relevance_score.clamp(0.0, 1.0);
                verdict
            }
            Err(e) => {
                warn!(error = %e, "unparseable ranking response, using fallback verdict");
                Self::fallback()
            }
        }
    }

    /// Neutral verdict used when the reply cannot be decoded.
    pub fn fallback() -> Self {
        Self {
            summary: FALLBACK_SUMMARY.to_string(),
            relevance_score: 0.5,
            ranking_rationale: FALLBACK_RATIONALE.to_string(),
            matched_projects: Vec::new(),
        }
    }

    /// True for the fixed verdict produced when decoding failed. Its
    /// neutral 0.5 score is stored as-is, with no journal weighting.
    pub fn is_fallback(&self) -> bool {
        *self == Self::fallback()
    }

    /// Drop hallucinated project names, keeping only configured ones.
    pub fn retain_known_projects(&mut self, known: &[String]) {
        self.matched_projects.retain(|p| known.contains(p));
    }
}

/// Models often wrap JSON in a markdown fence despite instructions.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let verdict = OracleVerdict::parse(
            r#"{"summary":"Key finding.","relevance_score":0.8,"ranking_rationale":"Direct hit.","matched_projects":["fibrosis"]}"#,
        );
        assert_eq!(verdict.summary, "Key finding.");
        assert_eq!(verdict.relevance_score, 0.8);
        assert_eq!(verdict.matched_projects, vec!["fibrosis"]);
    }

    #[test]
    fn strips_fenced_json() {
        let raw = "```json\n{\"summary\":\"S\",\"relevance_score\":0.4}\n```";
        let verdict = OracleVerdict::parse(raw);
        assert_eq!(verdict.summary, "S");
        assert_eq!(verdict.relevance_score, 0.4);
    }

    #[test]
    fn prose_reply_degrades_to_fallback() {
        let verdict = OracleVerdict::parse("I would rate this paper highly relevant.");
        assert_eq!(verdict, OracleVerdict::fallback());
        assert_eq!(verdict.relevance_score, 0.5);
        assert!(!verdict.ranking_rationale.is_empty());
        assert!(verdict.matched_projects.is_empty());
    }

    #[test]
    fn out_of_range_score_is_clamped() {
        let verdict = OracleVerdict::parse(r#"{"relevance_score":1.7}"#);
        assert_eq!(verdict.relevance_score, 1.0);
        let verdict = OracleVerdict::parse(r#"{"relevance_score":-0.2}"#);
        assert_eq!(verdict.relevance_score, 0.0);
    }

    #[test]
    fn unknown_projects_are_dropped() {
        let mut verdict =
            OracleVerdict::parse(r#"{"matched_projects":["fibrosis","made-up project"]}"#);
        verdict.retain_known_projects(&["fibrosis".to_string(), "cholestasis".to_string()]);
        assert_eq!(verdict.matched_projects, vec!["fibrosis"]);
    }

    #[test]
    fn fence_without_language_tag() {
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), r#"{"a":1}"#);
        assert_eq!(strip_code_fence("  {\"a\":1}  "), r#"{"a":1}"#);
    }
}
