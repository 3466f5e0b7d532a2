use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Root application configuration, loaded from `~/.config/litmon/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Search queries run against every source on each discovery cycle.
    pub search_queries: Vec<String>,
    /// Author name fragments that flag a paper in prompts and output.
    pub watched_authors: Vec<String>,
    /// Active research projects with their keywords.
    pub projects: Vec<Project>,
    /// Journal tiers, each with a score weight multiplier.
    pub journal_weights: HashMap<String, JournalTier>,
    pub settings: Settings,
    pub sources: SourcesConfig,
    pub oracle: OracleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JournalTier {
    pub weight: f64,
    #[serde(default)]
    pub journals: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_results_per_query: u32,
    pub days_lookback: u32,
    pub min_relevance_score: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_results_per_query: 100,
            days_lookback: 7,
            min_relevance_score: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// NCBI API key raises the PubMed rate limit from 3 to 10 req/s.
    pub ncbi_api_key: Option<String>,
    /// Contact email sent with NCBI requests.
    pub ncbi_email: Option<String>,
    pub include_medrxiv: bool,
    pub zotero_user_id: Option<String>,
    pub zotero_api_key: Option<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            ncbi_api_key: None,
            ncbi_email: None,
            include_medrxiv: true,
            zotero_user_id: None,
            zotero_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key, never the key itself.
    pub api_key_env: String,
    pub max_tokens: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            max_tokens: 1024,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_queries: Vec::new(),
            watched_authors: Vec::new(),
            projects: Vec::new(),
            journal_weights: HashMap::new(),
            settings: Settings::default(),
            sources: SourcesConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("litmon")
            .join("config.toml")
    }

    /// Load and validate a config file. Validation failures are fatal and
    /// reported before any network activity.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.search_queries.is_empty() {
            return Err(CoreError::Config(
                "config must have at least one search query".to_string(),
            ));
        }
        for tier in self.journal_weights.values() {
            if tier.weight < 0.0 {
                return Err(CoreError::Config(format!(
                    "journal weight must be non-negative, got {}",
                    tier.weight
                )));
            }
        }
        Ok(())
    }

    /// Weight multiplier for a journal; 1.0 when no tier lists it.
    pub fn journal_weight(&self, journal: &str) -> f64 {
        for tier in self.journal_weights.values() {
            if tier.journals.iter().any(|j| j == journal) {
                return tier.weight;
            }
        }
        1.0
    }

    /// Names of projects whose keywords appear in `text` (case-insensitive
    /// substring match).
    pub fn match_projects(&self, text: &str) -> Vec<String> {
        let text_lower = text.to_lowercase();
        self.projects
            .iter()
            .filter(|p| {
                p.keywords
                    .iter()
                    .any(|kw| text_lower.contains(&kw.to_lowercase()))
            })
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn all_keywords(&self) -> HashSet<String> {
        self.projects
            .iter()
            .flat_map(|p| p.keywords.iter().cloned())
            .collect()
    }

    pub fn project_names(&self) -> Vec<String> {
        self.projects.iter().map(|p| p.name.clone()).collect()
    }

    /// Authors in `authors` that match a watched name fragment.
    pub fn watched_among<'a>(&self, authors: &'a [String]) -> Vec<&'a str> {
        authors
            .iter()
            .filter(|a| {
                let lower = a.to_lowercase();
                self.watched_authors
                    .iter()
                    .any(|w| lower.contains(&w.to_lowercase()))
            })
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        toml::from_str(
            r#"
            search_queries = ["biliary atresia microbiome"]
            watched_authors = ["Smith J"]

            [[projects]]
            name = "Gut-Liver Axis"
            keywords = ["microbiome", "bile acid"]

            [[projects]]
            name = "Transplant Outcomes"
            keywords = ["transplant"]

            [journal_weights.high]
            weight = 1.2
            journals = ["Hepatology", "Journal of Hepatology"]

            [journal_weights.low]
            weight = 0.8
            journals = ["Obscure Letters"]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn journal_weight_defaults_to_one() {
        let config = sample();
        assert_eq!(config.journal_weight("Hepatology"), 1.2);
        assert_eq!(config.journal_weight("Obscure Letters"), 0.8);
        assert_eq!(config.journal_weight("Unlisted Journal"), 1.0);
    }

    #[test]
    fn match_projects_is_case_insensitive() {
        let config = sample();
        let matched = config.match_projects("Changes in the gut MICROBIOME after transplant");
        assert_eq!(matched, vec!["Gut-Liver Axis", "Transplant Outcomes"]);
    }

    #[test]
    fn empty_queries_fail_validation() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn watched_authors_match_fragments() {
        let config = sample();
        let authors = vec!["Smith JA".to_string(), "Jones K".to_string()];
        assert_eq!(config.watched_among(&authors), vec!["Smith JA"]);
    }
}
