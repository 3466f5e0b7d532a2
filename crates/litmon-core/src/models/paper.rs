use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where a paper record came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaperSource {
    Pubmed,
    Biorxiv,
    Medrxiv,
    Crossref,
    Zotero,
    Manual,
}

impl PaperSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pubmed => "pubmed",
            Self::Biorxiv => "biorxiv",
            Self::Medrxiv => "medrxiv",
            Self::Crossref => "crossref",
            Self::Zotero => "zotero",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for PaperSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaperSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pubmed" => Ok(Self::Pubmed),
            "biorxiv" => Ok(Self::Biorxiv),
            "medrxiv" => Ok(Self::Medrxiv),
            "crossref" => Ok(Self::Crossref),
            "zotero" => Ok(Self::Zotero),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown paper source: {other}")),
        }
    }
}

/// User feedback polarity on a stored paper.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Star,
    Dismiss,
}

impl Feedback {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Star => "star",
            Self::Dismiss => "dismiss",
        }
    }
}

impl FromStr for Feedback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "star" => Ok(Self::Star),
            "dismiss" => Ok(Self::Dismiss),
            other => Err(format!("unknown feedback value: {other}")),
        }
    }
}

/// One discovered scholarly work.
///
/// The identifying and bibliographic fields are immutable once the record is
/// stored. `summary`, `relevance_score`, `ranking_rationale` and
/// `matched_projects` are written only by the ranking engine; the bookkeeping
/// fields below them are owned by the paper store.
///
/// `id` conventions: PubMed records carry the bare PMID, DOI-based records
/// use `doi:<normalized-doi>`, Zotero imports without a DOI use
/// `zotero:<item-key>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub source: PaperSource,
    pub title: String,
    pub authors: Vec<String>,
    pub journal: String,
    /// ISO date (`YYYY-MM-DD`) or the `"Unknown"` sentinel.
    pub pub_date: String,
    pub abstract_text: String,
    pub url: String,
    pub full_text_url: Option<String>,
    pub is_open_access: bool,
    pub doi: Option<String>,

    // Set by the ranking engine. `relevance_score` is None exactly when the
    // paper has never completed a ranking pass.
    pub summary: Option<String>,
    pub relevance_score: Option<f64>,
    pub ranking_rationale: Option<String>,
    pub matched_projects: Vec<String>,

    // Bookkeeping, owned by the paper store.
    pub first_seen_at: Option<String>,
    pub last_digest_at: Option<String>,
    pub is_seed: bool,
    pub seed_origin: Option<String>,
    pub feedback: Option<Feedback>,
    pub feedback_at: Option<String>,
}

impl Paper {
    /// A bibliographic record with no ranking or bookkeeping state, as
    /// produced by source adapters.
    pub fn new(id: impl Into<String>, source: PaperSource, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source,
            title: title.into(),
            authors: Vec::new(),
            journal: String::new(),
            pub_date: "Unknown".to_string(),
            abstract_text: String::new(),
            url: String::new(),
            full_text_url: None,
            is_open_access: false,
            doi: None,
            summary: None,
            relevance_score: None,
            ranking_rationale: None,
            matched_projects: Vec::new(),
            first_seen_at: None,
            last_digest_at: None,
            is_seed: false,
            seed_origin: None,
            feedback: None,
            feedback_at: None,
        }
    }

    pub fn is_ranked(&self) -> bool {
        self.relevance_score.is_some()
    }
}
