use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    SearchQuery,
    ProjectKeyword,
    WatchedAuthor,
    NewProject,
}

impl SuggestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchQuery => "search_query",
            Self::ProjectKeyword => "project_keyword",
            Self::WatchedAuthor => "watched_author",
            Self::NewProject => "new_project",
        }
    }
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuggestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search_query" => Ok(Self::SearchQuery),
            "project_keyword" => Ok(Self::ProjectKeyword),
            "watched_author" => Ok(Self::WatchedAuthor),
            "new_project" => Ok(Self::NewProject),
            other => Err(format!("unknown suggestion kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Dismissed,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Dismissed => "dismissed",
        }
    }
}

impl FromStr for SuggestionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "dismissed" => Ok(Self::Dismissed),
            other => Err(format!("unknown suggestion status: {other}")),
        }
    }
}

/// A proposed config improvement derived from feedback patterns. Created by
/// the suggestion job; only an explicit accept/dismiss mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSuggestion {
    pub id: i64,
    pub kind: SuggestionKind,
    pub text: String,
    /// Structured patch for applying the suggestion automatically.
    pub data: Option<serde_json::Value>,
    pub rationale: String,
    pub status: SuggestionStatus,
    pub created_at: String,
    pub reviewed_at: Option<String>,
}
