use std::str::FromStr;
use std::sync::MutexGuard;

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::{CoreError, Result};
use crate::models::{ConfigSuggestion, SuggestionKind, SuggestionStatus};

pub trait SuggestionRepository {
    fn add(
        &self,
        kind: SuggestionKind,
        text: &str,
        data: Option<&serde_json::Value>,
        rationale: &str,
    ) -> Result<i64>;
    fn pending(&self) -> Result<Vec<ConfigSuggestion>>;
    fn all(&self, limit: u32) -> Result<Vec<ConfigSuggestion>>;
    fn resolve(&self, id: i64, status: SuggestionStatus) -> Result<()>;
}

pub struct SqliteSuggestionRepository<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> SqliteSuggestionRepository<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }

    fn row_to_suggestion(row: &rusqlite::Row) -> rusqlite::Result<ConfigSuggestion> {
        let kind_str: String = row.get(1)?;
        let data_json: Option<String> = row.get(3)?;
        let status_str: String = row.get(5)?;

        Ok(ConfigSuggestion {
            id: row.get(0)?,
            kind: SuggestionKind::from_str(&kind_str).unwrap_or(SuggestionKind::SearchQuery),
            text: row.get(2)?,
            data: data_json.and_then(|j| serde_json::from_str(&j).ok()),
            rationale: row.get(4)?,
            status: SuggestionStatus::from_str(&status_str).unwrap_or(SuggestionStatus::Pending),
            created_at: row.get(6)?,
            reviewed_at: row.get(7)?,
        })
    }

    fn query(&self, sql: &str) -> Result<Vec<ConfigSuggestion>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], Self::row_to_suggestion)?;
        let mut suggestions = Vec::new();
        for row in rows {
            suggestions.push(row?);
        }
        Ok(suggestions)
    }
}

impl<'a> SuggestionRepository for SqliteSuggestionRepository<'a> {
    fn add(
        &self,
        kind: SuggestionKind,
        text: &str,
        data: Option<&serde_json::Value>,
        rationale: &str,
    ) -> Result<i64> {
        let data_json = data.map(serde_json::to_string).transpose()?;
        self.conn.execute(
            "INSERT INTO config_suggestions (kind, text, data, rationale)
             VALUES (?1, ?2, ?3, ?4)",
            params![kind.as_str(), text, data_json, rationale],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn pending(&self) -> Result<Vec<ConfigSuggestion>> {
        self.query(
            "SELECT id, kind, text, data, rationale, status, created_at, reviewed_at
             FROM config_suggestions WHERE status = 'pending' ORDER BY created_at DESC",
        )
    }

    fn all(&self, limit: u32) -> Result<Vec<ConfigSuggestion>> {
        self.query(&format!(
            "SELECT id, kind, text, data, rationale, status, created_at, reviewed_at
             FROM config_suggestions ORDER BY created_at DESC LIMIT {limit}"
        ))
    }

    fn resolve(&self, id: i64, status: SuggestionStatus) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE config_suggestions SET status = ?1, reviewed_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(CoreError::SuggestionNotFound(id));
        }
        Ok(())
    }
}
