use std::sync::MutexGuard;

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::SearchRun;

pub trait RunRepository {
    /// Record one discovery cycle; returns the new run id.
    fn record(&self, papers_found: u32, new_papers: u32, high_priority_count: u32) -> Result<i64>;
    fn recent(&self, limit: u32) -> Result<Vec<SearchRun>>;
    fn count(&self) -> Result<u32>;
}

pub struct SqliteRunRepository<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> SqliteRunRepository<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }
}

impl<'a> RunRepository for SqliteRunRepository<'a> {
    fn record(&self, papers_found: u32, new_papers: u32, high_priority_count: u32) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO search_runs (run_at, papers_found, new_papers, high_priority_count)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                Utc::now().to_rfc3339(),
                papers_found,
                new_papers,
                high_priority_count
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn recent(&self, limit: u32) -> Result<Vec<SearchRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_at, papers_found, new_papers, high_priority_count
             FROM search_runs ORDER BY run_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(SearchRun {
                id: row.get(0)?,
                run_at: row.get(1)?,
                papers_found: row.get(2)?,
                new_papers: row.get(3)?,
                high_priority_count: row.get(4)?,
            })
        })?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(row?);
        }
        Ok(runs)
    }

    fn count(&self) -> Result<u32> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM search_runs", [], |row| row.get(0))?;
        Ok(count)
    }
}
