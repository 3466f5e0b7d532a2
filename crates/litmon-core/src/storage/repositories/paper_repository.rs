use std::collections::HashSet;
use std::str::FromStr;
use std::sync::MutexGuard;

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection};

use crate::error::Result;
use crate::models::{Feedback, Paper, PaperSource};

/// Every paper column the repository reads, in row-mapping order.
const PAPER_COLUMNS: &str = "id, source, title, authors, journal, pub_date, abstract, url, \
     full_text_url, is_open_access, doi, summary, relevance_score, ranking_rationale, \
     matched_projects, first_seen_at, last_digest_at, is_seed, seed_origin, user_feedback, \
     feedback_at";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedbackStats {
    pub starred: u32,
    pub dismissed: u32,
    pub neutral: u32,
    pub seeds: u32,
}

pub trait PaperRepository {
    fn exists(&self, id: &str) -> Result<bool>;
    fn existing_ids_among(&self, ids: &[String]) -> Result<HashSet<String>>;
    fn doi_exists(&self, doi: &str) -> Result<bool>;
    /// Insert-or-skip. Returns false when the id is already stored or a
    /// non-empty DOI matches a stored non-null DOI; the stored copy stays
    /// authoritative either way.
    fn insert(&self, paper: &Paper) -> Result<bool>;
    /// Seed-variant insert: a duplicate id promotes the stored row to seed
    /// status with starred feedback instead of being a plain skip.
    fn insert_seed(&self, paper: &Paper, origin: &str) -> Result<bool>;
    fn update_ranking(
        &self,
        id: &str,
        summary: &str,
        score: f64,
        rationale: &str,
        matched_projects: &[String],
    ) -> Result<()>;
    fn find_by_id(&self, id: &str) -> Result<Option<Paper>>;
    fn unranked(&self) -> Result<Vec<Paper>>;
    fn list_since(
        &self,
        since: &str,
        min_score: Option<f64>,
        limit: Option<u32>,
    ) -> Result<Vec<Paper>>;
    fn list_for_digest(&self, since: &str, min_score: Option<f64>) -> Result<Vec<Paper>>;
    fn digested_count_since(&self, since: &str, min_score: Option<f64>) -> Result<u32>;
    fn mark_digested(&self, ids: &[String]) -> Result<()>;
    fn set_feedback(&self, id: &str, feedback: Option<Feedback>) -> Result<()>;
    fn starred(&self, limit: u32) -> Result<Vec<Paper>>;
    fn dismissed(&self, limit: u32) -> Result<Vec<Paper>>;
    fn feedback_stats(&self) -> Result<FeedbackStats>;
    fn seed_papers(&self) -> Result<Vec<Paper>>;
}

pub struct SqlitePaperRepository<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> SqlitePaperRepository<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }

    fn row_to_paper(row: &rusqlite::Row) -> rusqlite::Result<Paper> {
        let source_str: String = row.get(1)?;
        let authors_json: String = row.get(3)?;
        let projects_json: Option<String> = row.get(14)?;
        let feedback_str: Option<String> = row.get(19)?;

        Ok(Paper {
            id: row.get(0)?,
            source: PaperSource::from_str(&source_str).unwrap_or(PaperSource::Manual),
            title: row.get(2)?,
            authors: serde_json::from_str(&authors_json).unwrap_or_default(),
            journal: row.get(4)?,
            pub_date: row.get(5)?,
            abstract_text: row.get(6)?,
            url: row.get(7)?,
            full_text_url: row.get(8)?,
            is_open_access: row.get(9)?,
            doi: row.get(10)?,
            summary: row.get(11)?,
            relevance_score: row.get(12)?,
            ranking_rationale: row.get(13)?,
            matched_projects: projects_json
                .and_then(|j| serde_json::from_str(&j).ok())
                .unwrap_or_default(),
            first_seen_at: row.get(15)?,
            last_digest_at: row.get(16)?,
            is_seed: row.get(17)?,
            seed_origin: row.get(18)?,
            feedback: feedback_str.and_then(|s| Feedback::from_str(&s).ok()),
            feedback_at: row.get(20)?,
        })
    }

    fn query_papers(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::types::ToSql],
    ) -> Result<Vec<Paper>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, Self::row_to_paper)?;
        let mut papers = Vec::new();
        for row in rows {
            papers.push(row?);
        }
        Ok(papers)
    }

    fn insert_row(conn: &Connection, paper: &Paper, seed: Option<&str>) -> Result<()> {
        let authors_json = serde_json::to_string(&paper.authors)?;
        let projects_json = if paper.matched_projects.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&paper.matched_projects)?)
        };
        let now = Utc::now().to_rfc3339();
        let feedback = seed.map(|_| Feedback::Star.as_str());

        conn.execute(
            "INSERT INTO papers (
                id, source, title, authors, journal, pub_date, abstract, url,
                full_text_url, is_open_access, doi, summary, relevance_score,
                ranking_rationale, matched_projects, first_seen_at,
                is_seed, seed_origin, user_feedback, feedback_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                       ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            params![
                paper.id,
                paper.source.as_str(),
                paper.title,
                authors_json,
                paper.journal,
                paper.pub_date,
                paper.abstract_text,
                paper.url,
                paper.full_text_url,
                paper.is_open_access,
                paper.doi,
                paper.summary,
                paper.relevance_score,
                paper.ranking_rationale,
                projects_json,
                now,
                seed.is_some(),
                seed,
                feedback,
                seed.map(|_| now.clone()),
            ],
        )?;
        Ok(())
    }
}

impl<'a> PaperRepository for SqlitePaperRepository<'a> {
    fn exists(&self, id: &str) -> Result<bool> {
        let exists = self
            .conn
            .prepare("SELECT 1 FROM papers WHERE id = ?1")?
            .exists(params![id])?;
        Ok(exists)
    }

    fn existing_ids_among(&self, ids: &[String]) -> Result<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let placeholders = std::iter::repeat("?")
            .take(ids.len())
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!("SELECT id FROM papers WHERE id IN ({placeholders})");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), |row| row.get::<_, String>(0))?;
        let mut found = HashSet::new();
        for row in rows {
            found.insert(row?);
        }
        Ok(found)
    }

    fn doi_exists(&self, doi: &str) -> Result<bool> {
        if doi.is_empty() {
            return Ok(false);
        }
        let exists = self
            .conn
            .prepare("SELECT 1 FROM papers WHERE doi = ?1 AND doi IS NOT NULL")?
            .exists(params![doi])?;
        Ok(exists)
    }

    fn insert(&self, paper: &Paper) -> Result<bool> {
        // The duplicate checks and the insert share one transaction so two
        // concurrent inserts of the same id serialize to a single success.
        let tx = self.conn.unchecked_transaction()?;

        let id_taken = tx
            .prepare("SELECT 1 FROM papers WHERE id = ?1")?
            .exists(params![paper.id])?;
        if id_taken {
            return Ok(false);
        }

        if let Some(doi) = paper.doi.as_deref().filter(|d| !d.is_empty()) {
            let doi_taken = tx
                .prepare("SELECT 1 FROM papers WHERE doi = ?1 AND doi IS NOT NULL")?
                .exists(params![doi])?;
            if doi_taken {
                return Ok(false);
            }
        }

        Self::insert_row(&tx, paper, None)?;
        tx.commit()?;
        Ok(true)
    }

    fn insert_seed(&self, paper: &Paper, origin: &str) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;

        let id_taken = tx
            .prepare("SELECT 1 FROM papers WHERE id = ?1")?
            .exists(params![paper.id])?;
        if id_taken {
            // Promote the stored row without touching its scored fields.
            tx.execute(
                "UPDATE papers SET
                    is_seed = 1,
                    seed_origin = ?1,
                    user_feedback = 'star',
                    feedback_at = ?2,
                    updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?3",
                params![origin, Utc::now().to_rfc3339(), paper.id],
            )?;
            tx.commit()?;
            return Ok(false);
        }

        Self::insert_row(&tx, paper, Some(origin))?;
        tx.commit()?;
        Ok(true)
    }

    fn update_ranking(
        &self,
        id: &str,
        summary: &str,
        score: f64,
        rationale: &str,
        matched_projects: &[String],
    ) -> Result<()> {
        let projects_json = serde_json::to_string(matched_projects)?;
        self.conn.execute(
            "UPDATE papers SET
                summary = ?1,
                relevance_score = ?2,
                ranking_rationale = ?3,
                matched_projects = ?4,
                updated_at = CURRENT_TIMESTAMP
             WHERE id = ?5",
            params![summary, score, rationale, projects_json, id],
        )?;
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Paper>> {
        let sql = format!("SELECT {PAPER_COLUMNS} FROM papers WHERE id = ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let paper = stmt.query_row(params![id], Self::row_to_paper);
        match paper {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn unranked(&self) -> Result<Vec<Paper>> {
        let sql = format!("SELECT {PAPER_COLUMNS} FROM papers WHERE relevance_score IS NULL");
        self.query_papers(&sql, &[])
    }

    fn list_since(
        &self,
        since: &str,
        min_score: Option<f64>,
        limit: Option<u32>,
    ) -> Result<Vec<Paper>> {
        let mut sql = format!("SELECT {PAPER_COLUMNS} FROM papers WHERE first_seen_at >= ?1");
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(since.to_string())];

        if let Some(score) = min_score {
            sql.push_str(" AND relevance_score >= ?2");
            params.push(Box::new(score));
        }

        sql.push_str(" ORDER BY relevance_score DESC NULLS LAST");

        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }

        let refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        self.query_papers(&sql, &refs)
    }

    fn list_for_digest(&self, since: &str, min_score: Option<f64>) -> Result<Vec<Paper>> {
        let mut sql = format!(
            "SELECT {PAPER_COLUMNS} FROM papers
             WHERE first_seen_at >= ?1
               AND last_digest_at IS NULL
               AND is_seed = 0"
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(since.to_string())];

        if let Some(score) = min_score {
            sql.push_str(" AND relevance_score >= ?2");
            params.push(Box::new(score));
        }

        sql.push_str(" ORDER BY relevance_score DESC NULLS LAST");

        let refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        self.query_papers(&sql, &refs)
    }

    fn digested_count_since(&self, since: &str, min_score: Option<f64>) -> Result<u32> {
        let mut sql = String::from(
            "SELECT COUNT(*) FROM papers
             WHERE first_seen_at >= ?1
               AND last_digest_at IS NOT NULL",
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(since.to_string())];

        if let Some(score) = min_score {
            sql.push_str(" AND relevance_score >= ?2");
            params.push(Box::new(score));
        }

        let refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let count = self
            .conn
            .query_row(&sql, refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    fn mark_digested(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let now = Utc::now().to_rfc3339();
        for id in ids {
            self.conn.execute(
                "UPDATE papers SET last_digest_at = ?1 WHERE id = ?2",
                params![now, id],
            )?;
        }
        Ok(())
    }

    fn set_feedback(&self, id: &str, feedback: Option<Feedback>) -> Result<()> {
        let feedback_at = feedback.map(|_| Utc::now().to_rfc3339());
        self.conn.execute(
            "UPDATE papers SET
                user_feedback = ?1,
                feedback_at = ?2,
                updated_at = CURRENT_TIMESTAMP
             WHERE id = ?3",
            params![feedback.map(|f| f.as_str()), feedback_at, id],
        )?;
        Ok(())
    }

    fn starred(&self, limit: u32) -> Result<Vec<Paper>> {
        let sql = format!(
            "SELECT {PAPER_COLUMNS} FROM papers
             WHERE user_feedback = 'star'
             ORDER BY feedback_at DESC LIMIT {limit}"
        );
        self.query_papers(&sql, &[])
    }

    fn dismissed(&self, limit: u32) -> Result<Vec<Paper>> {
        let sql = format!(
            "SELECT {PAPER_COLUMNS} FROM papers
             WHERE user_feedback = 'dismiss'
             ORDER BY feedback_at DESC LIMIT {limit}"
        );
        self.query_papers(&sql, &[])
    }

    fn feedback_stats(&self) -> Result<FeedbackStats> {
        let stats = self.conn.query_row(
            "SELECT
                COUNT(CASE WHEN user_feedback = 'star' THEN 1 END),
                COUNT(CASE WHEN user_feedback = 'dismiss' THEN 1 END),
                COUNT(CASE WHEN user_feedback IS NULL THEN 1 END),
                COUNT(CASE WHEN is_seed = 1 THEN 1 END)
             FROM papers",
            [],
            |row| {
                Ok(FeedbackStats {
                    starred: row.get(0)?,
                    dismissed: row.get(1)?,
                    neutral: row.get(2)?,
                    seeds: row.get(3)?,
                })
            },
        )?;
        Ok(stats)
    }

    fn seed_papers(&self) -> Result<Vec<Paper>> {
        let sql = format!(
            "SELECT {PAPER_COLUMNS} FROM papers WHERE is_seed = 1 ORDER BY created_at DESC"
        );
        self.query_papers(&sql, &[])
    }
}
