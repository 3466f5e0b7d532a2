mod connection;
pub mod migrations;
mod repositories;
mod schema;

pub use connection::ConnectionPool;
pub use migrations::{get_applied_versions, run_migrations, Migration};
pub use repositories::{
    FeedbackStats, PaperRepository, RunRepository, SqlitePaperRepository, SqliteRunRepository,
    SqliteSuggestionRepository, SuggestionRepository,
};
pub use schema::SCHEMA_VERSION;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::Result;
use crate::models::{ConfigSuggestion, Feedback, Paper, SearchRun, SuggestionKind, SuggestionStatus};

pub fn open_database(path: &Path) -> Result<ConnectionPool> {
    let pool = ConnectionPool::open(path)?;
    {
        let conn = pool.get_connection();
        migrations::run_migrations(&conn)?;
    }
    Ok(pool)
}

pub fn open_in_memory() -> Result<ConnectionPool> {
    let pool = ConnectionPool::open_in_memory()?;
    {
        let conn = pool.get_connection();
        migrations::run_migrations(&conn)?;
    }
    Ok(pool)
}

#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total_papers: u32,
    pub by_source: HashMap<String, u32>,
    pub ranked_papers: u32,
    pub high_priority: u32,
    pub total_runs: u32,
    pub feedback: FeedbackStats,
}

/// The single source of truth for "already seen": durable, keyed-by-id
/// persistence of papers, search runs, feedback, and config suggestions.
pub struct PaperStore {
    pool: ConnectionPool,
}

impl PaperStore {
    pub fn open(path: &Path) -> Result<Self> {
        let pool = open_database(path)?;
        Ok(Self { pool })
    }

    pub fn open_in_memory() -> Result<Self> {
        let pool = open_in_memory()?;
        Ok(Self { pool })
    }

    pub fn path(&self) -> Option<&str> {
        self.pool.path()
    }

    // ─── Papers ─────────────────────────────────────────────────────────────

    pub fn exists(&self, id: &str) -> Result<bool> {
        SqlitePaperRepository::new(self.pool.get_connection()).exists(id)
    }

    pub fn existing_ids_among(&self, ids: &[String]) -> Result<HashSet<String>> {
        SqlitePaperRepository::new(self.pool.get_connection()).existing_ids_among(ids)
    }

    pub fn doi_exists(&self, doi: &str) -> Result<bool> {
        SqlitePaperRepository::new(self.pool.get_connection()).doi_exists(doi)
    }

    /// Insert-or-skip; false means a duplicate was dropped.
    pub fn insert(&self, paper: &Paper) -> Result<bool> {
        SqlitePaperRepository::new(self.pool.get_connection()).insert(paper)
    }

    /// Insert a batch; each paper is an independent atomic insert-or-skip.
    /// Returns (total, newly inserted).
    pub fn insert_papers(&self, papers: &[Paper]) -> Result<(u32, u32)> {
        let mut new_count = 0u32;
        for paper in papers {
            if self.insert(paper)? {
                new_count += 1;
            }
        }
        Ok((papers.len() as u32, new_count))
    }

    pub fn insert_seed(&self, paper: &Paper, origin: &str) -> Result<bool> {
        SqlitePaperRepository::new(self.pool.get_connection()).insert_seed(paper, origin)
    }

    pub fn update_ranking(
        &self,
        id: &str,
        summary: &str,
        score: f64,
        rationale: &str,
        matched_projects: &[String],
    ) -> Result<()> {
        SqlitePaperRepository::new(self.pool.get_connection())
            .update_ranking(id, summary, score, rationale, matched_projects)
    }

    pub fn find(&self, id: &str) -> Result<Option<Paper>> {
        SqlitePaperRepository::new(self.pool.get_connection()).find_by_id(id)
    }

    pub fn unranked(&self) -> Result<Vec<Paper>> {
        SqlitePaperRepository::new(self.pool.get_connection()).unranked()
    }

    /// Papers first seen since `since`, ordered by relevance score descending
    /// with unscored records after all scored ones.
    pub fn papers_since(
        &self,
        since: &str,
        min_score: Option<f64>,
        limit: Option<u32>,
    ) -> Result<Vec<Paper>> {
        SqlitePaperRepository::new(self.pool.get_connection()).list_since(since, min_score, limit)
    }

    /// The digest window: same ordering as [`papers_since`] but excluding
    /// already-digested and seed records.
    pub fn papers_for_digest(&self, since: &str, min_score: Option<f64>) -> Result<Vec<Paper>> {
        SqlitePaperRepository::new(self.pool.get_connection()).list_for_digest(since, min_score)
    }

    /// Already-digested rows in the window, for the digest's excluded count.
    /// Seed rows never get a `last_digest_at`, so they are not counted.
    pub fn digested_count_since(&self, since: &str, min_score: Option<f64>) -> Result<u32> {
        SqlitePaperRepository::new(self.pool.get_connection())
            .digested_count_since(since, min_score)
    }

    pub fn mark_digested(&self, ids: &[String]) -> Result<()> {
        SqlitePaperRepository::new(self.pool.get_connection()).mark_digested(ids)
    }

    // ─── Feedback ───────────────────────────────────────────────────────────

    pub fn set_feedback(&self, id: &str, feedback: Option<Feedback>) -> Result<()> {
        SqlitePaperRepository::new(self.pool.get_connection()).set_feedback(id, feedback)
    }

    pub fn starred(&self, limit: u32) -> Result<Vec<Paper>> {
        SqlitePaperRepository::new(self.pool.get_connection()).starred(limit)
    }

    pub fn dismissed(&self, limit: u32) -> Result<Vec<Paper>> {
        SqlitePaperRepository::new(self.pool.get_connection()).dismissed(limit)
    }

    pub fn feedback_stats(&self) -> Result<FeedbackStats> {
        SqlitePaperRepository::new(self.pool.get_connection()).feedback_stats()
    }

    pub fn seed_papers(&self) -> Result<Vec<Paper>> {
        SqlitePaperRepository::new(self.pool.get_connection()).seed_papers()
    }

    // ─── Search runs ────────────────────────────────────────────────────────

    pub fn record_search_run(
        &self,
        papers_found: u32,
        new_papers: u32,
        high_priority_count: u32,
    ) -> Result<i64> {
        SqliteRunRepository::new(self.pool.get_connection())
            .record(papers_found, new_papers, high_priority_count)
    }

    pub fn search_runs(&self, limit: u32) -> Result<Vec<SearchRun>> {
        SqliteRunRepository::new(self.pool.get_connection()).recent(limit)
    }

    // ─── Config suggestions ─────────────────────────────────────────────────

    pub fn add_suggestion(
        &self,
        kind: SuggestionKind,
        text: &str,
        data: Option<&serde_json::Value>,
        rationale: &str,
    ) -> Result<i64> {
        SqliteSuggestionRepository::new(self.pool.get_connection())
            .add(kind, text, data, rationale)
    }

    pub fn pending_suggestions(&self) -> Result<Vec<ConfigSuggestion>> {
        SqliteSuggestionRepository::new(self.pool.get_connection()).pending()
    }

    pub fn all_suggestions(&self, limit: u32) -> Result<Vec<ConfigSuggestion>> {
        SqliteSuggestionRepository::new(self.pool.get_connection()).all(limit)
    }

    pub fn resolve_suggestion(&self, id: i64, status: SuggestionStatus) -> Result<()> {
        SqliteSuggestionRepository::new(self.pool.get_connection()).resolve(id, status)
    }

    // ─── Stats ──────────────────────────────────────────────────────────────

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.pool.get_connection();

        let total_papers: u32 =
            conn.query_row("SELECT COUNT(*) FROM papers", [], |row| row.get(0))?;

        let mut by_source = HashMap::new();
        {
            let mut stmt = conn.prepare("SELECT source, COUNT(*) FROM papers GROUP BY source")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
            })?;
            for row in rows {
                let (source, count) = row?;
                by_source.insert(source, count);
            }
        }

        let ranked_papers: u32 = conn.query_row(
            "SELECT COUNT(*) FROM papers WHERE relevance_score IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        let high_priority: u32 = conn.query_row(
            "SELECT COUNT(*) FROM papers WHERE relevance_score >= 0.7",
            [],
            |row| row.get(0),
        )?;

        let total_runs: u32 =
            conn.query_row("SELECT COUNT(*) FROM search_runs", [], |row| row.get(0))?;

        drop(conn);
        let feedback = self.feedback_stats()?;

        Ok(StoreStats {
            total_papers,
            by_source,
            ranked_papers,
            high_priority,
            total_runs,
            feedback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaperSource;

    fn paper(id: &str, source: PaperSource) -> Paper {
        let mut p = Paper::new(id, source, format!("Paper {id}"));
        p.journal = "Test Journal".to_string();
        p
    }

    #[test]
    fn insert_same_id_twice_reports_duplicate() {
        let store = PaperStore::open_in_memory().unwrap();
        let p = paper("11111", PaperSource::Pubmed);

        assert!(store.insert(&p).unwrap());
        assert!(!store.insert(&p).unwrap());

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_papers, 1);
    }

    #[test]
    fn cross_source_doi_merge_keeps_first_writer() {
        let store = PaperStore::open_in_memory().unwrap();

        let mut preprint = paper("doi:10.1/x", PaperSource::Biorxiv);
        preprint.doi = Some("10.1/x".to_string());
        let mut published = paper("22222", PaperSource::Pubmed);
        published.doi = Some("10.1/x".to_string());

        assert!(store.insert(&preprint).unwrap());
        assert!(!store.insert(&published).unwrap());

        assert_eq!(store.stats().unwrap().total_papers, 1);
        let stored = store.find("doi:10.1/x").unwrap().unwrap();
        assert_eq!(stored.source, PaperSource::Biorxiv);
        assert!(store.find("22222").unwrap().is_none());
    }

    #[test]
    fn doi_merge_in_reverse_insert_order() {
        let store = PaperStore::open_in_memory().unwrap();

        let mut published = paper("22222", PaperSource::Pubmed);
        published.doi = Some("10.1/x".to_string());
        let mut preprint = paper("doi:10.1/x", PaperSource::Biorxiv);
        preprint.doi = Some("10.1/x".to_string());

        assert!(store.insert(&published).unwrap());
        assert!(!store.insert(&preprint).unwrap());
        assert_eq!(store.stats().unwrap().total_papers, 1);
        assert_eq!(
            store.find("22222").unwrap().unwrap().source,
            PaperSource::Pubmed
        );
    }

    #[test]
    fn missing_doi_never_merges() {
        let store = PaperStore::open_in_memory().unwrap();

        let mut with_doi = paper("a", PaperSource::Pubmed);
        with_doi.doi = Some("10.1/y".to_string());
        let without_doi = paper("b", PaperSource::Pubmed);

        assert!(store.insert(&with_doi).unwrap());
        assert!(store.insert(&without_doi).unwrap());
        assert_eq!(store.stats().unwrap().total_papers, 2);
    }

    #[test]
    fn windowed_query_orders_scored_before_unscored() {
        let store = PaperStore::open_in_memory().unwrap();

        for id in ["a", "b", "c", "d"] {
            store.insert(&paper(id, PaperSource::Pubmed)).unwrap();
        }
        store.update_ranking("b", "s", 0.4, "r", &[]).unwrap();
        store.update_ranking("d", "s", 0.9, "r", &[]).unwrap();

        let papers = store.papers_since("2000-01-01", None, None).unwrap();
        let ids: Vec<&str> = papers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(&ids[..2], &["d", "b"]);
        // Unscored records sort after all scored ones.
        assert!(papers[2].relevance_score.is_none());
        assert!(papers[3].relevance_score.is_none());
    }

    #[test]
    fn digest_excludes_already_digested_and_seeds() {
        let store = PaperStore::open_in_memory().unwrap();

        store.insert(&paper("fresh", PaperSource::Pubmed)).unwrap();
        store.insert(&paper("sent", PaperSource::Pubmed)).unwrap();
        store
            .insert_seed(&paper("seed", PaperSource::Manual), "doi_lookup")
            .unwrap();
        store.mark_digested(&["sent".to_string()]).unwrap();

        let digest = store.papers_for_digest("2000-01-01", None).unwrap();
        let ids: Vec<&str> = digest.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["fresh"]);

        // A later score change never brings a digested record back.
        store.update_ranking("sent", "s", 0.99, "r", &[]).unwrap();
        let digest = store.papers_for_digest("2000-01-01", None).unwrap();
        assert_eq!(digest.len(), 1);
    }

    #[test]
    fn digested_count_tallies_only_covered_rows() {
        let store = PaperStore::open_in_memory().unwrap();

        store.insert(&paper("fresh", PaperSource::Pubmed)).unwrap();
        store.insert(&paper("sent", PaperSource::Pubmed)).unwrap();
        store
            .insert_seed(&paper("seed", PaperSource::Manual), "doi_lookup")
            .unwrap();
        store.mark_digested(&["sent".to_string()]).unwrap();

        // The seed row is skipped by the digest but was never digested,
        // so it does not inflate the count.
        assert_eq!(store.digested_count_since("2000-01-01", None).unwrap(), 1);
        assert_eq!(store.digested_count_since("2999-01-01", None).unwrap(), 0);
    }

    #[test]
    fn seed_insert_promotes_existing_row() {
        let store = PaperStore::open_in_memory().unwrap();

        let p = paper("33333", PaperSource::Pubmed);
        store.insert(&p).unwrap();
        store.update_ranking("33333", "sum", 0.8, "why", &[]).unwrap();

        let inserted = store.insert_seed(&p, "pmid_lookup").unwrap();
        assert!(!inserted);

        let stored = store.find("33333").unwrap().unwrap();
        assert!(stored.is_seed);
        assert_eq!(stored.seed_origin.as_deref(), Some("pmid_lookup"));
        assert_eq!(stored.feedback, Some(Feedback::Star));
        // Scored fields untouched by the promotion.
        assert_eq!(stored.relevance_score, Some(0.8));
        assert_eq!(stored.summary.as_deref(), Some("sum"));
    }

    #[test]
    fn feedback_set_and_clear() {
        let store = PaperStore::open_in_memory().unwrap();
        store.insert(&paper("f1", PaperSource::Pubmed)).unwrap();

        store.set_feedback("f1", Some(Feedback::Star)).unwrap();
        assert_eq!(store.starred(10).unwrap().len(), 1);

        store.set_feedback("f1", None).unwrap();
        assert!(store.starred(10).unwrap().is_empty());
        assert!(store.find("f1").unwrap().unwrap().feedback_at.is_none());
    }

    #[test]
    fn ranking_round_trips_matched_projects() {
        let store = PaperStore::open_in_memory().unwrap();
        store.insert(&paper("r1", PaperSource::Biorxiv)).unwrap();

        store
            .update_ranking("r1", "summary", 0.66, "because", &["Gut-Liver Axis".to_string()])
            .unwrap();

        let stored = store.find("r1").unwrap().unwrap();
        assert_eq!(stored.relevance_score, Some(0.66));
        assert_eq!(stored.matched_projects, vec!["Gut-Liver Axis"]);
    }

    #[test]
    fn suggestions_crud() {
        let store = PaperStore::open_in_memory().unwrap();

        let id = store
            .add_suggestion(
                SuggestionKind::SearchQuery,
                "add a cholestasis query",
                Some(&serde_json::json!({"query": "neonatal cholestasis"})),
                "starred papers cluster here",
            )
            .unwrap();

        assert_eq!(store.pending_suggestions().unwrap().len(), 1);
        store
            .resolve_suggestion(id, SuggestionStatus::Accepted)
            .unwrap();
        assert!(store.pending_suggestions().unwrap().is_empty());

        let all = store.all_suggestions(10).unwrap();
        assert_eq!(all[0].status, SuggestionStatus::Accepted);
        assert!(all[0].reviewed_at.is_some());
    }

    #[test]
    fn resolve_unknown_suggestion_errors() {
        let store = PaperStore::open_in_memory().unwrap();
        assert!(store
            .resolve_suggestion(999, SuggestionStatus::Dismissed)
            .is_err());
    }

    #[test]
    fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("papers.db");

        {
            let store = PaperStore::open(&path).unwrap();
            store.insert(&paper("m1", PaperSource::Pubmed)).unwrap();
        }
        // Re-opening re-runs the migration chain against an up-to-date file.
        let store = PaperStore::open(&path).unwrap();
        assert!(store.exists("m1").unwrap());
    }

    #[test]
    fn record_and_list_search_runs() {
        let store = PaperStore::open_in_memory().unwrap();
        store.record_search_run(40, 12, 3).unwrap();
        store.record_search_run(10, 0, 0).unwrap();

        let runs = store.search_runs(10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].papers_found + runs[0].papers_found, 50);
    }
}
