use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: u32 = 2;

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(())
}

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS papers (
            id                TEXT PRIMARY KEY,
            source            TEXT NOT NULL,
            title             TEXT NOT NULL DEFAULT '',
            authors           TEXT NOT NULL DEFAULT '[]',
            journal           TEXT NOT NULL DEFAULT '',
            pub_date          TEXT NOT NULL DEFAULT 'Unknown',
            abstract          TEXT NOT NULL DEFAULT '',
            url               TEXT NOT NULL DEFAULT '',
            full_text_url     TEXT,
            is_open_access    INTEGER NOT NULL DEFAULT 0,
            doi               TEXT,

            summary           TEXT,
            relevance_score   REAL,
            ranking_rationale TEXT,
            matched_projects  TEXT,

            first_seen_at     TEXT,
            created_at        TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at        TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS search_runs (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            run_at              TEXT NOT NULL,
            papers_found        INTEGER NOT NULL DEFAULT 0,
            new_papers          INTEGER NOT NULL DEFAULT 0,
            high_priority_count INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS config_suggestions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            kind        TEXT NOT NULL,
            text        TEXT NOT NULL,
            data        TEXT,
            rationale   TEXT NOT NULL DEFAULT '',
            status      TEXT NOT NULL DEFAULT 'pending',
            created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            reviewed_at TEXT
        );
        ",
    )?;
    Ok(())
}

pub fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_papers_source     ON papers(source);
        CREATE INDEX IF NOT EXISTS idx_papers_pub_date   ON papers(pub_date);
        CREATE INDEX IF NOT EXISTS idx_papers_relevance  ON papers(relevance_score);
        CREATE INDEX IF NOT EXISTS idx_papers_first_seen ON papers(first_seen_at);
        CREATE INDEX IF NOT EXISTS idx_papers_doi        ON papers(doi);
        CREATE INDEX IF NOT EXISTS idx_suggestions_status ON config_suggestions(status);
        ",
    )?;
    Ok(())
}
