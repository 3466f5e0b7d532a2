use rusqlite::Connection;

use super::Migration;
use crate::error::Result;

pub struct V2Feedback;

/// Adds the feedback, seed, and digest bookkeeping columns. Each column add
/// checks `pragma_table_info` first so re-running against an up-to-date
/// database is a no-op.
impl Migration for V2Feedback {
    fn version(&self) -> u32 {
        2
    }

    fn description(&self) -> &'static str {
        "Add user_feedback, feedback_at, is_seed, seed_origin, last_digest_at columns to papers"
    }

    fn up(&self, conn: &Connection) -> Result<()> {
        let columns = [
            ("user_feedback", "ALTER TABLE papers ADD COLUMN user_feedback TEXT"),
            ("feedback_at", "ALTER TABLE papers ADD COLUMN feedback_at TEXT"),
            ("is_seed", "ALTER TABLE papers ADD COLUMN is_seed INTEGER NOT NULL DEFAULT 0"),
            ("seed_origin", "ALTER TABLE papers ADD COLUMN seed_origin TEXT"),
            ("last_digest_at", "ALTER TABLE papers ADD COLUMN last_digest_at TEXT"),
        ];

        for (name, sql) in columns {
            let exists: bool = conn
                .prepare("SELECT 1 FROM pragma_table_info('papers') WHERE name = ?1")?
                .exists(rusqlite::params![name])?;
            if !exists {
                conn.execute(sql, [])?;
            }
        }

        conn.execute_batch(
            "
            CREATE INDEX IF NOT EXISTS idx_papers_feedback ON papers(user_feedback);
            CREATE INDEX IF NOT EXISTS idx_papers_seed     ON papers(is_seed);
            CREATE INDEX IF NOT EXISTS idx_papers_digest   ON papers(last_digest_at);
            ",
        )?;
        Ok(())
    }
}
