//! SQLite-backed translation job store.
//!
//! Jobs transition forward only (queued -> running -> completed | failed)
//! and are retained for history and re-translation detection.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};

use super::types::{JobStatus, TranslationJob};
use super::{parse_ts, parse_ts_opt, StoreError};

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS translation_jobs (
                id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'queued',
                stats TEXT,
                output_path TEXT,
                error TEXT,
                config_hash TEXT,
                created_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON translation_jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_path ON translation_jobs(file_path);
            "#,
        )?;
        Ok(())
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<TranslationJob> {
        let status: String = row.get(2)?;
        let stats_json: Option<String> = row.get(3)?;
        Ok(TranslationJob {
            id: row.get(0)?,
            file_path: row.get(1)?,
            status: JobStatus::parse(&status).unwrap_or(JobStatus::Queued),
            stats: stats_json.and_then(|s| serde_json::from_str(&s).ok()),
            output_path: row.get(4)?,
            error: row.get(5)?,
            config_hash: row.get(6)?,
            created_at: parse_ts(&row.get::<_, String>(7)?),
            completed_at: parse_ts_opt(row.get(8)?),
        })
    }

    const COLUMNS: &'static str =
        "id, file_path, status, stats, output_path, error, config_hash, created_at, completed_at";

    pub fn create(&self, file_path: &str) -> Result<TranslationJob, StoreError> {
        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO translation_jobs (id, file_path, status, created_at) VALUES (?, ?, 'queued', ?)",
            params![id, file_path, now.to_rfc3339()],
        )?;
        Ok(TranslationJob {
            id,
            file_path: file_path.to_string(),
            status: JobStatus::Queued,
            stats: None,
            output_path: None,
            error: None,
            config_hash: None,
            created_at: now,
            completed_at: None,
        })
    }

    pub fn get(&self, id: &str) -> Result<Option<TranslationJob>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            &format!("SELECT {} FROM translation_jobs WHERE id = ?", Self::COLUMNS),
            params![id],
            Self::row_to_job,
        );
        match result {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn mark_running(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE translation_jobs SET status = 'running' WHERE id = ? AND status = 'queued'",
            params![id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("queued job {id}")));
        }
        Ok(())
    }

    pub fn mark_completed(
        &self,
        id: &str,
        output_path: &str,
        stats: Option<&serde_json::Value>,
        config_hash: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE translation_jobs SET status = 'completed', output_path = ?, stats = ?, \
             config_hash = ?, completed_at = ? WHERE id = ?",
            params![
                output_path,
                stats.map(|s| s.to_string()),
                config_hash,
                Utc::now().to_rfc3339(),
                id
            ],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("job {id}")));
        }
        Ok(())
    }

    /// Attach or replace the stats JSON without changing status. Used for
    /// metadata like the Whisper service job id.
    pub fn attach_stats(&self, id: &str, stats: &serde_json::Value) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE translation_jobs SET stats = ? WHERE id = ?",
            params![stats.to_string(), id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("job {id}")));
        }
        Ok(())
    }

    pub fn mark_failed(&self, id: &str, error: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE translation_jobs SET status = 'failed', error = ?, completed_at = ? WHERE id = ?",
            params![error, Utc::now().to_rfc3339(), id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("job {id}")));
        }
        Ok(())
    }

    pub fn list(
        &self,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TranslationJob>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut jobs = Vec::new();
        match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM translation_jobs WHERE status = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
                    Self::COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows =
                    stmt.query_map(params![status.as_str(), limit, offset], Self::row_to_job)?;
                for row in rows {
                    jobs.push(row?);
                }
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM translation_jobs ORDER BY created_at DESC LIMIT ? OFFSET ?",
                    Self::COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![limit, offset], Self::row_to_job)?;
                for row in rows {
                    jobs.push(row?);
                }
            }
        }
        Ok(jobs)
    }

    /// Completed jobs whose stored config hash differs from `current_hash`.
    ///
    /// These are outdated and eligible for re-translation. Jobs completed
    /// before config hashing was recorded (NULL hash) count as outdated.
    pub fn outdated_jobs(&self, current_hash: &str) -> Result<Vec<TranslationJob>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM translation_jobs WHERE status = 'completed' \
             AND (config_hash IS NULL OR config_hash != ?) ORDER BY completed_at DESC",
            Self::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![current_hash], Self::row_to_job)?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }

    pub fn count(&self, status: Option<JobStatus>) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count = match status {
            Some(status) => conn.query_row(
                "SELECT COUNT(*) FROM translation_jobs WHERE status = ?",
                params![status.as_str()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM translation_jobs", [], |row| {
                row.get(0)
            })?,
        };
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = store.create("/m/e1.mkv").unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        let fetched = store.get(&job.id).unwrap().unwrap();
        assert_eq!(fetched.file_path, "/m/e1.mkv");
    }

    #[test]
    fn test_get_missing_returns_none() {
        let store = SqliteJobStore::in_memory().unwrap();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_forward_transitions() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = store.create("/m/e1.mkv").unwrap();
        store.mark_running(&job.id).unwrap();
        store
            .mark_completed(&job.id, "/m/e1.de.ass", None, "hash1")
            .unwrap();
        let done = store.get(&job.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.output_path.as_deref(), Some("/m/e1.de.ass"));
        assert!(done.completed_at.is_some());

        // Running again after completion is refused.
        assert!(store.mark_running(&job.id).is_err());
    }

    #[test]
    fn test_mark_failed_records_error() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = store.create("/m/e1.mkv").unwrap();
        store.mark_failed(&job.id, "backend down").unwrap();
        let failed = store.get(&job.id).unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("backend down"));
    }

    #[test]
    fn test_outdated_detection() {
        let store = SqliteJobStore::in_memory().unwrap();
        let current = store.create("/m/a.mkv").unwrap();
        let stale = store.create("/m/b.mkv").unwrap();
        let failed = store.create("/m/c.mkv").unwrap();
        store
            .mark_completed(&current.id, "/m/a.de.ass", None, "hash-now")
            .unwrap();
        store
            .mark_completed(&stale.id, "/m/b.de.ass", None, "hash-old")
            .unwrap();
        store.mark_failed(&failed.id, "x").unwrap();

        let outdated = store.outdated_jobs("hash-now").unwrap();
        assert_eq!(outdated.len(), 1);
        assert_eq!(outdated[0].id, stale.id);
    }

    #[test]
    fn test_null_hash_counts_as_outdated() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = store.create("/m/a.mkv").unwrap();
        // Simulate a legacy row completed without a hash.
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "UPDATE translation_jobs SET status = 'completed' WHERE id = ?",
                params![job.id],
            )
            .unwrap();
        }
        assert_eq!(store.outdated_jobs("hash-now").unwrap().len(), 1);
    }

    #[test]
    fn test_list_filters_by_status() {
        let store = SqliteJobStore::in_memory().unwrap();
        let a = store.create("/m/a.mkv").unwrap();
        store.create("/m/b.mkv").unwrap();
        store.mark_failed(&a.id, "x").unwrap();
        assert_eq!(store.list(Some(JobStatus::Failed), 10, 0).unwrap().len(), 1);
        assert_eq!(store.list(None, 10, 0).unwrap().len(), 2);
        assert_eq!(store.count(Some(JobStatus::Queued)).unwrap(), 1);
    }

    #[test]
    fn test_stats_json_round_trip() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = store.create("/m/a.mkv").unwrap();
        let stats = serde_json::json!({"lines": 420, "backend": "deepl"});
        store
            .mark_completed(&job.id, "/m/a.de.ass", Some(&stats), "h")
            .unwrap();
        let done = store.get(&job.id).unwrap().unwrap();
        assert_eq!(done.stats.unwrap()["lines"], 420);
    }
}
