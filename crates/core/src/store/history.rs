//! Append-only download and upgrade history.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};

use super::types::{SubtitleDownload, UpgradeRecord};
use super::{parse_ts, StoreError};

/// SQLite-backed history store.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
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
            CREATE TABLE IF NOT EXISTS subtitle_downloads (
                id INTEGER PRIMARY KEY,
                provider TEXT NOT NULL,
                subtitle_id TEXT NOT NULL,
                language TEXT NOT NULL,
                format TEXT NOT NULL,
                file_path TEXT NOT NULL,
                score INTEGER NOT NULL,
                downloaded_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS upgrade_history (
                id INTEGER PRIMARY KEY,
                file_path TEXT NOT NULL,
                old_format TEXT NOT NULL,
                old_score INTEGER NOT NULL,
                new_format TEXT NOT NULL,
                new_score INTEGER NOT NULL,
                reason TEXT NOT NULL,
                upgraded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_downloads_path ON subtitle_downloads(file_path);
            "#,
        )?;
        Ok(())
    }

    pub fn record_download(
        &self,
        provider: &str,
        subtitle_id: &str,
        language: &str,
        format: &str,
        file_path: &str,
        score: i32,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO subtitle_downloads \
             (provider, subtitle_id, language, format, file_path, score, downloaded_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                provider,
                subtitle_id,
                language,
                format,
                file_path,
                score,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn record_upgrade(
        &self,
        file_path: &str,
        old_format: &str,
        old_score: i32,
        new_format: &str,
        new_score: i32,
        reason: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO upgrade_history \
             (file_path, old_format, old_score, new_format, new_score, reason, upgraded_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                file_path,
                old_format,
                old_score,
                new_format,
                new_score,
                reason,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn list_downloads(&self, limit: i64, offset: i64) -> Result<Vec<SubtitleDownload>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, provider, subtitle_id, language, format, file_path, score, downloaded_at \
             FROM subtitle_downloads ORDER BY downloaded_at DESC, id DESC LIMIT ? OFFSET ?",
        )?;
        let rows = stmt.query_map(params![limit, offset], |row| {
            Ok(SubtitleDownload {
                id: row.get(0)?,
                provider: row.get(1)?,
                subtitle_id: row.get(2)?,
                language: row.get(3)?,
                format: row.get(4)?,
                file_path: row.get(5)?,
                score: row.get(6)?,
                downloaded_at: parse_ts(&row.get::<_, String>(7)?),
            })
        })?;
        let mut downloads = Vec::new();
        for row in rows {
            downloads.push(row?);
        }
        Ok(downloads)
    }

    pub fn list_upgrades(&self, limit: i64, offset: i64) -> Result<Vec<UpgradeRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, file_path, old_format, old_score, new_format, new_score, reason, upgraded_at \
             FROM upgrade_history ORDER BY upgraded_at DESC, id DESC LIMIT ? OFFSET ?",
        )?;
        let rows = stmt.query_map(params![limit, offset], |row| {
            Ok(UpgradeRecord {
                id: row.get(0)?,
                file_path: row.get(1)?,
                old_format: row.get(2)?,
                old_score: row.get(3)?,
                new_format: row.get(4)?,
                new_score: row.get(5)?,
                reason: row.get(6)?,
                upgraded_at: parse_ts(&row.get::<_, String>(7)?),
            })
        })?;
        let mut upgrades = Vec::new();
        for row in rows {
            upgrades.push(row?);
        }
        Ok(upgrades)
    }

    pub fn downloads_for_path(&self, file_path: &str) -> Result<Vec<SubtitleDownload>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, provider, subtitle_id, language, format, file_path, score, downloaded_at \
             FROM subtitle_downloads WHERE file_path = ? ORDER BY downloaded_at DESC",
        )?;
        let rows = stmt.query_map(params![file_path], |row| {
            Ok(SubtitleDownload {
                id: row.get(0)?,
                provider: row.get(1)?,
                subtitle_id: row.get(2)?,
                language: row.get(3)?,
                format: row.get(4)?,
                file_path: row.get(5)?,
                score: row.get(6)?,
                downloaded_at: parse_ts(&row.get::<_, String>(7)?),
            })
        })?;
        let mut downloads = Vec::new();
        for row in rows {
            downloads.push(row?);
        }
        Ok(downloads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_history_append_only() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        store
            .record_download("podnapisi", "sub-1", "de", "ass", "/m/e1.de.ass", 420)
            .unwrap();
        store
            .record_download("legendasdivx", "sub-2", "de", "srt", "/m/e2.de.srt", 180)
            .unwrap();

        let all = store.list_downloads(10, 0).unwrap();
        assert_eq!(all.len(), 2);
        let for_path = store.downloads_for_path("/m/e1.de.ass").unwrap();
        assert_eq!(for_path.len(), 1);
        assert_eq!(for_path[0].provider, "podnapisi");
        assert_eq!(for_path[0].score, 420);
    }

    #[test]
    fn test_upgrade_history() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        store
            .record_upgrade("/m/e2.mkv", "srt", 120, "ass", 300, "SRT→ASS via podnapisi")
            .unwrap();
        let upgrades = store.list_upgrades(10, 0).unwrap();
        assert_eq!(upgrades.len(), 1);
        assert_eq!(upgrades[0].old_format, "srt");
        assert_eq!(upgrades[0].new_score, 300);
    }
}
