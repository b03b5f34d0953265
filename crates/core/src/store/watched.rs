//! Watched folders for standalone (non-arr) libraries.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::types::WatchedFolder;
use super::{parse_ts, StoreError};

/// SQLite-backed watched folder store.
pub struct SqliteWatchedFolderStore {
    conn: Mutex<Connection>,
}

impl SqliteWatchedFolderStore {
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
            CREATE TABLE IF NOT EXISTS watched_folders (
                id INTEGER PRIMARY KEY,
                path TEXT NOT NULL UNIQUE,
                enabled INTEGER NOT NULL DEFAULT 1,
                profile_id INTEGER,
                created_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn row_to_folder(row: &rusqlite::Row) -> rusqlite::Result<WatchedFolder> {
        Ok(WatchedFolder {
            id: row.get(0)?,
            path: row.get(1)?,
            enabled: row.get::<_, i64>(2)? != 0,
            profile_id: row.get(3)?,
            created_at: parse_ts(&row.get::<_, String>(4)?),
        })
    }

    pub fn add(&self, path: &str, profile_id: Option<i64>) -> Result<WatchedFolder, StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO watched_folders (path, enabled, profile_id, created_at) VALUES (?, 1, ?, ?)",
            params![path, profile_id, now.to_rfc3339()],
        )?;
        Ok(WatchedFolder {
            id: conn.last_insert_rowid(),
            path: path.to_string(),
            enabled: true,
            profile_id,
            created_at: now,
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<WatchedFolder>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT id, path, enabled, profile_id, created_at FROM watched_folders WHERE id = ?",
                params![id],
                Self::row_to_folder,
            )
            .optional()?;
        Ok(result)
    }

    pub fn list(&self) -> Result<Vec<WatchedFolder>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, path, enabled, profile_id, created_at FROM watched_folders ORDER BY path",
        )?;
        let rows = stmt.query_map([], Self::row_to_folder)?;
        let mut folders = Vec::new();
        for row in rows {
            folders.push(row?);
        }
        Ok(folders)
    }

    pub fn list_enabled(&self) -> Result<Vec<WatchedFolder>, StoreError> {
        Ok(self.list()?.into_iter().filter(|f| f.enabled).collect())
    }

    pub fn set_enabled(&self, id: i64, enabled: bool) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE watched_folders SET enabled = ? WHERE id = ?",
            params![enabled as i64, id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("watched folder {id}")));
        }
        Ok(())
    }

    pub fn remove(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM watched_folders WHERE id = ?", params![id])?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_list_remove() {
        let store = SqliteWatchedFolderStore::in_memory().unwrap();
        let folder = store.add("/media/anime", Some(2)).unwrap();
        assert!(folder.enabled);
        assert_eq!(store.list().unwrap().len(), 1);
        assert!(store.remove(folder.id).unwrap());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_path_conflicts() {
        let store = SqliteWatchedFolderStore::in_memory().unwrap();
        store.add("/media/anime", None).unwrap();
        let err = store.add("/media/anime", None).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_disabled_excluded_from_enabled_list() {
        let store = SqliteWatchedFolderStore::in_memory().unwrap();
        let folder = store.add("/media/anime", None).unwrap();
        store.add("/media/movies", None).unwrap();
        store.set_enabled(folder.id, false).unwrap();
        let enabled = store.list_enabled().unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].path, "/media/movies");
    }
}
