//! Runtime-mutable settings, persisted as a key/value table.
//!
//! Keys are dot-namespaced: `scanner.interval_hours`,
//! `provider.podnapisi.enabled`, `backend.deepl.api_key`,
//! `scoring.series_title`. Writing a key bumps a generation counter that
//! dependent singletons watch to decide when to rebuild.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rusqlite::{params, Connection};

use super::StoreError;

/// Typed access to the settings table.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
    /// All entries under a dot-terminated prefix, e.g. `backend.deepl.`.
    fn get_prefixed(&self, prefix: &str) -> Result<BTreeMap<String, String>, StoreError>;
    /// Monotonic counter bumped on every write; cheap staleness check for
    /// rebuilt-on-reload singletons.
    fn generation(&self) -> u64;

    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .ok()
            .flatten()
            .map(|v| v == "true" || v == "1")
            .unwrap_or(default)
    }

    fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .ok()
            .flatten()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.get(key)
            .ok()
            .flatten()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key)
            .ok()
            .flatten()
            .unwrap_or_else(|| default.to_string())
    }
}

/// SQLite-backed settings store.
pub struct SqliteSettingsStore {
    conn: Mutex<Connection>,
    generation: AtomicU64,
}

impl SqliteSettingsStore {
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            generation: AtomicU64::new(0),
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            generation: AtomicU64::new(0),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT value FROM settings WHERE key = ?",
            params![key],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, chrono::Utc::now().to_rfc3339()],
        )?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM settings WHERE key = ?", params![key])?;
        if n > 0 {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        Ok(n > 0)
    }

    fn get_prefixed(&self, prefix: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT key, value FROM settings WHERE key LIKE ?")?;
        let rows = stmt.query_map(params![format!("{prefix}%")], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut map = BTreeMap::new();
        for row in rows {
            let (k, v) = row?;
            map.insert(k, v);
        }
        Ok(map)
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_returns_none() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        assert_eq!(store.get("nope").unwrap(), None);
    }

    #[test]
    fn test_set_and_get() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        store.set("scanner.interval_hours", "6").unwrap();
        assert_eq!(
            store.get("scanner.interval_hours").unwrap().as_deref(),
            Some("6")
        );
        assert_eq!(store.get_i64("scanner.interval_hours", 12), 6);
    }

    #[test]
    fn test_set_overwrites() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        store.set("k", "a").unwrap();
        store.set("k", "b").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_typed_defaults() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        assert!(store.get_bool("missing", true));
        assert_eq!(store.get_i64("missing", 7), 7);
        assert_eq!(store.get_f64("missing", 0.5), 0.5);
        assert_eq!(store.get_string("missing", "x"), "x");
    }

    #[test]
    fn test_bool_parsing() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        store.set("a", "true").unwrap();
        store.set("b", "1").unwrap();
        store.set("c", "false").unwrap();
        assert!(store.get_bool("a", false));
        assert!(store.get_bool("b", false));
        assert!(!store.get_bool("c", true));
    }

    #[test]
    fn test_prefixed_lookup() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        store.set("backend.deepl.api_key", "k").unwrap();
        store.set("backend.deepl.endpoint", "e").unwrap();
        store.set("backend.ollama.model", "m").unwrap();
        let deepl = store.get_prefixed("backend.deepl.").unwrap();
        assert_eq!(deepl.len(), 2);
        assert!(deepl.contains_key("backend.deepl.api_key"));
    }

    #[test]
    fn test_generation_bumps_on_write() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        let g0 = store.generation();
        store.set("k", "v").unwrap();
        assert!(store.generation() > g0);
        let g1 = store.generation();
        store.delete("k").unwrap();
        assert!(store.generation() > g1);
        // Deleting a missing key is not a write.
        let g2 = store.generation();
        store.delete("k").unwrap();
        assert_eq!(store.generation(), g2);
    }
}
