//! SQLite-backed provider statistics and search-result cache.

use std::path::Path;
use std::sync::Mutex;

use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::types::ProviderStats;
use super::{parse_ts_opt, StoreError};

/// SQLite-backed provider store.
///
/// Running averages use the weighted formula
/// `new_avg = (old_avg * n_prev + new) / n_new`; each update runs as a single
/// SQL statement under the connection lock so concurrent recorders cannot
/// corrupt the aggregate.
pub struct SqliteProviderStore {
    conn: Mutex<Connection>,
}

impl SqliteProviderStore {
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
            CREATE TABLE IF NOT EXISTS provider_stats (
                provider TEXT PRIMARY KEY,
                total_searches INTEGER NOT NULL DEFAULT 0,
                successful_downloads INTEGER NOT NULL DEFAULT 0,
                failed_downloads INTEGER NOT NULL DEFAULT 0,
                avg_score REAL NOT NULL DEFAULT 0,
                avg_response_time_ms REAL NOT NULL DEFAULT 0,
                last_response_time_ms INTEGER NOT NULL DEFAULT 0,
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                last_success_at TEXT,
                last_failure_at TEXT,
                auto_disabled INTEGER NOT NULL DEFAULT 0,
                disabled_until TEXT,
                score_modifier INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS provider_cache (
                id INTEGER PRIMARY KEY,
                provider TEXT NOT NULL,
                query_hash TEXT NOT NULL,
                results_json TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_provider_cache_hash ON provider_cache(query_hash);
            "#,
        )?;
        Ok(())
    }

    fn ensure_row(conn: &Connection, provider: &str) -> Result<(), StoreError> {
        conn.execute(
            "INSERT OR IGNORE INTO provider_stats (provider) VALUES (?)",
            params![provider],
        )?;
        Ok(())
    }

    fn row_to_stats(row: &rusqlite::Row) -> rusqlite::Result<ProviderStats> {
        Ok(ProviderStats {
            provider: row.get(0)?,
            total_searches: row.get::<_, i64>(1)? as u64,
            successful_downloads: row.get::<_, i64>(2)? as u64,
            failed_downloads: row.get::<_, i64>(3)? as u64,
            avg_score: row.get(4)?,
            avg_response_time_ms: row.get(5)?,
            last_response_time_ms: row.get::<_, i64>(6)? as u64,
            consecutive_failures: row.get::<_, i64>(7)? as u32,
            last_success_at: parse_ts_opt(row.get(8)?),
            last_failure_at: parse_ts_opt(row.get(9)?),
            auto_disabled: row.get::<_, i64>(10)? != 0,
            disabled_until: parse_ts_opt(row.get(11)?),
            score_modifier: row.get(12)?,
        })
    }

    const COLUMNS: &'static str = "provider, total_searches, successful_downloads, \
         failed_downloads, avg_score, avg_response_time_ms, last_response_time_ms, \
         consecutive_failures, last_success_at, last_failure_at, auto_disabled, disabled_until, \
         score_modifier";

    /// Read stats for one provider, lazily clearing an expired auto-disable.
    pub fn get_stats(&self, provider: &str) -> Result<ProviderStats, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::ensure_row(&conn, provider)?;
        // Expired auto-disable clears on observation.
        conn.execute(
            "UPDATE provider_stats SET auto_disabled = 0, disabled_until = NULL, \
             consecutive_failures = 0 \
             WHERE provider = ? AND auto_disabled = 1 AND disabled_until IS NOT NULL \
             AND disabled_until < ?",
            params![provider, Utc::now().to_rfc3339()],
        )?;
        let stats = conn.query_row(
            &format!("SELECT {} FROM provider_stats WHERE provider = ?", Self::COLUMNS),
            params![provider],
            Self::row_to_stats,
        )?;
        Ok(stats)
    }

    pub fn all_stats(&self) -> Result<Vec<ProviderStats>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM provider_stats ORDER BY provider",
            Self::COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::row_to_stats)?;
        let mut all = Vec::new();
        for row in rows {
            all.push(row?);
        }
        Ok(all)
    }

    /// Record one search and fold its response time into the running average.
    pub fn record_search(&self, provider: &str, response_time_ms: u64) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::ensure_row(&conn, provider)?;
        conn.execute(
            "UPDATE provider_stats SET \
                avg_response_time_ms = (avg_response_time_ms * total_searches + ?1) / (total_searches + 1), \
                total_searches = total_searches + 1, \
                last_response_time_ms = ?1 \
             WHERE provider = ?2",
            params![response_time_ms as i64, provider],
        )?;
        Ok(())
    }

    /// Record a successful download with the candidate's score.
    ///
    /// Resets `consecutive_failures` and clears any auto-disable.
    pub fn record_success(&self, provider: &str, score: i32) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::ensure_row(&conn, provider)?;
        conn.execute(
            "UPDATE provider_stats SET \
                avg_score = (avg_score * successful_downloads + ?1) / (successful_downloads + 1), \
                successful_downloads = successful_downloads + 1, \
                consecutive_failures = 0, \
                auto_disabled = 0, \
                disabled_until = NULL, \
                last_success_at = ?2 \
             WHERE provider = ?3",
            params![score as f64, Utc::now().to_rfc3339(), provider],
        )?;
        Ok(())
    }

    /// Record a failed call.
    ///
    /// `counts_toward_disable` is false for rate-limit and auth failures.
    /// Crossing `threshold` consecutive failures sets `auto_disabled` and
    /// stamps `disabled_until = now + cooldown`. Returns the updated stats.
    pub fn record_failure(
        &self,
        provider: &str,
        counts_toward_disable: bool,
        threshold: u32,
        cooldown: Duration,
    ) -> Result<ProviderStats, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::ensure_row(&conn, provider)?;
        let now = Utc::now();
        if counts_toward_disable {
            conn.execute(
                "UPDATE provider_stats SET \
                    failed_downloads = failed_downloads + 1, \
                    consecutive_failures = consecutive_failures + 1, \
                    last_failure_at = ? \
                 WHERE provider = ?",
                params![now.to_rfc3339(), provider],
            )?;
            conn.execute(
                "UPDATE provider_stats SET auto_disabled = 1, disabled_until = ? \
                 WHERE provider = ? AND consecutive_failures >= ? AND auto_disabled = 0",
                params![(now + cooldown).to_rfc3339(), provider, threshold as i64],
            )?;
        } else {
            conn.execute(
                "UPDATE provider_stats SET \
                    failed_downloads = failed_downloads + 1, \
                    last_failure_at = ? \
                 WHERE provider = ?",
                params![now.to_rfc3339(), provider],
            )?;
        }
        let stats = conn.query_row(
            &format!("SELECT {} FROM provider_stats WHERE provider = ?", Self::COLUMNS),
            params![provider],
            Self::row_to_stats,
        )?;
        Ok(stats)
    }

    /// Manually clear an auto-disable (API-initiated re-enable).
    pub fn clear_auto_disable(&self, provider: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE provider_stats SET auto_disabled = 0, disabled_until = NULL, \
             consecutive_failures = 0 WHERE provider = ?",
            params![provider],
        )?;
        Ok(())
    }

    pub fn set_score_modifier(&self, provider: &str, modifier: i32) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::ensure_row(&conn, provider)?;
        conn.execute(
            "UPDATE provider_stats SET score_modifier = ? WHERE provider = ?",
            params![modifier.clamp(-50, 50), provider],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Search result cache
    // ------------------------------------------------------------------

    /// Most recent non-expired cache entry for a query hash.
    pub fn cache_get(&self, query_hash: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT results_json FROM provider_cache WHERE query_hash = ? AND expires_at > ? \
                 ORDER BY cached_at DESC, id DESC LIMIT 1",
                params![query_hash, Utc::now().to_rfc3339()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(result)
    }

    pub fn cache_put(
        &self,
        provider: &str,
        query_hash: &str,
        results_json: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO provider_cache (provider, query_hash, results_json, cached_at, expires_at) \
             VALUES (?, ?, ?, ?, ?)",
            params![
                provider,
                query_hash,
                results_json,
                now.to_rfc3339(),
                (now + ttl).to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Lazy sweep of expired cache rows. Returns how many were removed.
    pub fn cache_cleanup(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM provider_cache WHERE expires_at <= ?",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(n)
    }

    pub fn cache_clear(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM provider_cache", [])?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_default_row() {
        let store = SqliteProviderStore::in_memory().unwrap();
        let stats = store.get_stats("podnapisi").unwrap();
        assert_eq!(stats.total_searches, 0);
        assert!(!stats.auto_disabled);
    }

    #[test]
    fn test_avg_response_time_is_arithmetic_mean() {
        let store = SqliteProviderStore::in_memory().unwrap();
        for ms in [100u64, 200, 300, 400] {
            store.record_search("p", ms).unwrap();
        }
        let stats = store.get_stats("p").unwrap();
        assert_eq!(stats.total_searches, 4);
        assert!((stats.avg_response_time_ms - 250.0).abs() < 1e-9);
        assert_eq!(stats.last_response_time_ms, 400);
    }

    #[test]
    fn test_avg_score_weighted_update() {
        let store = SqliteProviderStore::in_memory().unwrap();
        store.record_success("p", 300).unwrap();
        store.record_success("p", 400).unwrap();
        let stats = store.get_stats("p").unwrap();
        assert_eq!(stats.successful_downloads, 2);
        assert!((stats.avg_score - 350.0).abs() < 1e-9);
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let store = SqliteProviderStore::in_memory().unwrap();
        store
            .record_failure("p", true, 10, Duration::minutes(30))
            .unwrap();
        store
            .record_failure("p", true, 10, Duration::minutes(30))
            .unwrap();
        assert_eq!(store.get_stats("p").unwrap().consecutive_failures, 2);
        store.record_success("p", 100).unwrap();
        assert_eq!(store.get_stats("p").unwrap().consecutive_failures, 0);
    }

    #[test]
    fn test_auto_disable_on_threshold() {
        let store = SqliteProviderStore::in_memory().unwrap();
        for _ in 0..2 {
            store
                .record_failure("p", true, 3, Duration::minutes(30))
                .unwrap();
        }
        assert!(!store.get_stats("p").unwrap().auto_disabled);
        let stats = store
            .record_failure("p", true, 3, Duration::minutes(30))
            .unwrap();
        assert!(stats.auto_disabled);
        assert!(stats.disabled_until.unwrap() > Utc::now());
    }

    #[test]
    fn test_rate_limit_failures_do_not_disable() {
        let store = SqliteProviderStore::in_memory().unwrap();
        for _ in 0..5 {
            store
                .record_failure("p", false, 3, Duration::minutes(30))
                .unwrap();
        }
        let stats = store.get_stats("p").unwrap();
        assert_eq!(stats.failed_downloads, 5);
        assert_eq!(stats.consecutive_failures, 0);
        assert!(!stats.auto_disabled);
    }

    #[test]
    fn test_expired_auto_disable_clears_on_read() {
        let store = SqliteProviderStore::in_memory().unwrap();
        let stats = store
            .record_failure("p", true, 1, Duration::milliseconds(-1))
            .unwrap();
        assert!(stats.auto_disabled);
        // disabled_until is already in the past, so the next read clears it.
        let stats = store.get_stats("p").unwrap();
        assert!(!stats.auto_disabled);
        assert!(stats.disabled_until.is_none());
        assert_eq!(stats.consecutive_failures, 0);
    }

    #[test]
    fn test_clear_auto_disable() {
        let store = SqliteProviderStore::in_memory().unwrap();
        store
            .record_failure("p", true, 1, Duration::minutes(30))
            .unwrap();
        assert!(store.get_stats("p").unwrap().auto_disabled);
        store.clear_auto_disable("p").unwrap();
        let stats = store.get_stats("p").unwrap();
        assert!(!stats.auto_disabled);
        assert_eq!(stats.consecutive_failures, 0);
    }

    #[test]
    fn test_score_modifier_clamped() {
        let store = SqliteProviderStore::in_memory().unwrap();
        store.set_score_modifier("p", 200).unwrap();
        assert_eq!(store.get_stats("p").unwrap().score_modifier, 50);
        store.set_score_modifier("p", -200).unwrap();
        assert_eq!(store.get_stats("p").unwrap().score_modifier, -50);
    }

    #[test]
    fn test_cache_round_trip_and_expiry() {
        let store = SqliteProviderStore::in_memory().unwrap();
        store
            .cache_put("merged", "h1", "[1,2]", Duration::minutes(10))
            .unwrap();
        assert_eq!(store.cache_get("h1").unwrap().as_deref(), Some("[1,2]"));

        store
            .cache_put("merged", "h2", "[3]", Duration::milliseconds(-1))
            .unwrap();
        assert_eq!(store.cache_get("h2").unwrap(), None);

        assert_eq!(store.cache_cleanup().unwrap(), 1);
        assert_eq!(store.cache_clear().unwrap(), 1);
    }

    #[test]
    fn test_cache_returns_most_recent() {
        let store = SqliteProviderStore::in_memory().unwrap();
        store
            .cache_put("merged", "h", "old", Duration::minutes(10))
            .unwrap();
        store
            .cache_put("merged", "h", "new", Duration::minutes(10))
            .unwrap();
        assert_eq!(store.cache_get("h").unwrap().as_deref(), Some("new"));
    }
}
