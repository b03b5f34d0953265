//! SQLite-backed wanted item store.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::types::{
    ExistingSub, ItemKind, SubtitleKind, WantedFilter, WantedItem, WantedStatus, WantedSummary,
    WantedUpsert,
};
use super::{parse_ts, parse_ts_opt, StoreError};

/// SQLite-backed wanted item store.
pub struct SqliteWantedStore {
    conn: Mutex<Connection>,
}

impl SqliteWantedStore {
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
            CREATE TABLE IF NOT EXISTS wanted_items (
                id INTEGER PRIMARY KEY,
                item_kind TEXT NOT NULL,
                title TEXT NOT NULL,
                episode_label TEXT NOT NULL DEFAULT '',
                series_id INTEGER,
                episode_id INTEGER,
                movie_id INTEGER,
                file_path TEXT NOT NULL,
                target_language TEXT NOT NULL,
                subtitle_kind TEXT NOT NULL DEFAULT 'full',
                existing_sub TEXT NOT NULL DEFAULT 'none',
                upgrade_candidate INTEGER NOT NULL DEFAULT 0,
                current_score INTEGER,
                status TEXT NOT NULL DEFAULT 'wanted',
                search_count INTEGER NOT NULL DEFAULT 0,
                last_search_at TEXT,
                retry_after TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(file_path, target_language, subtitle_kind)
            );

            CREATE INDEX IF NOT EXISTS idx_wanted_status ON wanted_items(status);
            CREATE INDEX IF NOT EXISTS idx_wanted_series ON wanted_items(series_id);
            CREATE INDEX IF NOT EXISTS idx_wanted_path ON wanted_items(file_path);
            "#,
        )?;
        Ok(())
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<WantedItem> {
        let item_kind: String = row.get(1)?;
        let subtitle_kind: String = row.get(9)?;
        let existing_sub: String = row.get(10)?;
        let status: String = row.get(13)?;
        Ok(WantedItem {
            id: row.get(0)?,
            item_kind: ItemKind::parse(&item_kind).unwrap_or(ItemKind::Episode),
            title: row.get(2)?,
            episode_label: row.get(3)?,
            series_id: row.get(4)?,
            episode_id: row.get(5)?,
            movie_id: row.get(6)?,
            file_path: row.get(7)?,
            target_language: row.get(8)?,
            subtitle_kind: SubtitleKind::parse(&subtitle_kind),
            existing_sub: ExistingSub::parse(&existing_sub),
            upgrade_candidate: row.get::<_, i64>(11)? != 0,
            current_score: row.get(12)?,
            status: WantedStatus::parse(&status).unwrap_or(WantedStatus::Wanted),
            search_count: row.get::<_, i64>(14)? as u32,
            last_search_at: parse_ts_opt(row.get(15)?),
            retry_after: parse_ts_opt(row.get(16)?),
            error: row.get(17)?,
            created_at: parse_ts(&row.get::<_, String>(18)?),
            updated_at: parse_ts(&row.get::<_, String>(19)?),
        })
    }

    const COLUMNS: &'static str = "id, item_kind, title, episode_label, series_id, episode_id, \
         movie_id, file_path, target_language, subtitle_kind, existing_sub, upgrade_candidate, \
         current_score, status, search_count, last_search_at, retry_after, error, created_at, \
         updated_at";

    /// Insert or update by (file_path, target_language, subtitle_kind).
    ///
    /// An `ignored` row keeps its status and progress fields; only the
    /// descriptive fields refresh. Any other existing row is revived to
    /// `wanted`. `search_count` is never reset.
    pub fn upsert(&self, upsert: &WantedUpsert) -> Result<WantedItem, StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        let existing: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, status FROM wanted_items WHERE file_path = ? AND target_language = ? AND subtitle_kind = ?",
                params![upsert.file_path, upsert.target_language, upsert.subtitle_kind.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(e),
            })?;

        let id = match existing {
            Some((id, status)) => {
                let revive = status != "ignored";
                if revive {
                    conn.execute(
                        "UPDATE wanted_items SET item_kind = ?, title = ?, episode_label = ?, \
                         series_id = ?, episode_id = ?, movie_id = ?, existing_sub = ?, \
                         upgrade_candidate = ?, current_score = ?, status = 'wanted', \
                         updated_at = ? WHERE id = ?",
                        params![
                            upsert.item_kind.as_str(),
                            upsert.title,
                            upsert.episode_label,
                            upsert.series_id,
                            upsert.episode_id,
                            upsert.movie_id,
                            upsert.existing_sub.as_str(),
                            upsert.upgrade_candidate as i64,
                            upsert.current_score,
                            now,
                            id,
                        ],
                    )?;
                } else {
                    conn.execute(
                        "UPDATE wanted_items SET item_kind = ?, title = ?, episode_label = ?, \
                         series_id = ?, episode_id = ?, movie_id = ?, existing_sub = ?, \
                         upgrade_candidate = ?, current_score = ?, updated_at = ? WHERE id = ?",
                        params![
                            upsert.item_kind.as_str(),
                            upsert.title,
                            upsert.episode_label,
                            upsert.series_id,
                            upsert.episode_id,
                            upsert.movie_id,
                            upsert.existing_sub.as_str(),
                            upsert.upgrade_candidate as i64,
                            upsert.current_score,
                            now,
                            id,
                        ],
                    )?;
                }
                id
            }
            None => {
                conn.execute(
                    "INSERT INTO wanted_items (item_kind, title, episode_label, series_id, \
                     episode_id, movie_id, file_path, target_language, subtitle_kind, \
                     existing_sub, upgrade_candidate, current_score, status, created_at, \
                     updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'wanted', ?, ?)",
                    params![
                        upsert.item_kind.as_str(),
                        upsert.title,
                        upsert.episode_label,
                        upsert.series_id,
                        upsert.episode_id,
                        upsert.movie_id,
                        upsert.file_path,
                        upsert.target_language,
                        upsert.subtitle_kind.as_str(),
                        upsert.existing_sub.as_str(),
                        upsert.upgrade_candidate as i64,
                        upsert.current_score,
                        now,
                        now,
                    ],
                )?;
                conn.last_insert_rowid()
            }
        };

        let item = conn.query_row(
            &format!("SELECT {} FROM wanted_items WHERE id = ?", Self::COLUMNS),
            params![id],
            Self::row_to_item,
        )?;
        Ok(item)
    }

    pub fn get(&self, id: i64) -> Result<Option<WantedItem>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            &format!("SELECT {} FROM wanted_items WHERE id = ?", Self::COLUMNS),
            params![id],
            Self::row_to_item,
        );
        match result {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_by_tuple(
        &self,
        file_path: &str,
        target_language: &str,
        subtitle_kind: SubtitleKind,
    ) -> Result<Option<WantedItem>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            &format!(
                "SELECT {} FROM wanted_items WHERE file_path = ? AND target_language = ? AND subtitle_kind = ?",
                Self::COLUMNS
            ),
            params![file_path, target_language, subtitle_kind.as_str()],
            Self::row_to_item,
        );
        match result {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn build_where_clause(filter: &WantedFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str().to_string()));
        }
        if let Some(kind) = filter.item_kind {
            conditions.push("item_kind = ?");
            params.push(Box::new(kind.as_str().to_string()));
        }
        if let Some(series_id) = filter.series_id {
            conditions.push("series_id = ?");
            params.push(Box::new(series_id));
        }
        if let Some(sub_kind) = filter.subtitle_kind {
            conditions.push("subtitle_kind = ?");
            params.push(Box::new(sub_kind.as_str().to_string()));
        }
        if let Some(ref lang) = filter.language {
            conditions.push("target_language = ?");
            params.push(Box::new(lang.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        (where_clause, params)
    }

    pub fn list(&self, filter: &WantedFilter) -> Result<Vec<WantedItem>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM wanted_items {} ORDER BY created_at ASC LIMIT ? OFFSET ?",
            Self::COLUMNS,
            where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut all_params = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_item)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    pub fn count(&self, filter: &WantedFilter) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM wanted_items {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let count = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    pub fn summary(&self) -> Result<WantedSummary, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM wanted_items GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut summary = WantedSummary::default();
        for row in rows {
            let (status, count) = row?;
            summary.total += count;
            match status.as_str() {
                "wanted" => summary.wanted = count,
                "searching" => summary.searching = count,
                "found" => summary.found = count,
                "failed" => summary.failed = count,
                "ignored" => summary.ignored = count,
                _ => {}
            }
        }
        Ok(summary)
    }

    pub fn update_status(
        &self,
        id: i64,
        status: WantedStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE wanted_items SET status = ?, error = ?, updated_at = ? WHERE id = ?",
            params![status.as_str(), error, Utc::now().to_rfc3339(), id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("wanted item {id}")));
        }
        Ok(())
    }

    /// Increment `search_count` and stamp `last_search_at`. Monotonic.
    pub fn record_search_attempt(&self, id: i64) -> Result<u32, StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let n = conn.execute(
            "UPDATE wanted_items SET search_count = search_count + 1, last_search_at = ?, \
             updated_at = ? WHERE id = ?",
            params![now, now, id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("wanted item {id}")));
        }
        let count =
            conn.query_row("SELECT search_count FROM wanted_items WHERE id = ?", params![id], |row| {
                row.get::<_, i64>(0)
            })?;
        Ok(count as u32)
    }

    pub fn set_retry_after(
        &self,
        id: i64,
        retry_after: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE wanted_items SET retry_after = ?, updated_at = ? WHERE id = ?",
            params![
                retry_after.map(|t| t.to_rfc3339()),
                Utc::now().to_rfc3339(),
                id
            ],
        )?;
        Ok(())
    }

    pub fn set_current_score(&self, id: i64, score: Option<i32>) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE wanted_items SET current_score = ?, updated_at = ? WHERE id = ?",
            params![score, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    pub fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM wanted_items WHERE id = ?", params![id])?;
        Ok(n > 0)
    }

    pub fn delete_by_path(&self, file_path: &str) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM wanted_items WHERE file_path = ?",
            params![file_path],
        )?;
        Ok(n)
    }

    /// Every distinct file path with at least one row, for scanner cleanup.
    pub fn all_file_paths(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT DISTINCT file_path FROM wanted_items")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut paths = Vec::new();
        for row in rows {
            paths.push(row?);
        }
        Ok(paths)
    }

    /// Items eligible for the search loop: status `wanted`, attempts left,
    /// and either never searched, last searched before `min_age`, or a
    /// `retry_after` already in the past.
    pub fn due_for_search(
        &self,
        max_attempts: u32,
        min_age: chrono::Duration,
        limit: i64,
    ) -> Result<Vec<WantedItem>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let age_cutoff = (now - min_age).to_rfc3339();
        let now_str = now.to_rfc3339();
        let sql = format!(
            "SELECT {} FROM wanted_items WHERE status = 'wanted' AND search_count < ? \
             AND (last_search_at IS NULL OR last_search_at < ? OR \
                  (retry_after IS NOT NULL AND retry_after < ?)) \
             AND (retry_after IS NULL OR retry_after < ?) \
             ORDER BY last_search_at ASC NULLS FIRST LIMIT ?",
            Self::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![max_attempts as i64, age_cutoff, now_str, now_str, limit],
            Self::row_to_item,
        )?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_upsert(path: &str, lang: &str) -> WantedUpsert {
        WantedUpsert {
            item_kind: ItemKind::Episode,
            title: "Show".to_string(),
            episode_label: "S01E01".to_string(),
            series_id: Some(12),
            episode_id: Some(34),
            movie_id: None,
            file_path: path.to_string(),
            target_language: lang.to_string(),
            subtitle_kind: SubtitleKind::Full,
            existing_sub: ExistingSub::None,
            upgrade_candidate: false,
            current_score: None,
        }
    }

    #[test]
    fn test_upsert_creates_wanted_row() {
        let store = SqliteWantedStore::in_memory().unwrap();
        let item = store.upsert(&sample_upsert("/m/e1.mkv", "de")).unwrap();
        assert_eq!(item.status, WantedStatus::Wanted);
        assert_eq!(item.search_count, 0);
        assert_eq!(item.subtitle_kind, SubtitleKind::Full);
    }

    #[test]
    fn test_upsert_same_tuple_is_single_row() {
        let store = SqliteWantedStore::in_memory().unwrap();
        let a = store.upsert(&sample_upsert("/m/e1.mkv", "de")).unwrap();
        let b = store.upsert(&sample_upsert("/m/e1.mkv", "de")).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.count(&WantedFilter::new()).unwrap(), 1);
    }

    #[test]
    fn test_upsert_preserves_search_count() {
        let store = SqliteWantedStore::in_memory().unwrap();
        let item = store.upsert(&sample_upsert("/m/e1.mkv", "de")).unwrap();
        store.record_search_attempt(item.id).unwrap();
        store.record_search_attempt(item.id).unwrap();
        let revived = store.upsert(&sample_upsert("/m/e1.mkv", "de")).unwrap();
        assert_eq!(revived.search_count, 2);
    }

    #[test]
    fn test_upsert_revives_failed_to_wanted() {
        let store = SqliteWantedStore::in_memory().unwrap();
        let item = store.upsert(&sample_upsert("/m/e1.mkv", "de")).unwrap();
        store
            .update_status(item.id, WantedStatus::Failed, Some("max attempts"))
            .unwrap();
        let revived = store.upsert(&sample_upsert("/m/e1.mkv", "de")).unwrap();
        assert_eq!(revived.status, WantedStatus::Wanted);
    }

    #[test]
    fn test_ignored_is_sticky_against_upsert() {
        let store = SqliteWantedStore::in_memory().unwrap();
        let item = store.upsert(&sample_upsert("/m/e1.mkv", "de")).unwrap();
        store
            .update_status(item.id, WantedStatus::Ignored, None)
            .unwrap();
        let after = store.upsert(&sample_upsert("/m/e1.mkv", "de")).unwrap();
        assert_eq!(after.status, WantedStatus::Ignored);
    }

    #[test]
    fn test_full_and_forced_coexist() {
        let store = SqliteWantedStore::in_memory().unwrap();
        store.upsert(&sample_upsert("/m/e1.mkv", "de")).unwrap();
        let mut forced = sample_upsert("/m/e1.mkv", "de");
        forced.subtitle_kind = SubtitleKind::Forced;
        store.upsert(&forced).unwrap();
        assert_eq!(store.count(&WantedFilter::new()).unwrap(), 2);
    }

    #[test]
    fn test_filter_by_status_and_series() {
        let store = SqliteWantedStore::in_memory().unwrap();
        let a = store.upsert(&sample_upsert("/m/e1.mkv", "de")).unwrap();
        store.upsert(&sample_upsert("/m/e2.mkv", "de")).unwrap();
        store
            .update_status(a.id, WantedStatus::Failed, None)
            .unwrap();

        let failed = store
            .list(&WantedFilter::new().with_status(WantedStatus::Failed))
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, a.id);

        let mut filter = WantedFilter::new();
        filter.series_id = Some(12);
        assert_eq!(store.count(&filter).unwrap(), 2);
    }

    #[test]
    fn test_summary_counts() {
        let store = SqliteWantedStore::in_memory().unwrap();
        let a = store.upsert(&sample_upsert("/m/e1.mkv", "de")).unwrap();
        store.upsert(&sample_upsert("/m/e2.mkv", "de")).unwrap();
        store
            .update_status(a.id, WantedStatus::Found, None)
            .unwrap();
        let summary = store.summary().unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.found, 1);
        assert_eq!(summary.wanted, 1);
    }

    #[test]
    fn test_due_for_search_respects_retry_after() {
        let store = SqliteWantedStore::in_memory().unwrap();
        let item = store.upsert(&sample_upsert("/m/e1.mkv", "de")).unwrap();

        // Never searched: due.
        let due = store
            .due_for_search(5, chrono::Duration::hours(1), 10)
            .unwrap();
        assert_eq!(due.len(), 1);

        // retry_after in the future: skipped.
        store
            .set_retry_after(item.id, Some(Utc::now() + chrono::Duration::hours(2)))
            .unwrap();
        let due = store
            .due_for_search(5, chrono::Duration::hours(1), 10)
            .unwrap();
        assert!(due.is_empty());

        // retry_after in the past: due again.
        store
            .set_retry_after(item.id, Some(Utc::now() - chrono::Duration::hours(2)))
            .unwrap();
        let due = store
            .due_for_search(5, chrono::Duration::hours(1), 10)
            .unwrap();
        assert_eq!(due.len(), 1);
    }

    #[test]
    fn test_due_for_search_respects_max_attempts() {
        let store = SqliteWantedStore::in_memory().unwrap();
        let item = store.upsert(&sample_upsert("/m/e1.mkv", "de")).unwrap();
        store.record_search_attempt(item.id).unwrap();
        store.record_search_attempt(item.id).unwrap();
        store.set_retry_after(item.id, None).unwrap();
        // last_search_at is fresh, so the advisory age also filters it; use
        // zero min_age to isolate the attempt cap.
        let due = store
            .due_for_search(2, chrono::Duration::zero(), 10)
            .unwrap();
        assert!(due.is_empty());
    }

    #[test]
    fn test_delete_by_path_removes_all_languages() {
        let store = SqliteWantedStore::in_memory().unwrap();
        store.upsert(&sample_upsert("/m/e1.mkv", "de")).unwrap();
        store.upsert(&sample_upsert("/m/e1.mkv", "fr")).unwrap();
        assert_eq!(store.delete_by_path("/m/e1.mkv").unwrap(), 2);
        assert_eq!(store.count(&WantedFilter::new()).unwrap(), 0);
    }
}
