//! SQLite-backed translation state: memory cache, glossary, language
//! profiles and backend statistics.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::types::{BackendStats, ForcedPreference, GlossaryEntry, LanguageProfile};
use super::{parse_ts, parse_ts_opt, StoreError};

/// Cap on the merged glossary returned for a series.
pub const GLOSSARY_MERGE_CAP: usize = 30;

/// Name of the always-present default profile.
pub const DEFAULT_PROFILE_NAME: &str = "default";

/// SQLite-backed translation store.
pub struct SqliteTranslationStore {
    conn: Mutex<Connection>,
}

impl SqliteTranslationStore {
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
            CREATE TABLE IF NOT EXISTS translation_memory (
                id INTEGER PRIMARY KEY,
                source_lang TEXT NOT NULL,
                target_lang TEXT NOT NULL,
                text_hash TEXT NOT NULL,
                source_text TEXT NOT NULL,
                translated_text TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(source_lang, target_lang, text_hash)
            );

            CREATE TABLE IF NOT EXISTS glossary_entries (
                id INTEGER PRIMARY KEY,
                series_id INTEGER,
                source_term TEXT NOT NULL,
                target_term TEXT NOT NULL,
                notes TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS language_profiles (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                source_language TEXT NOT NULL,
                target_languages TEXT NOT NULL,
                fallback_chain TEXT NOT NULL,
                forced_preference TEXT NOT NULL DEFAULT 'disabled',
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS profile_assignments (
                item_kind TEXT NOT NULL,
                item_id INTEGER NOT NULL,
                profile_id INTEGER NOT NULL,
                PRIMARY KEY (item_kind, item_id)
            );

            CREATE TABLE IF NOT EXISTS backend_stats (
                backend TEXT PRIMARY KEY,
                total_requests INTEGER NOT NULL DEFAULT 0,
                successful_requests INTEGER NOT NULL DEFAULT 0,
                failed_requests INTEGER NOT NULL DEFAULT 0,
                total_characters INTEGER NOT NULL DEFAULT 0,
                avg_response_time_ms REAL NOT NULL DEFAULT 0,
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                last_success_at TEXT,
                last_failure_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_memory_pair
                ON translation_memory(source_lang, target_lang);
            CREATE INDEX IF NOT EXISTS idx_glossary_series ON glossary_entries(series_id);
            "#,
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Translation memory
    // ------------------------------------------------------------------

    /// Exact lookup by text hash within a language pair.
    pub fn memory_get(
        &self,
        source_lang: &str,
        target_lang: &str,
        text_hash: &str,
    ) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT translated_text FROM translation_memory \
                 WHERE source_lang = ? AND target_lang = ? AND text_hash = ?",
                params![source_lang, target_lang, text_hash],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(result)
    }

    /// Similarity lookup: scan candidates in the same language pair and
    /// return the translation of the closest source whose edit ratio meets
    /// `min_ratio`. The scan is bounded to the most recent 500 entries.
    pub fn memory_find_similar(
        &self,
        source_lang: &str,
        target_lang: &str,
        source_text: &str,
        min_ratio: f64,
    ) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT source_text, translated_text FROM translation_memory \
             WHERE source_lang = ? AND target_lang = ? ORDER BY id DESC LIMIT 500",
        )?;
        let rows = stmt.query_map(params![source_lang, target_lang], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut best: Option<(f64, String)> = None;
        for row in rows {
            let (candidate_source, translated) = row?;
            let ratio = edit_ratio(source_text, &candidate_source);
            if ratio >= min_ratio && best.as_ref().map(|(r, _)| ratio > *r).unwrap_or(true) {
                best = Some((ratio, translated));
            }
        }
        Ok(best.map(|(_, t)| t))
    }

    /// Upsert by the (source_lang, target_lang, text_hash) unique key.
    pub fn memory_put(
        &self,
        source_lang: &str,
        target_lang: &str,
        text_hash: &str,
        source_text: &str,
        translated_text: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO translation_memory \
             (source_lang, target_lang, text_hash, source_text, translated_text, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(source_lang, target_lang, text_hash) \
             DO UPDATE SET translated_text = excluded.translated_text",
            params![
                source_lang,
                target_lang,
                text_hash,
                source_text,
                translated_text,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn memory_count(&self) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.query_row("SELECT COUNT(*) FROM translation_memory", [], |row| {
            row.get(0)
        })?;
        Ok(n)
    }

    // ------------------------------------------------------------------
    // Glossary
    // ------------------------------------------------------------------

    pub fn glossary_add(
        &self,
        series_id: Option<i64>,
        source_term: &str,
        target_term: &str,
        notes: Option<&str>,
    ) -> Result<GlossaryEntry, StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO glossary_entries (series_id, source_term, target_term, notes, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
            params![series_id, source_term, target_term, notes, now.to_rfc3339()],
        )?;
        Ok(GlossaryEntry {
            id: conn.last_insert_rowid(),
            series_id,
            source_term: source_term.to_string(),
            target_term: target_term.to_string(),
            notes: notes.map(str::to_string),
            updated_at: now,
        })
    }

    pub fn glossary_delete(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM glossary_entries WHERE id = ?", params![id])?;
        Ok(n > 0)
    }

    fn row_to_glossary(row: &rusqlite::Row) -> rusqlite::Result<GlossaryEntry> {
        Ok(GlossaryEntry {
            id: row.get(0)?,
            series_id: row.get(1)?,
            source_term: row.get(2)?,
            target_term: row.get(3)?,
            notes: row.get(4)?,
            updated_at: parse_ts(&row.get::<_, String>(5)?),
        })
    }

    pub fn glossary_list(&self, series_id: Option<i64>) -> Result<Vec<GlossaryEntry>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut entries = Vec::new();
        match series_id {
            Some(id) => {
                let mut stmt = conn.prepare(
                    "SELECT id, series_id, source_term, target_term, notes, updated_at \
                     FROM glossary_entries WHERE series_id = ? ORDER BY updated_at DESC",
                )?;
                let rows = stmt.query_map(params![id], Self::row_to_glossary)?;
                for row in rows {
                    entries.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, series_id, source_term, target_term, notes, updated_at \
                     FROM glossary_entries WHERE series_id IS NULL ORDER BY updated_at DESC",
                )?;
                let rows = stmt.query_map([], Self::row_to_glossary)?;
                for row in rows {
                    entries.push(row?);
                }
            }
        }
        Ok(entries)
    }

    /// Merged glossary for a series: per-series entries override global ones
    /// on case-folded source term; newest first; capped at
    /// [`GLOSSARY_MERGE_CAP`].
    pub fn glossary_merged(&self, series_id: Option<i64>) -> Result<Vec<GlossaryEntry>, StoreError> {
        let mut merged = match series_id {
            Some(id) => self.glossary_list(Some(id))?,
            None => Vec::new(),
        };
        let global = self.glossary_list(None)?;
        for entry in global {
            let shadowed = merged
                .iter()
                .any(|e| e.source_term.to_lowercase() == entry.source_term.to_lowercase());
            if !shadowed {
                merged.push(entry);
            }
        }
        merged.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        merged.truncate(GLOSSARY_MERGE_CAP);
        Ok(merged)
    }

    // ------------------------------------------------------------------
    // Language profiles
    // ------------------------------------------------------------------

    fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<LanguageProfile> {
        let targets_json: String = row.get(3)?;
        let chain_json: String = row.get(4)?;
        let forced: String = row.get(5)?;
        Ok(LanguageProfile {
            id: row.get(0)?,
            name: row.get(1)?,
            source_language: row.get(2)?,
            target_languages: serde_json::from_str(&targets_json).unwrap_or_default(),
            fallback_chain: serde_json::from_str(&chain_json).unwrap_or_default(),
            forced_preference: ForcedPreference::parse(&forced),
            updated_at: parse_ts(&row.get::<_, String>(6)?),
        })
    }

    const PROFILE_COLUMNS: &'static str =
        "id, name, source_language, target_languages, fallback_chain, forced_preference, updated_at";

    /// Create a profile. A duplicate name surfaces as [`StoreError::Conflict`].
    pub fn profile_create(
        &self,
        name: &str,
        source_language: &str,
        target_languages: &[String],
        fallback_chain: &[String],
        forced_preference: ForcedPreference,
    ) -> Result<LanguageProfile, StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO language_profiles \
             (name, source_language, target_languages, fallback_chain, forced_preference, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                name,
                source_language,
                serde_json::to_string(target_languages).unwrap_or_default(),
                serde_json::to_string(fallback_chain).unwrap_or_default(),
                forced_preference.as_str(),
                now.to_rfc3339()
            ],
        )?;
        Ok(LanguageProfile {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            source_language: source_language.to_string(),
            target_languages: target_languages.to_vec(),
            fallback_chain: fallback_chain.to_vec(),
            forced_preference,
            updated_at: now,
        })
    }

    pub fn profile_update(&self, profile: &LanguageProfile) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE language_profiles SET name = ?, source_language = ?, target_languages = ?, \
             fallback_chain = ?, forced_preference = ?, updated_at = ? WHERE id = ?",
            params![
                profile.name,
                profile.source_language,
                serde_json::to_string(&profile.target_languages).unwrap_or_default(),
                serde_json::to_string(&profile.fallback_chain).unwrap_or_default(),
                profile.forced_preference.as_str(),
                Utc::now().to_rfc3339(),
                profile.id
            ],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("profile {}", profile.id)));
        }
        Ok(())
    }

    pub fn profile_delete(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM profile_assignments WHERE profile_id = ?",
            params![id],
        )?;
        let n = conn.execute(
            "DELETE FROM language_profiles WHERE id = ? AND name != ?",
            params![id, DEFAULT_PROFILE_NAME],
        )?;
        Ok(n > 0)
    }

    pub fn profile_get(&self, id: i64) -> Result<Option<LanguageProfile>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                &format!(
                    "SELECT {} FROM language_profiles WHERE id = ?",
                    Self::PROFILE_COLUMNS
                ),
                params![id],
                Self::row_to_profile,
            )
            .optional()?;
        Ok(result)
    }

    pub fn profile_list(&self) -> Result<Vec<LanguageProfile>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM language_profiles ORDER BY name",
            Self::PROFILE_COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::row_to_profile)?;
        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(row?);
        }
        Ok(profiles)
    }

    /// Create the default profile when missing; returns it either way.
    pub fn ensure_default_profile(
        &self,
        source_language: &str,
        target_languages: &[String],
        fallback_chain: &[String],
    ) -> Result<LanguageProfile, StoreError> {
        if let Some(existing) = self.profile_by_name(DEFAULT_PROFILE_NAME)? {
            return Ok(existing);
        }
        self.profile_create(
            DEFAULT_PROFILE_NAME,
            source_language,
            target_languages,
            fallback_chain,
            ForcedPreference::Disabled,
        )
    }

    pub fn profile_by_name(&self, name: &str) -> Result<Option<LanguageProfile>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                &format!(
                    "SELECT {} FROM language_profiles WHERE name = ?",
                    Self::PROFILE_COLUMNS
                ),
                params![name],
                Self::row_to_profile,
            )
            .optional()?;
        Ok(result)
    }

    pub fn profile_assign(
        &self,
        item_kind: &str,
        item_id: i64,
        profile_id: i64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO profile_assignments (item_kind, item_id, profile_id) VALUES (?, ?, ?) \
             ON CONFLICT(item_kind, item_id) DO UPDATE SET profile_id = excluded.profile_id",
            params![item_kind, item_id, profile_id],
        )?;
        Ok(())
    }

    /// Effective profile for a library item: its assignment, else default.
    pub fn effective_profile(
        &self,
        item_kind: &str,
        item_id: Option<i64>,
    ) -> Result<Option<LanguageProfile>, StoreError> {
        if let Some(item_id) = item_id {
            let assigned: Option<i64> = {
                let conn = self.conn.lock().unwrap();
                conn.query_row(
                    "SELECT profile_id FROM profile_assignments WHERE item_kind = ? AND item_id = ?",
                    params![item_kind, item_id],
                    |row| row.get(0),
                )
                .optional()?
            };
            if let Some(profile_id) = assigned {
                if let Some(profile) = self.profile_get(profile_id)? {
                    return Ok(Some(profile));
                }
            }
        }
        self.profile_by_name(DEFAULT_PROFILE_NAME)
    }

    // ------------------------------------------------------------------
    // Backend stats
    // ------------------------------------------------------------------

    fn ensure_backend_row(conn: &Connection, backend: &str) -> Result<(), StoreError> {
        conn.execute(
            "INSERT OR IGNORE INTO backend_stats (backend) VALUES (?)",
            params![backend],
        )?;
        Ok(())
    }

    fn row_to_backend_stats(row: &rusqlite::Row) -> rusqlite::Result<BackendStats> {
        Ok(BackendStats {
            backend: row.get(0)?,
            total_requests: row.get::<_, i64>(1)? as u64,
            successful_requests: row.get::<_, i64>(2)? as u64,
            failed_requests: row.get::<_, i64>(3)? as u64,
            total_characters: row.get::<_, i64>(4)? as u64,
            avg_response_time_ms: row.get(5)?,
            consecutive_failures: row.get::<_, i64>(6)? as u32,
            last_success_at: parse_ts_opt(row.get(7)?),
            last_failure_at: parse_ts_opt(row.get(8)?),
        })
    }

    const BACKEND_COLUMNS: &'static str = "backend, total_requests, successful_requests, \
         failed_requests, total_characters, avg_response_time_ms, consecutive_failures, \
         last_success_at, last_failure_at";

    pub fn backend_record_success(
        &self,
        backend: &str,
        elapsed_ms: u64,
        characters: u64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::ensure_backend_row(&conn, backend)?;
        conn.execute(
            "UPDATE backend_stats SET \
                avg_response_time_ms = (avg_response_time_ms * total_requests + ?1) / (total_requests + 1), \
                total_requests = total_requests + 1, \
                successful_requests = successful_requests + 1, \
                total_characters = total_characters + ?2, \
                consecutive_failures = 0, \
                last_success_at = ?3 \
             WHERE backend = ?4",
            params![
                elapsed_ms as i64,
                characters as i64,
                Utc::now().to_rfc3339(),
                backend
            ],
        )?;
        Ok(())
    }

    pub fn backend_record_failure(&self, backend: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::ensure_backend_row(&conn, backend)?;
        conn.execute(
            "UPDATE backend_stats SET \
                total_requests = total_requests + 1, \
                failed_requests = failed_requests + 1, \
                consecutive_failures = consecutive_failures + 1, \
                last_failure_at = ? \
             WHERE backend = ?",
            params![Utc::now().to_rfc3339(), backend],
        )?;
        Ok(())
    }

    pub fn backend_stats(&self, backend: &str) -> Result<BackendStats, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::ensure_backend_row(&conn, backend)?;
        let stats = conn.query_row(
            &format!(
                "SELECT {} FROM backend_stats WHERE backend = ?",
                Self::BACKEND_COLUMNS
            ),
            params![backend],
            Self::row_to_backend_stats,
        )?;
        Ok(stats)
    }

    pub fn all_backend_stats(&self) -> Result<Vec<BackendStats>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM backend_stats ORDER BY backend",
            Self::BACKEND_COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::row_to_backend_stats)?;
        let mut all = Vec::new();
        for row in rows {
            all.push(row?);
        }
        Ok(all)
    }
}

/// Normalized edit-distance similarity in [0, 1].
fn edit_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let dist = prev[b.len()];
    1.0 - dist as f64 / a.len().max(b.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_exact_round_trip() {
        let store = SqliteTranslationStore::in_memory().unwrap();
        store
            .memory_put("en", "de", "h1", "hello there", "hallo du")
            .unwrap();
        assert_eq!(
            store.memory_get("en", "de", "h1").unwrap().as_deref(),
            Some("hallo du")
        );
        // Different language pair misses.
        assert_eq!(store.memory_get("en", "fr", "h1").unwrap(), None);
    }

    #[test]
    fn test_memory_upsert_overwrites() {
        let store = SqliteTranslationStore::in_memory().unwrap();
        store.memory_put("en", "de", "h1", "hi", "old").unwrap();
        store.memory_put("en", "de", "h1", "hi", "new").unwrap();
        assert_eq!(
            store.memory_get("en", "de", "h1").unwrap().as_deref(),
            Some("new")
        );
        assert_eq!(store.memory_count().unwrap(), 1);
    }

    #[test]
    fn test_memory_similarity_lookup() {
        let store = SqliteTranslationStore::in_memory().unwrap();
        store
            .memory_put("en", "de", "h1", "the quick brown fox", "der schnelle braune fuchs")
            .unwrap();
        let hit = store
            .memory_find_similar("en", "de", "the quick brown fox!", 0.9)
            .unwrap();
        assert_eq!(hit.as_deref(), Some("der schnelle braune fuchs"));
        let miss = store
            .memory_find_similar("en", "de", "completely different", 0.9)
            .unwrap();
        assert_eq!(miss, None);
    }

    #[test]
    fn test_glossary_merge_series_overrides_global() {
        let store = SqliteTranslationStore::in_memory().unwrap();
        store
            .glossary_add(None, "Titan", "Titan (global)", None)
            .unwrap();
        store
            .glossary_add(Some(7), "titan", "Titan (series)", None)
            .unwrap();
        store.glossary_add(None, "Wall", "Mauer", None).unwrap();

        let merged = store.glossary_merged(Some(7)).unwrap();
        assert_eq!(merged.len(), 2);
        let titan = merged
            .iter()
            .find(|e| e.source_term.eq_ignore_ascii_case("titan"))
            .unwrap();
        assert_eq!(titan.target_term, "Titan (series)");
    }

    #[test]
    fn test_glossary_merge_cap() {
        let store = SqliteTranslationStore::in_memory().unwrap();
        for i in 0..40 {
            store
                .glossary_add(None, &format!("term{i}"), &format!("t{i}"), None)
                .unwrap();
        }
        let merged = store.glossary_merged(None).unwrap();
        assert_eq!(merged.len(), GLOSSARY_MERGE_CAP);
    }

    #[test]
    fn test_glossary_no_series_returns_global_merge() {
        let store = SqliteTranslationStore::in_memory().unwrap();
        store.glossary_add(None, "a", "b", None).unwrap();
        store.glossary_add(Some(3), "c", "d", None).unwrap();
        let merged = store.glossary_merged(None).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source_term, "a");
    }

    #[test]
    fn test_profile_duplicate_name_conflicts() {
        let store = SqliteTranslationStore::in_memory().unwrap();
        store
            .profile_create("anime", "ja", &["de".into()], &["ollama".into()], ForcedPreference::Disabled)
            .unwrap();
        let err = store
            .profile_create("anime", "ja", &["de".into()], &["ollama".into()], ForcedPreference::Disabled)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_effective_profile_assignment_and_default() {
        let store = SqliteTranslationStore::in_memory().unwrap();
        let default = store
            .ensure_default_profile("en", &["de".into()], &["ollama".into()])
            .unwrap();
        let anime = store
            .profile_create("anime", "ja", &["de".into()], &["deepl".into()], ForcedPreference::Prefer)
            .unwrap();
        store.profile_assign("series", 7, anime.id).unwrap();

        let assigned = store.effective_profile("series", Some(7)).unwrap().unwrap();
        assert_eq!(assigned.id, anime.id);
        let fallback = store.effective_profile("series", Some(8)).unwrap().unwrap();
        assert_eq!(fallback.id, default.id);
        let none_ctx = store.effective_profile("movie", None).unwrap().unwrap();
        assert_eq!(none_ctx.id, default.id);
    }

    #[test]
    fn test_default_profile_not_deletable() {
        let store = SqliteTranslationStore::in_memory().unwrap();
        let default = store
            .ensure_default_profile("en", &["de".into()], &["ollama".into()])
            .unwrap();
        assert!(!store.profile_delete(default.id).unwrap());
        assert!(store.profile_by_name(DEFAULT_PROFILE_NAME).unwrap().is_some());
    }

    #[test]
    fn test_backend_stats_success_and_failure() {
        let store = SqliteTranslationStore::in_memory().unwrap();
        store.backend_record_success("deepl", 100, 500).unwrap();
        store.backend_record_success("deepl", 300, 700).unwrap();
        store.backend_record_failure("deepl").unwrap();

        let stats = store.backend_stats("deepl").unwrap();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.successful_requests, 2);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.total_characters, 1200);
        assert_eq!(stats.consecutive_failures, 1);
        // Average over the two successful requests.
        assert!((stats.avg_response_time_ms - 200.0).abs() < 1e-9);

        store.backend_record_success("deepl", 100, 10).unwrap();
        assert_eq!(store.backend_stats("deepl").unwrap().consecutive_failures, 0);
    }

    #[test]
    fn test_edit_ratio() {
        assert_eq!(edit_ratio("abc", "abc"), 1.0);
        assert!(edit_ratio("kitten", "sitting") > 0.5);
        assert!(edit_ratio("abc", "xyz") < 0.1);
        assert_eq!(edit_ratio("", "abc"), 0.0);
    }
}
