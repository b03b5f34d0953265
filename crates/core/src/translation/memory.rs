//! Translation-memory cache over the store.
//!
//! Exact lookups hash the normalized text; an optional similarity pass
//! scans the same language pair when the exact lookup misses.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::store::{SettingsStore, SqliteTranslationStore};

/// Normalize a line for memory lookup: collapse whitespace, casefold, trim.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// SHA-256 hex digest of the normalized text.
pub fn text_hash(text: &str) -> String {
    let normalized = normalize_text(text);
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

/// Translation memory facade.
pub struct TranslationMemory {
    store: Arc<SqliteTranslationStore>,
    settings: Arc<dyn SettingsStore>,
}

impl TranslationMemory {
    pub fn new(store: Arc<SqliteTranslationStore>, settings: Arc<dyn SettingsStore>) -> Self {
        Self { store, settings }
    }

    pub fn enabled(&self) -> bool {
        self.settings.get_bool("translation.memory_enabled", true)
    }

    fn similarity_enabled(&self) -> bool {
        self.settings
            .get_bool("translation.memory_similarity_enabled", false)
    }

    fn similarity_min_ratio(&self) -> f64 {
        self.settings
            .get_f64("translation.memory_similarity_ratio", 0.95)
    }

    /// Look up a line: exact by hash, then optional similarity scan.
    pub fn lookup(&self, source_lang: &str, target_lang: &str, text: &str) -> Option<String> {
        if !self.enabled() {
            return None;
        }
        let hash = text_hash(text);
        match self.store.memory_get(source_lang, target_lang, &hash) {
            Ok(Some(hit)) => {
                debug!("Translation memory exact hit for {source_lang}->{target_lang}");
                return Some(hit);
            }
            Ok(None) => {}
            Err(e) => {
                debug!("Translation memory lookup failed: {e}");
                return None;
            }
        }
        if self.similarity_enabled() {
            let normalized = normalize_text(text);
            return self
                .store
                .memory_find_similar(
                    source_lang,
                    target_lang,
                    &normalized,
                    self.similarity_min_ratio(),
                )
                .ok()
                .flatten();
        }
        None
    }

    /// Store a translated line, upserting by hash.
    pub fn store(&self, source_lang: &str, target_lang: &str, text: &str, translated: &str) {
        if !self.enabled() {
            return;
        }
        let hash = text_hash(text);
        let normalized = normalize_text(text);
        if let Err(e) =
            self.store
                .memory_put(source_lang, target_lang, &hash, &normalized, translated)
        {
            debug!("Translation memory store failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteSettingsStore;

    fn memory() -> TranslationMemory {
        TranslationMemory::new(
            Arc::new(SqliteTranslationStore::in_memory().unwrap()),
            Arc::new(SqliteSettingsStore::in_memory().unwrap()),
        )
    }

    #[test]
    fn test_normalize_collapses_and_casefolds() {
        assert_eq!(normalize_text("  Hello   World "), "hello world");
        assert_eq!(normalize_text("a\tb\nc"), "a b c");
    }

    #[test]
    fn test_hash_invariant_under_normalization() {
        assert_eq!(text_hash("Hello  World"), text_hash("hello world"));
        assert_ne!(text_hash("hello"), text_hash("world"));
    }

    #[test]
    fn test_round_trip() {
        let memory = memory();
        assert_eq!(memory.lookup("en", "de", "Hello there"), None);
        memory.store("en", "de", "Hello there", "Hallo du");
        assert_eq!(
            memory.lookup("en", "de", "hello  THERE").as_deref(),
            Some("Hallo du")
        );
    }

    #[test]
    fn test_disabled_memory_is_inert() {
        let settings = Arc::new(SqliteSettingsStore::in_memory().unwrap());
        settings.set("translation.memory_enabled", "false").unwrap();
        let memory = TranslationMemory::new(
            Arc::new(SqliteTranslationStore::in_memory().unwrap()),
            settings,
        );
        memory.store("en", "de", "Hello", "Hallo");
        assert_eq!(memory.lookup("en", "de", "Hello"), None);
    }
}
