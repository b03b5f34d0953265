//! Translation manager: backend registry, fallback chain, circuit breakers,
//! statistics, quality evaluation and the translation-config hash.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::circuit::CircuitBreakerRegistry;
use crate::store::{GlossaryEntry, SettingsStore, SqliteTranslationStore};

use super::backends::{
    DeepLBackend, GoogleTranslateBackend, LibreTranslateBackend, OllamaBackend, OpenAiBackend,
};
use super::memory::TranslationMemory;
use super::types::{BackendError, TranslationBackend, TranslationResult};

/// Backend names the manager can instantiate.
pub const KNOWN_BACKENDS: &[&str] = &["ollama", "openai", "deepl", "google", "libretranslate"];

/// Default quality score when evaluation is unavailable.
const DEFAULT_QUALITY_SCORE: u8 = 50;

/// Translation manager with a lazily-instantiated backend registry.
pub struct TranslationManager {
    settings: Arc<dyn SettingsStore>,
    store: Arc<SqliteTranslationStore>,
    memory: TranslationMemory,
    breakers: CircuitBreakerRegistry,
    backends: Mutex<HashMap<String, Arc<dyn TranslationBackend>>>,
    built_at_generation: AtomicU64,
}

impl TranslationManager {
    pub fn new(store: Arc<SqliteTranslationStore>, settings: Arc<dyn SettingsStore>) -> Self {
        let threshold = settings.get_i64("translation.circuit_threshold", 3) as u32;
        let cooldown =
            Duration::from_secs(settings.get_i64("translation.circuit_cooldown_seconds", 300) as u64);
        Self {
            memory: TranslationMemory::new(Arc::clone(&store), Arc::clone(&settings)),
            breakers: CircuitBreakerRegistry::new(threshold, cooldown),
            backends: Mutex::new(HashMap::new()),
            built_at_generation: AtomicU64::new(0),
            settings,
            store,
        }
    }

    pub fn store(&self) -> &Arc<SqliteTranslationStore> {
        &self.store
    }

    pub fn memory(&self) -> &TranslationMemory {
        &self.memory
    }

    fn backend_config(&self, name: &str) -> std::collections::BTreeMap<String, String> {
        let prefix = format!("backend.{name}.");
        self.settings
            .get_prefixed(&prefix)
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k.strip_prefix(&prefix).unwrap_or(&k).to_string(), v))
            .collect()
    }

    fn build_backend(&self, name: &str) -> Option<Arc<dyn TranslationBackend>> {
        let config = self.backend_config(name);
        let backend: Arc<dyn TranslationBackend> = match name {
            "ollama" => Arc::new(OllamaBackend::from_config(&config)),
            "openai" => Arc::new(OpenAiBackend::from_config(&config)),
            "deepl" => Arc::new(DeepLBackend::from_config(&config)),
            "google" => Arc::new(GoogleTranslateBackend::from_config(&config)),
            "libretranslate" => Arc::new(LibreTranslateBackend::from_config(&config)),
            _ => return None,
        };
        Some(backend)
    }

    /// Get (or lazily build) a backend instance.
    ///
    /// A settings write invalidates every cached instance; the next access
    /// rebuilds against the current configuration.
    pub fn backend(&self, name: &str) -> Option<Arc<dyn TranslationBackend>> {
        let generation = self.settings.generation();
        let mut backends = self.backends.lock().unwrap();
        if self.built_at_generation.swap(generation, Ordering::SeqCst) != generation {
            backends.clear();
        }
        if let Some(existing) = backends.get(name) {
            return Some(Arc::clone(existing));
        }
        let built = self.build_backend(name)?;
        backends.insert(name.to_string(), Arc::clone(&built));
        Some(built)
    }

    /// Drop one backend's cached instance and circuit state.
    pub fn invalidate_backend(&self, name: &str) {
        self.backends.lock().unwrap().remove(name);
        self.breakers.invalidate(name);
    }

    /// Drop everything (full configuration reload).
    pub fn invalidate_all(&self) {
        self.backends.lock().unwrap().clear();
        self.breakers.clear();
    }

    /// Translate lines through the fallback chain.
    ///
    /// Backends are tried in order; an open circuit skips a backend, a
    /// failure ticks its breaker (fatal errors trip it open) and the chain
    /// moves on. Never raises: callers read `success`.
    pub async fn translate_with_fallback(
        &self,
        lines: &[String],
        source_lang: &str,
        target_lang: &str,
        chain: &[String],
        glossary: &[GlossaryEntry],
    ) -> TranslationResult {
        if lines.is_empty() {
            return TranslationResult {
                success: true,
                ..Default::default()
            };
        }

        // Memory pass: translate only the misses.
        let mut from_memory: Vec<Option<String>> = Vec::with_capacity(lines.len());
        let mut misses: Vec<(usize, String)> = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            match self.memory.lookup(source_lang, target_lang, line) {
                Some(hit) => from_memory.push(Some(hit)),
                None => {
                    from_memory.push(None);
                    misses.push((i, line.clone()));
                }
            }
        }
        let memory_hits = lines.len() - misses.len();
        if misses.is_empty() {
            return TranslationResult {
                success: true,
                lines: from_memory.into_iter().map(Option::unwrap).collect(),
                backend_used: None,
                elapsed_ms: 0,
                characters: 0,
                memory_hits,
                error: None,
            };
        }

        let miss_lines: Vec<String> = misses.iter().map(|(_, l)| l.clone()).collect();
        let characters: u64 = miss_lines.iter().map(|l| l.chars().count() as u64).sum();
        let mut last_error = "no backends in chain".to_string();

        for backend_name in chain {
            if !self.breakers.allow_request(backend_name) {
                debug!("Circuit open for backend {backend_name}, skipping");
                continue;
            }
            let Some(backend) = self.backend(backend_name) else {
                warn!("Unknown translation backend in chain: {backend_name}");
                continue;
            };
            let glossary_slice: &[GlossaryEntry] = if backend.supports_glossary() {
                glossary
            } else {
                &[]
            };

            let started = Instant::now();
            match self
                .call_backend(backend.as_ref(), &miss_lines, source_lang, target_lang, glossary_slice)
                .await
            {
                Ok(translated) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    self.breakers.record_success(backend_name);
                    if let Err(e) =
                        self.store
                            .backend_record_success(backend_name, elapsed_ms, characters)
                    {
                        warn!("Failed to record backend stats: {e}");
                    }
                    for ((_, source), output) in misses.iter().zip(translated.iter()) {
                        self.memory.store(source_lang, target_lang, source, output);
                    }

                    let mut merged = from_memory;
                    for ((index, _), output) in misses.iter().zip(translated.into_iter()) {
                        merged[*index] = Some(output);
                    }
                    info!(
                        "Translated {} line(s) via {} ({} from memory)",
                        lines.len(),
                        backend_name,
                        memory_hits
                    );
                    return TranslationResult {
                        success: true,
                        lines: merged.into_iter().map(Option::unwrap).collect(),
                        backend_used: Some(backend_name.clone()),
                        elapsed_ms,
                        characters,
                        memory_hits,
                        error: None,
                    };
                }
                Err(e) => {
                    if let Err(se) = self.store.backend_record_failure(backend_name) {
                        warn!("Failed to record backend stats: {se}");
                    }
                    if e.is_fatal() {
                        warn!("Backend {backend_name} failed fatally, tripping circuit: {e}");
                        self.breakers.trip(backend_name);
                    } else {
                        warn!("Backend {backend_name} failed: {e}");
                        self.breakers.record_failure(backend_name);
                    }
                    last_error = format!("{backend_name}: {e}");
                }
            }
        }

        TranslationResult::failure(format!("all backends failed, last: {last_error}"))
    }

    /// One backend invocation, chunked to its batch size, under its timeout.
    async fn call_backend(
        &self,
        backend: &dyn TranslationBackend,
        lines: &[String],
        source_lang: &str,
        target_lang: &str,
        glossary: &[GlossaryEntry],
    ) -> Result<Vec<String>, BackendError> {
        let chunk_size = if backend.supports_batch() {
            backend.max_batch_size().max(1)
        } else {
            1
        };
        let mut out = Vec::with_capacity(lines.len());
        for chunk in lines.chunks(chunk_size) {
            let translated = tokio::time::timeout(
                backend.timeout(),
                backend.translate_batch(chunk, source_lang, target_lang, glossary),
            )
            .await
            .map_err(|_| BackendError::Transient("backend call timed out".to_string()))??;
            if translated.len() != chunk.len() {
                return Err(BackendError::Malformed(format!(
                    "{} outputs for {} inputs",
                    translated.len(),
                    chunk.len()
                )));
            }
            out.extend(translated);
        }
        Ok(out)
    }

    /// Advisory 0-100 quality score from the first generative backend in
    /// the chain. Defaults to 50 on any error; never blocks translation.
    pub async fn evaluate_quality(
        &self,
        source_text: &str,
        translated_text: &str,
        source_lang: &str,
        target_lang: &str,
        chain: &[String],
    ) -> u8 {
        for backend_name in chain {
            let Some(backend) = self.backend(backend_name) else {
                continue;
            };
            if !backend.is_generative() {
                continue;
            }
            let prompt = format!(
                "Rate this translation from {source_lang} to {target_lang} on a scale of 0-100.\n\
                 Reply with only the number.\n\nSource: {source_text}\nTranslation: {translated_text}"
            );
            match tokio::time::timeout(Duration::from_secs(30), backend.complete(&prompt)).await {
                Ok(Ok(answer)) => {
                    if let Some(score) = parse_score(&answer) {
                        return score;
                    }
                    return DEFAULT_QUALITY_SCORE;
                }
                _ => return DEFAULT_QUALITY_SCORE,
            }
        }
        DEFAULT_QUALITY_SCORE
    }

    /// Hash over everything that could change the text of a translation.
    ///
    /// Jobs store this at completion; a mismatch against the current hash
    /// marks them outdated for re-translation.
    pub fn config_hash(&self, chain: &[String], target_lang: &str, glossary: &[GlossaryEntry]) -> String {
        let mut glossary_ids: Vec<i64> = glossary.iter().map(|g| g.id).collect();
        glossary_ids.sort_unstable();
        let models: Vec<(String, String)> = chain
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    self.settings.get_string(&format!("backend.{name}.model"), ""),
                )
            })
            .collect();
        let prompt_template = self.settings.get_string("translation.prompt_template", "");
        let payload = serde_json::json!({
            "chain": models,
            "prompt_template": prompt_template,
            "target_lang": target_lang,
            "glossary": glossary_ids,
        });
        format!("{:x}", Sha256::digest(payload.to_string().as_bytes()))
    }
}

fn parse_score(answer: &str) -> Option<u8> {
    let digits: String = answer
        .trim()
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<u32>().ok().map(|n| n.min(100) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteSettingsStore;
    use crate::testing::MockBackend;

    fn manager() -> TranslationManager {
        TranslationManager::new(
            Arc::new(SqliteTranslationStore::in_memory().unwrap()),
            Arc::new(SqliteSettingsStore::in_memory().unwrap()),
        )
    }

    fn manager_with_backends(backends: Vec<MockBackend>) -> TranslationManager {
        let m = manager();
        let mut map = m.backends.lock().unwrap();
        // Pin the generation so the injected mocks are not cleared.
        for backend in backends {
            map.insert(backend.name().to_string(), Arc::new(backend));
        }
        drop(map);
        m
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_zero_lines_is_success() {
        let m = manager();
        let result = m
            .translate_with_fallback(&[], "en", "de", &["ollama".to_string()], &[])
            .await;
        assert!(result.success);
        assert!(result.lines.is_empty());
    }

    #[tokio::test]
    async fn test_fallback_to_second_backend() {
        let failing = MockBackend::new("first").failing_with(|| BackendError::Transient("down".into()));
        let working = MockBackend::new("second");
        let m = manager_with_backends(vec![failing, working]);

        let result = m
            .translate_with_fallback(
                &lines(&["Hello"]),
                "en",
                "de",
                &["first".to_string(), "second".to_string()],
                &[],
            )
            .await;
        assert!(result.success);
        assert_eq!(result.backend_used.as_deref(), Some("second"));
        assert_eq!(result.lines.len(), 1);
    }

    #[tokio::test]
    async fn test_all_backends_failing_reports_last_error() {
        let a = MockBackend::new("a").failing_with(|| BackendError::Transient("a down".into()));
        let b = MockBackend::new("b").failing_with(|| BackendError::Transient("b down".into()));
        let m = manager_with_backends(vec![a, b]);

        let result = m
            .translate_with_fallback(
                &lines(&["Hello"]),
                "en",
                "de",
                &["a".to_string(), "b".to_string()],
                &[],
            )
            .await;
        assert!(!result.success);
        assert!(result.error.as_ref().unwrap().contains("b down"));
    }

    #[tokio::test]
    async fn test_circuit_opens_after_threshold() {
        let failing = MockBackend::new("flaky").failing_with(|| BackendError::Transient("boom".into()));
        let m = manager_with_backends(vec![failing]);
        let chain = vec!["flaky".to_string()];

        // Default threshold is 3 failures.
        for _ in 0..3 {
            let result = m
                .translate_with_fallback(&lines(&["x"]), "en", "de", &chain, &[])
                .await;
            assert!(!result.success);
        }
        assert_eq!(
            m.breakers.state("flaky"),
            Some(crate::circuit::CircuitState::Open)
        );
        // With the circuit open the backend is skipped entirely.
        let result = m
            .translate_with_fallback(&lines(&["x"]), "en", "de", &chain, &[])
            .await;
        assert!(!result.success);
        assert!(result.error.as_ref().unwrap().contains("no backends"));
    }

    #[tokio::test]
    async fn test_fatal_error_trips_circuit_immediately() {
        let fatal = MockBackend::new("quota").failing_with(|| BackendError::Fatal("quota gone".into()));
        let m = manager_with_backends(vec![fatal]);
        let chain = vec!["quota".to_string()];

        let result = m
            .translate_with_fallback(&lines(&["x"]), "en", "de", &chain, &[])
            .await;
        assert!(!result.success);
        assert_eq!(
            m.breakers.state("quota"),
            Some(crate::circuit::CircuitState::Open)
        );
    }

    #[tokio::test]
    async fn test_memory_serves_repeat_lines() {
        let backend = MockBackend::new("mock");
        let m = manager_with_backends(vec![backend]);
        let chain = vec!["mock".to_string()];

        let first = m
            .translate_with_fallback(&lines(&["Hello there"]), "en", "de", &chain, &[])
            .await;
        assert!(first.success);
        assert_eq!(first.memory_hits, 0);

        let second = m
            .translate_with_fallback(&lines(&["Hello there"]), "en", "de", &chain, &[])
            .await;
        assert!(second.success);
        assert_eq!(second.memory_hits, 1);
        assert_eq!(second.backend_used, None);
        assert_eq!(second.lines, first.lines);
    }

    #[tokio::test]
    async fn test_backend_stats_recorded() {
        let m = manager_with_backends(vec![MockBackend::new("mock")]);
        let chain = vec!["mock".to_string()];
        let result = m
            .translate_with_fallback(&lines(&["Hello"]), "en", "de", &chain, &[])
            .await;
        assert!(result.success);
        let stats = m.store.backend_stats("mock").unwrap();
        assert_eq!(stats.successful_requests, 1);
        assert_eq!(stats.total_characters, 5);
    }

    #[tokio::test]
    async fn test_quality_eval_defaults_without_generative_backend() {
        let m = manager();
        let score = m
            .evaluate_quality("Hello", "Hallo", "en", "de", &["deepl".to_string()])
            .await;
        assert_eq!(score, DEFAULT_QUALITY_SCORE);
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("87"), Some(87));
        assert_eq!(parse_score("Score: 92/100"), Some(92));
        assert_eq!(parse_score("150"), Some(100));
        assert_eq!(parse_score("no number"), None);
    }

    #[test]
    fn test_config_hash_changes_with_model_and_glossary() {
        let m = manager();
        let chain = vec!["ollama".to_string()];
        let h1 = m.config_hash(&chain, "de", &[]);
        assert_eq!(h1, m.config_hash(&chain, "de", &[]));
        assert_ne!(h1, m.config_hash(&chain, "fr", &[]));

        m.settings.set("backend.ollama.model", "llama3").unwrap();
        assert_ne!(h1, m.config_hash(&chain, "de", &[]));
    }

    #[test]
    fn test_known_backends_instantiable() {
        let m = manager();
        for name in KNOWN_BACKENDS {
            assert!(m.backend(name).is_some(), "backend {name} not buildable");
        }
        assert!(m.backend("bogus").is_none());
    }
}
