//! Provider manager: fan-out search, merge/score/cache, download, save.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::fsops::{atomic_write, PathSafetyError};
use crate::store::{SettingsStore, SqliteHistoryStore};
use crate::subtitles::{sidecar_path, SubtitleFormat};

use super::archive::{detect_archive, extract_subtitle_from_archive};
use super::registry::ProviderRegistry;
use super::scoring::{is_perfect, score_candidate, ScoringWeights};
use super::types::{ProviderError, SubtitleCandidate, SubtitleProvider, VideoQuery};

/// Name of the embedded-stream pseudo-provider.
pub const EMBEDDED_PROVIDER: &str = "embedded";

/// Extra wait granted on top of the slowest provider timeout.
const FANOUT_SLACK: Duration = Duration::from_secs(2);

/// A downloaded subtitle payload with its true filename/format.
///
/// Archive extraction may rewrite both: the caller's format hint is
/// untrusted.
#[derive(Debug, Clone)]
pub struct DownloadedSubtitle {
    pub candidate: SubtitleCandidate,
    pub bytes: Vec<u8>,
    pub format: SubtitleFormat,
}

/// Errors surfaced by manager-level operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    PathSafety(#[from] PathSafetyError),

    #[error("No downloadable candidate")]
    NoCandidate,
}

/// Fan-out search coordinator over the registry's providers.
pub struct ProviderManager {
    registry: Arc<ProviderRegistry>,
    history: Arc<SqliteHistoryStore>,
    settings: Arc<dyn SettingsStore>,
}

impl ProviderManager {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        history: Arc<SqliteHistoryStore>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            registry,
            history,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.settings.get_i64("providers.cache_ttl_minutes", 15))
    }

    fn early_exit_enabled(&self) -> bool {
        self.settings.get_bool("providers.early_exit", true)
    }

    fn auto_prioritize_enabled(&self) -> bool {
        self.settings.get_bool("providers.auto_prioritize", false)
    }

    fn min_score(&self) -> i32 {
        self.settings.get_i64("providers.min_score", 0) as i32
    }

    fn blacklist(&self) -> HashSet<String> {
        self.settings
            .get("providers.blacklist")
            .ok()
            .flatten()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
            .map(|v| v.into_iter().collect())
            .unwrap_or_default()
    }

    /// Cache key over the query identity.
    fn cache_key(query: &VideoQuery, format_filter: Option<SubtitleFormat>) -> String {
        let mut languages = query.languages.clone();
        languages.sort();
        let filter = format_filter.map(|f| f.extension()).unwrap_or("any");
        let raw = format!("{}|{}|{}", query.file_path, languages.join(","), filter);
        format!("{:x}", md5::compute(raw.as_bytes()))
    }

    /// Providers ordered for this search.
    ///
    /// Manual priority by default. With auto-prioritize enabled, providers
    /// with at least ten recorded searches re-sort by success rate
    /// (descending) with manual priority as tiebreak.
    fn ordered_providers(&self) -> Vec<Arc<dyn SubtitleProvider>> {
        let mut entries: Vec<(Arc<dyn SubtitleProvider>, i64, f64)> = self
            .registry
            .active_providers()
            .into_iter()
            .map(|(provider, priority)| {
                let success_rate = if self.auto_prioritize_enabled() {
                    match self.registry.stats(provider.name()) {
                        Ok(stats) if stats.total_searches >= 10 => {
                            stats.successful_downloads as f64 / stats.total_searches as f64
                        }
                        _ => -1.0,
                    }
                } else {
                    -1.0
                };
                (provider, priority, success_rate)
            })
            .collect();
        entries.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        entries.into_iter().map(|(p, _, _)| p).collect()
    }

    /// Search all admitted providers in parallel and return merged, scored,
    /// deduplicated candidates sorted best-first.
    pub async fn search(
        &self,
        query: &VideoQuery,
        format_filter: Option<SubtitleFormat>,
        min_score: Option<i32>,
    ) -> Vec<SubtitleCandidate> {
        let cache_key = Self::cache_key(query, format_filter);
        if let Ok(Some(cached)) = self.registry.store().cache_get(&cache_key) {
            if let Ok(candidates) = serde_json::from_str::<Vec<SubtitleCandidate>>(&cached) {
                debug!("Provider cache hit for {}", query.file_path);
                return candidates;
            }
        }

        let providers = self.ordered_providers();
        if providers.is_empty() {
            return Vec::new();
        }

        let weights = ScoringWeights::from_settings(self.settings.as_ref());
        let min_score = min_score.unwrap_or_else(|| self.min_score());
        let blacklist = self.blacklist();
        let early_exit = self.early_exit_enabled();

        let max_timeout = providers
            .iter()
            .map(|p| p.timeout())
            .max()
            .unwrap_or(Duration::from_secs(15));
        let deadline = Instant::now() + max_timeout + FANOUT_SLACK;

        let (tx, mut rx) = mpsc::channel::<(String, Result<Vec<SubtitleCandidate>, ProviderError>)>(
            providers.len().max(1),
        );

        let mut spawned = 0usize;
        for provider in providers {
            let name = provider.name().to_string();
            match self.registry.admit(&name) {
                Ok(()) => {}
                Err(e) => {
                    debug!("Provider {} not admitted: {}", name, e);
                    continue;
                }
            }
            let tx = tx.clone();
            let query = query.clone();
            let registry = Arc::clone(&self.registry);
            spawned += 1;
            tokio::spawn(async move {
                let started = Instant::now();
                let result = search_with_retry(provider.as_ref(), &query).await;
                registry.record_search(&name, started.elapsed().as_millis() as u64);
                if let Err(ref e) = result {
                    if !matches!(e, ProviderError::Skipped(_)) {
                        registry.record_failure(&name, e);
                    }
                }
                let _ = tx.send((name, result)).await;
            });
        }
        drop(tx);

        let mut merged: Vec<SubtitleCandidate> = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut completed = 0usize;
        let mut found_perfect = false;

        while completed < spawned {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("Provider fan-out deadline reached with {completed}/{spawned} done");
                break;
            }
            let received = tokio::time::timeout(remaining, rx.recv()).await;
            let (name, result) = match received {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(_) => {
                    warn!("Provider fan-out timed out waiting for results");
                    break;
                }
            };
            completed += 1;

            let candidates = match result {
                Ok(candidates) => candidates,
                Err(e) => {
                    debug!("Provider {} search failed: {}", name, e);
                    continue;
                }
            };

            for mut candidate in candidates {
                if !query.languages.is_empty()
                    && !query
                        .languages
                        .iter()
                        .any(|l| l.eq_ignore_ascii_case(&candidate.language))
                {
                    continue;
                }
                if let Some(filter) = format_filter {
                    if candidate.format != filter {
                        continue;
                    }
                }
                if blacklist.contains(&format!("{}:{}", candidate.provider, candidate.subtitle_id))
                {
                    continue;
                }
                if !seen.insert((candidate.provider.clone(), candidate.subtitle_id.clone())) {
                    continue;
                }
                let modifier = self
                    .registry
                    .stats(&candidate.provider)
                    .map(|s| s.score_modifier)
                    .unwrap_or(0);
                candidate.score = score_candidate(&candidate, query, &weights, modifier);
                if candidate.score < min_score {
                    continue;
                }
                if early_exit && is_perfect(candidate.score) {
                    found_perfect = true;
                }
                merged.push(candidate);
            }

            if found_perfect {
                info!("Early exit: perfect-match candidate found for {}", query.file_path);
                break;
            }
        }

        merged.sort_by(|a, b| {
            a.format
                .rank()
                .cmp(&b.format.rank())
                .then(b.score.cmp(&a.score))
        });

        if let Ok(json) = serde_json::to_string(&merged) {
            if let Err(e) =
                self.registry
                    .store()
                    .cache_put("merged", &cache_key, &json, self.cache_ttl())
            {
                warn!("Failed to cache search results: {}", e);
            }
        }

        merged
    }

    /// Language-ordered search helper: try each language list in order and
    /// return the first non-empty result set (forced-mode fallback).
    pub async fn search_with_fallback(
        &self,
        query: &VideoQuery,
        language_order: &[Vec<String>],
        format_filter: Option<SubtitleFormat>,
    ) -> Vec<SubtitleCandidate> {
        for languages in language_order {
            let mut q = query.clone();
            q.languages = languages.clone();
            let results = self.search(&q, format_filter, None).await;
            if !results.is_empty() {
                return results;
            }
        }
        Vec::new()
    }

    /// Download a candidate's payload, transparently unwrapping archives.
    ///
    /// The `embedded` pseudo-provider returns an empty payload; the actual
    /// extraction happens in the translator against the video container.
    pub async fn download(
        &self,
        candidate: &SubtitleCandidate,
    ) -> Result<DownloadedSubtitle, ManagerError> {
        if candidate.provider == EMBEDDED_PROVIDER {
            return Ok(DownloadedSubtitle {
                candidate: candidate.clone(),
                bytes: Vec::new(),
                format: candidate.format,
            });
        }

        self.registry.admit(&candidate.provider)?;
        let provider = self
            .registry
            .get(&candidate.provider)
            .ok_or_else(|| {
                ProviderError::Skipped(format!("unknown provider {}", candidate.provider))
            })?
            .clone();

        let result = tokio::time::timeout(provider.timeout(), provider.download(candidate)).await;
        let bytes = match result {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                self.registry.record_failure(&candidate.provider, &e);
                return Err(e.into());
            }
            Err(_) => {
                let e = ProviderError::Transient("download timeout".to_string());
                self.registry.record_failure(&candidate.provider, &e);
                return Err(e.into());
            }
        };

        self.registry.record_success(&candidate.provider, candidate.score);

        let mut out = DownloadedSubtitle {
            candidate: candidate.clone(),
            format: candidate.format,
            bytes,
        };
        if let Some(kind) = detect_archive(&out.bytes) {
            let extracted = extract_subtitle_from_archive(&out.bytes, kind).await?;
            out.candidate.filename = extracted.filename;
            out.format = extracted.format;
            out.candidate.format = extracted.format;
            out.bytes = extracted.bytes;
        }
        Ok(out)
    }

    /// Search, then download candidates best-first until one succeeds.
    pub async fn search_and_download_best(
        &self,
        query: &VideoQuery,
        format_filter: Option<SubtitleFormat>,
    ) -> Result<Option<DownloadedSubtitle>, ManagerError> {
        let candidates = self.search(query, format_filter, None).await;
        if candidates.is_empty() {
            return Ok(None);
        }
        for candidate in &candidates {
            match self.download(candidate).await {
                Ok(downloaded) => return Ok(Some(downloaded)),
                Err(e) => {
                    warn!(
                        "Download from {} failed, trying next candidate: {}",
                        candidate.provider, e
                    );
                }
            }
        }
        Err(ManagerError::NoCandidate)
    }

    /// Write a downloaded subtitle next to the video and record history.
    ///
    /// The final extension honors the true format discovered during
    /// download/extraction. Returns the path written.
    pub fn save_subtitle(
        &self,
        downloaded: &DownloadedSubtitle,
        video_path: &Path,
        language: &str,
        forced: bool,
    ) -> Result<PathBuf, ManagerError> {
        let format = match downloaded.format {
            SubtitleFormat::Unknown => SubtitleFormat::Srt,
            f => f,
        };
        let output = sidecar_path(video_path, language, forced, format);
        atomic_write(&output, &downloaded.bytes)?;
        if let Err(e) = self.history.record_download(
            &downloaded.candidate.provider,
            &downloaded.candidate.subtitle_id,
            language,
            format.extension(),
            &output.to_string_lossy(),
            downloaded.candidate.score,
        ) {
            warn!("Failed to record download history: {}", e);
        }
        info!(
            "Saved subtitle from {} to {:?} (score {})",
            downloaded.candidate.provider, output, downloaded.candidate.score
        );
        Ok(output)
    }
}

/// One provider search with bounded retries.
///
/// Transient failures back off exponentially (500ms base) and retry up to
/// the provider's `max_retries`; auth and rate-limit errors never retry.
async fn search_with_retry(
    provider: &dyn SubtitleProvider,
    query: &VideoQuery,
) -> Result<Vec<SubtitleCandidate>, ProviderError> {
    let mut attempt = 0u32;
    loop {
        let result = tokio::time::timeout(provider.timeout(), provider.search(query)).await;
        let error = match result {
            Ok(Ok(candidates)) => return Ok(candidates),
            Ok(Err(e)) => e,
            Err(_) => ProviderError::Transient("search timeout".to_string()),
        };
        if !error.is_retryable() || attempt >= provider.max_retries() {
            return Err(error);
        }
        let backoff = Duration::from_millis(500) * 2u32.pow(attempt);
        debug!(
            "Retrying {} after {:?} (attempt {}): {}",
            provider.name(),
            backoff,
            attempt + 1,
            error
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SqliteProviderStore, SqliteSettingsStore};
    use crate::testing::MockProvider;

    fn manager_with(providers: Vec<MockProvider>) -> ProviderManager {
        let store = Arc::new(SqliteProviderStore::in_memory().unwrap());
        let settings: Arc<dyn SettingsStore> = Arc::new(SqliteSettingsStore::in_memory().unwrap());
        let mut registry = ProviderRegistry::new(store, Arc::clone(&settings));
        for provider in providers {
            registry.register(Arc::new(provider));
        }
        ProviderManager::new(
            Arc::new(registry),
            Arc::new(SqliteHistoryStore::in_memory().unwrap()),
            settings,
        )
    }

    fn query() -> VideoQuery {
        VideoQuery {
            file_path: "/m/Show/S01/E01.mkv".to_string(),
            series: Some("Show".to_string()),
            season: Some(1),
            episode: Some(1),
            languages: vec!["de".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_provider_list_yields_empty_result() {
        let manager = manager_with(vec![]);
        let results = manager.search(&query(), None, None).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_merges_and_sorts_format_then_score() {
        let a = MockProvider::new("a").with_candidate("1", "de", SubtitleFormat::Srt, &["series", "season", "episode"]);
        let b = MockProvider::new("b").with_candidate("2", "de", SubtitleFormat::Ass, &["series"]);
        let manager = manager_with(vec![a, b]);
        // Both providers must contribute; a perfect SRT would otherwise
        // short-circuit the fan-out.
        manager.settings.set("providers.early_exit", "false").unwrap();

        let results = manager.search(&query(), None, None).await;
        assert_eq!(results.len(), 2);
        // ASS outranks SRT even with a lower score.
        assert_eq!(results[0].format, SubtitleFormat::Ass);
        assert!(results[1].score > results[0].score);
    }

    #[tokio::test]
    async fn test_search_filters_language_and_format() {
        let a = MockProvider::new("a")
            .with_candidate("1", "fr", SubtitleFormat::Ass, &["series"])
            .with_candidate("2", "de", SubtitleFormat::Srt, &["series"]);
        let manager = manager_with(vec![a]);

        let all = manager.search(&query(), None, None).await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].language, "de");

        let ass_only = manager.search(&query(), Some(SubtitleFormat::Ass), None).await;
        assert!(ass_only.is_empty());
    }

    #[tokio::test]
    async fn test_search_deduplicates_by_provider_and_id() {
        let a = MockProvider::new("a")
            .with_candidate("dup", "de", SubtitleFormat::Srt, &["series"])
            .with_candidate("dup", "de", SubtitleFormat::Srt, &["series"]);
        let manager = manager_with(vec![a]);
        let results = manager.search(&query(), None, None).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_provider_does_not_poison_fanout() {
        let good = MockProvider::new("good").with_candidate("1", "de", SubtitleFormat::Srt, &["series"]);
        let bad = MockProvider::new("bad").failing_with(|| ProviderError::Transient("boom".into()));
        let manager = manager_with(vec![good, bad]);
        let results = manager.search(&query(), None, None).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_providers() {
        let a = MockProvider::new("a").with_candidate("1", "de", SubtitleFormat::Srt, &["series"]);
        let manager = manager_with(vec![a]);

        let first = manager.search(&query(), None, None).await;
        assert_eq!(first.len(), 1);
        let calls_after_first = manager
            .registry
            .stats("a")
            .map(|s| s.total_searches)
            .unwrap();

        let second = manager.search(&query(), None, None).await;
        assert_eq!(second.len(), 1);
        let calls_after_second = manager
            .registry
            .stats("a")
            .map(|s| s.total_searches)
            .unwrap();
        assert_eq!(calls_after_first, calls_after_second);
    }

    #[tokio::test]
    async fn test_min_score_filters() {
        let a = MockProvider::new("a").with_candidate("1", "de", SubtitleFormat::Srt, &["year"]);
        let manager = manager_with(vec![a]);
        let results = manager.search(&query(), None, Some(300)).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_blacklist_excludes_candidate() {
        let a = MockProvider::new("a").with_candidate("bad-id", "de", SubtitleFormat::Srt, &["series"]);
        let manager = manager_with(vec![a]);
        manager
            .settings
            .set("providers.blacklist", r#"["a:bad-id"]"#)
            .unwrap();
        let results = manager.search(&query(), None, None).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_embedded_download_returns_empty_payload() {
        let manager = manager_with(vec![]);
        let candidate = SubtitleCandidate {
            provider: EMBEDDED_PROVIDER.to_string(),
            subtitle_id: "s:0".to_string(),
            filename: "embedded.ass".to_string(),
            language: "en".to_string(),
            format: SubtitleFormat::Ass,
            score: 0,
            release_info: String::new(),
            hearing_impaired: false,
            forced: false,
            matches: Default::default(),
            machine_translated: false,
            mt_confidence: 0.0,
            uploader_trust: 0.0,
            provider_data: None,
        };
        let downloaded = manager.download(&candidate).await.unwrap();
        assert!(downloaded.bytes.is_empty());
    }

    #[tokio::test]
    async fn test_download_failover_in_search_and_download_best() {
        let failing = MockProvider::new("first")
            .with_candidate("1", "de", SubtitleFormat::Ass, &["series", "season", "episode"])
            .with_download_error(|| ProviderError::Transient("dead link".into()));
        let working = MockProvider::new("second")
            .with_candidate("2", "de", SubtitleFormat::Srt, &["series"])
            .with_payload(b"1\n00:00:01,000 --> 00:00:02,000\nhi\n".to_vec());
        let manager = manager_with(vec![failing, working]);
        // Early exit off so both providers contribute.
        manager.settings.set("providers.early_exit", "false").unwrap();

        let downloaded = manager
            .search_and_download_best(&query(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(downloaded.candidate.provider, "second");
        assert!(!downloaded.bytes.is_empty());
    }

    #[tokio::test]
    async fn test_save_subtitle_writes_and_records_history() {
        let dir = tempfile::TempDir::new().unwrap();
        let video = dir.path().join("E01.mkv");
        std::fs::write(&video, "video").unwrap();

        let manager = manager_with(vec![]);
        let downloaded = DownloadedSubtitle {
            candidate: SubtitleCandidate {
                provider: "a".to_string(),
                subtitle_id: "1".to_string(),
                filename: "x.srt".to_string(),
                language: "de".to_string(),
                format: SubtitleFormat::Srt,
                score: 210,
                release_info: String::new(),
                hearing_impaired: false,
                forced: false,
                matches: Default::default(),
                machine_translated: false,
                mt_confidence: 0.0,
                uploader_trust: 0.0,
                provider_data: None,
            },
            bytes: b"1\n00:00:01,000 --> 00:00:02,000\nhallo\n".to_vec(),
            format: SubtitleFormat::Srt,
        };
        let path = manager
            .save_subtitle(&downloaded, &video, "de", false)
            .unwrap();
        assert!(path.to_string_lossy().ends_with("E01.de.srt"));
        assert!(path.exists());

        let history = manager.history.list_downloads(10, 0).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].score, 210);
    }
}
