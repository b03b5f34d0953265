//! Wanted-item pipeline: the strictly ordered attempt sequence that turns a
//! wanted row into a subtitle file on disk.

mod backoff;

pub use backoff::{backoff_hours, next_retry_after, DEFAULT_BASE_HOURS, DEFAULT_CAP_HOURS};

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::integrations::{LibraryItem, LibraryManager};
use crate::providers::{should_upgrade, ProviderManager, SubtitleCandidate, VideoQuery};
use crate::store::{
    ItemKind, SettingsStore, SqliteHistoryStore, SqliteWantedStore, SubtitleKind, WantedItem,
    WantedStatus,
};
use crate::subtitles::{sidecar_path, SubtitleFormat};
use crate::translator::{build_video_query, TranslateOutcome, Translator};

static EPISODE_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[Ss](\d{1,2})[Ee](\d{1,3})").unwrap());

/// Outcome of one pipeline run over a wanted item.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Found {
        output_path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
        upgraded: bool,
    },
    Skipped {
        reason: String,
    },
    WhisperPending {
        job_id: String,
    },
    Failed {
        error: String,
    },
}

/// Per-item pipeline combining providers and the translator.
pub struct WantedPipeline {
    wanted: Arc<SqliteWantedStore>,
    providers: Arc<ProviderManager>,
    translator: Arc<Translator>,
    history: Arc<SqliteHistoryStore>,
    settings: Arc<dyn SettingsStore>,
    libraries: Vec<Arc<dyn LibraryManager>>,
}

impl WantedPipeline {
    pub fn new(
        wanted: Arc<SqliteWantedStore>,
        providers: Arc<ProviderManager>,
        translator: Arc<Translator>,
        history: Arc<SqliteHistoryStore>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            wanted,
            providers,
            translator,
            history,
            settings,
            libraries: Vec::new(),
        }
    }

    pub fn with_libraries(mut self, libraries: Vec<Arc<dyn LibraryManager>>) -> Self {
        self.libraries = libraries;
        self
    }

    fn max_attempts(&self) -> u32 {
        self.settings.get_i64("wanted.max_search_attempts", 5) as u32
    }

    fn backoff_base_hours(&self) -> i64 {
        self.settings
            .get_i64("wanted.backoff_base_hours", DEFAULT_BASE_HOURS)
    }

    fn backoff_cap_hours(&self) -> i64 {
        self.settings
            .get_i64("wanted.backoff_cap_hours", DEFAULT_CAP_HOURS)
    }

    fn skip_srt_on_no_ass(&self) -> bool {
        self.settings.get_bool("wanted.skip_srt_on_no_ass", true)
    }

    /// Build the library context a wanted row carries.
    fn item_context(item: &WantedItem) -> Option<LibraryItem> {
        let (kind, id) = match item.item_kind {
            ItemKind::Episode => (ItemKind::Episode, item.episode_id?),
            ItemKind::Movie => (ItemKind::Movie, item.movie_id?),
        };
        let (season, episode) = EPISODE_LABEL_RE
            .captures(&item.episode_label)
            .map(|caps| (caps[1].parse().ok(), caps[2].parse().ok()))
            .unwrap_or((None, None));
        Some(LibraryItem {
            kind,
            id,
            series_id: item.series_id,
            title: item.title.clone(),
            season,
            episode,
            year: None,
            file_path: item.file_path.clone(),
            imdb_id: None,
            tvdb_id: None,
            tmdb_id: None,
        })
    }

    /// Process one wanted item through the attempt sequence.
    ///
    /// `force` bypasses the backoff gate (user-initiated searches) but not
    /// the max-attempt cap.
    pub async fn process_item(&self, item_id: i64, force: bool) -> PipelineOutcome {
        let item = match self.wanted.get(item_id) {
            Ok(Some(item)) => item,
            Ok(None) => {
                return PipelineOutcome::Failed {
                    error: format!("wanted item {item_id} not found"),
                }
            }
            Err(e) => {
                return PipelineOutcome::Failed {
                    error: format!("store error: {e}"),
                }
            }
        };

        if item.status == WantedStatus::Ignored {
            return PipelineOutcome::Skipped {
                reason: "item is ignored".to_string(),
            };
        }

        // Attempt cap: refuse without contacting any provider.
        if item.search_count >= self.max_attempts() {
            let _ = self.wanted.update_status(
                item_id,
                WantedStatus::Failed,
                Some("max search attempts reached"),
            );
            return PipelineOutcome::Failed {
                error: "max search attempts reached".to_string(),
            };
        }

        if !force {
            if let Some(retry_after) = item.retry_after {
                if retry_after > chrono::Utc::now() {
                    return PipelineOutcome::Skipped {
                        reason: format!("backoff active until {}", retry_after.to_rfc3339()),
                    };
                }
            }
        }

        let video_path = Path::new(&item.file_path);
        if !video_path.exists() {
            let _ = self
                .wanted
                .update_status(item_id, WantedStatus::Failed, Some("video file missing"));
            return PipelineOutcome::Failed {
                error: "video file missing".to_string(),
            };
        }

        let _ = self
            .wanted
            .update_status(item_id, WantedStatus::Searching, None);
        let search_count = self.wanted.record_search_attempt(item_id).unwrap_or(1);

        let context = Self::item_context(&item);
        let outcome = match item.subtitle_kind {
            SubtitleKind::Forced => self.process_forced(&item, context.as_ref()).await,
            SubtitleKind::Full => self.process_full(&item, context.as_ref()).await,
        };

        self.apply_outcome(&item, context.as_ref(), search_count, &outcome);
        outcome
    }

    /// Persist the outcome on the wanted row and fire callbacks.
    fn apply_outcome(
        &self,
        item: &WantedItem,
        context: Option<&LibraryItem>,
        search_count: u32,
        outcome: &PipelineOutcome,
    ) {
        match outcome {
            PipelineOutcome::Found { output_path, .. } => {
                let _ = self
                    .wanted
                    .update_status(item.id, WantedStatus::Found, None);
                let _ = self.wanted.set_retry_after(item.id, None);
                info!(
                    "Wanted {}: found subtitle at {} after {} attempt(s)",
                    item.id, output_path, search_count
                );
                self.notify_rescan(context);
            }
            PipelineOutcome::WhisperPending { job_id } => {
                // Stays in `searching` until the Whisper worker re-enters.
                debug!("Wanted {}: whisper pending ({})", item.id, job_id);
            }
            PipelineOutcome::Skipped { reason } => {
                let _ = self
                    .wanted
                    .update_status(item.id, WantedStatus::Wanted, None);
                debug!("Wanted {}: skipped ({})", item.id, reason);
            }
            PipelineOutcome::Failed { error } => {
                if item.subtitle_kind == SubtitleKind::Forced
                    || search_count >= self.max_attempts()
                {
                    let _ = self
                        .wanted
                        .update_status(item.id, WantedStatus::Failed, Some(error));
                } else {
                    // Recoverable miss: back to wanted with adaptive backoff.
                    let _ = self
                        .wanted
                        .update_status(item.id, WantedStatus::Wanted, Some(error));
                    let retry_after = next_retry_after(
                        search_count,
                        self.backoff_base_hours(),
                        self.backoff_cap_hours(),
                    );
                    let _ = self.wanted.set_retry_after(item.id, Some(retry_after));
                    debug!(
                        "Wanted {}: miss, retry after {}",
                        item.id,
                        retry_after.to_rfc3339()
                    );
                }
            }
        }
    }

    /// Forced mode: download-only, ASS then SRT, target language then
    /// source language, never translated.
    async fn process_forced(
        &self,
        item: &WantedItem,
        context: Option<&LibraryItem>,
    ) -> PipelineOutcome {
        let video_path = Path::new(&item.file_path);
        let profile = self.translator_profile(context);
        let language_order = vec![
            vec![item.target_language.clone()],
            vec![profile.0.clone()],
        ];

        for format in [SubtitleFormat::Ass, SubtitleFormat::Srt] {
            for languages in &language_order {
                let mut query =
                    build_video_query(video_path, context, languages.clone());
                query.forced_only = true;
                let candidates = self.providers.search(&query, Some(format), None).await;
                for candidate in &candidates {
                    match self.providers.download(candidate).await {
                        Ok(downloaded) => {
                            match self.providers.save_subtitle(
                                &downloaded,
                                video_path,
                                &item.target_language,
                                true,
                            ) {
                                Ok(output) => {
                                    return PipelineOutcome::Found {
                                        output_path: output.to_string_lossy().to_string(),
                                        provider: Some(candidate.provider.clone()),
                                        upgraded: false,
                                    }
                                }
                                Err(e) => warn!("Forced save failed: {e}"),
                            }
                        }
                        Err(e) => debug!("Forced download failed: {e}"),
                    }
                }
            }
        }
        PipelineOutcome::Failed {
            error: "no forced subtitle found".to_string(),
        }
    }

    fn translator_profile(&self, context: Option<&LibraryItem>) -> (String, Vec<String>) {
        // (source language, fallback chain) for query building.
        let profile = self.translator.resolve_profile(context);
        (profile.source_language, profile.fallback_chain)
    }

    /// Full mode: the five-step attempt sequence.
    async fn process_full(
        &self,
        item: &WantedItem,
        context: Option<&LibraryItem>,
    ) -> PipelineOutcome {
        let video_path = Path::new(&item.file_path);
        let target = item.target_language.clone();
        let (source, _) = self.translator_profile(context);
        let mut ass_seen = false;

        // Step 1: direct target-language ASS.
        let query = build_video_query(video_path, context, vec![target.clone()]);
        let candidates = self
            .providers
            .search(&query, Some(SubtitleFormat::Ass), None)
            .await;
        ass_seen |= !candidates.is_empty();
        for candidate in &candidates {
            let downloaded = match self.providers.download(candidate).await {
                Ok(d) => d,
                Err(e) => {
                    debug!("Step 1 download failed: {e}");
                    continue;
                }
            };
            if item.upgrade_candidate {
                if let Some(reject_reason) = self.upgrade_rejected(item, candidate) {
                    return PipelineOutcome::Skipped {
                        reason: reject_reason,
                    };
                }
            }
            match self
                .providers
                .save_subtitle(&downloaded, video_path, &target, false)
            {
                Ok(output) => {
                    if item.upgrade_candidate {
                        self.finish_upgrade(item, candidate, video_path, &target);
                    }
                    return PipelineOutcome::Found {
                        output_path: output.to_string_lossy().to_string(),
                        provider: Some(candidate.provider.clone()),
                        upgraded: item.upgrade_candidate,
                    };
                }
                Err(e) => warn!("Step 1 save failed: {e}"),
            }
        }

        // Step 2: source-language ASS, translated.
        let query = build_video_query(video_path, context, vec![source.clone()]);
        let candidates = self
            .providers
            .search(&query, Some(SubtitleFormat::Ass), None)
            .await;
        ass_seen |= !candidates.is_empty();
        for candidate in &candidates {
            let downloaded = match self.providers.download(candidate).await {
                Ok(d) => d,
                Err(e) => {
                    debug!("Step 2 download failed: {e}");
                    continue;
                }
            };
            let content = String::from_utf8_lossy(&downloaded.bytes).to_string();
            // Record provenance for the source download before translating.
            match self
                .translator
                .translate_downloaded(&content, SubtitleFormat::Ass, video_path, &target, context)
                .await
            {
                TranslateOutcome::Success { output_path, .. } => {
                    self.record_source_download(candidate, &output_path);
                    return PipelineOutcome::Found {
                        output_path,
                        provider: Some(candidate.provider.clone()),
                        upgraded: false,
                    };
                }
                other => debug!("Step 2 translation did not produce a file: {other:?}"),
            }
        }

        // Optimization: plainly no ASS for this title anywhere.
        let skip_srt = self.skip_srt_on_no_ass() && !ass_seen;
        if !skip_srt {
            // Step 3: direct target-language SRT.
            let query = build_video_query(video_path, context, vec![target.clone()]);
            if let Ok(Some(downloaded)) = self
                .providers
                .search_and_download_best(&query, Some(SubtitleFormat::Srt))
                .await
            {
                match self
                    .providers
                    .save_subtitle(&downloaded, video_path, &target, false)
                {
                    Ok(output) => {
                        return PipelineOutcome::Found {
                            output_path: output.to_string_lossy().to_string(),
                            provider: Some(downloaded.candidate.provider.clone()),
                            upgraded: false,
                        }
                    }
                    Err(e) => warn!("Step 3 save failed: {e}"),
                }
            }

            // Step 4: source-language SRT, translated.
            let query = build_video_query(video_path, context, vec![source.clone()]);
            if let Ok(Some(downloaded)) = self
                .providers
                .search_and_download_best(&query, Some(SubtitleFormat::Srt))
                .await
            {
                let content = String::from_utf8_lossy(&downloaded.bytes).to_string();
                if let TranslateOutcome::Success { output_path, .. } = self
                    .translator
                    .translate_downloaded(
                        &content,
                        SubtitleFormat::Srt,
                        video_path,
                        &target,
                        context,
                    )
                    .await
                {
                    self.record_source_download(&downloaded.candidate, &output_path);
                    return PipelineOutcome::Found {
                        output_path,
                        provider: Some(downloaded.candidate.provider.clone()),
                        upgraded: false,
                    };
                }
            }
        } else {
            debug!("Wanted {}: no ASS anywhere, skipping SRT steps", item.id);
        }

        // Step 5: the translator waterfall handles embedded streams and
        // Whisper.
        match self
            .translator
            .translate_file(video_path, &target, context)
            .await
        {
            TranslateOutcome::Success { output_path, .. } => PipelineOutcome::Found {
                output_path,
                provider: None,
                upgraded: false,
            },
            TranslateOutcome::Skipped {
                output_path: Some(path),
                ..
            } => PipelineOutcome::Found {
                output_path: path,
                provider: None,
                upgraded: false,
            },
            TranslateOutcome::Skipped { reason, .. } => PipelineOutcome::Skipped { reason },
            TranslateOutcome::WhisperPending { job_id } => {
                PipelineOutcome::WhisperPending { job_id }
            }
            TranslateOutcome::Failed { error } => PipelineOutcome::Failed { error },
        }
    }

    /// Upgrade gate for step 1. Returns a rejection reason, or `None` to
    /// proceed.
    fn upgrade_rejected(&self, item: &WantedItem, candidate: &SubtitleCandidate) -> Option<String> {
        let current_score = item.current_score.unwrap_or(0);
        if current_score <= 0 {
            return None;
        }
        let video_path = Path::new(&item.file_path);
        let existing = sidecar_path(
            video_path,
            &item.target_language,
            false,
            SubtitleFormat::Srt,
        );
        let prefer_ass = self.settings.get_bool("upgrade.prefer_ass", true);
        let min_delta = self.settings.get_i64("upgrade.min_score_delta", 0) as i32;
        let window_days = self.settings.get_i64("upgrade.window_days", 7) as u32;
        let (do_upgrade, reason) = should_upgrade(
            item.existing_sub.format(),
            current_score,
            candidate.format,
            candidate.score,
            prefer_ass,
            min_delta,
            window_days,
            existing.exists().then_some(existing.as_path()),
        );
        if do_upgrade {
            info!("Wanted {}: upgrade approved ({})", item.id, reason);
            None
        } else {
            info!("Wanted {}: upgrade rejected ({})", item.id, reason);
            Some(reason)
        }
    }

    /// Remove the replaced SRT and record upgrade history.
    fn finish_upgrade(
        &self,
        item: &WantedItem,
        candidate: &SubtitleCandidate,
        video_path: &Path,
        target: &str,
    ) {
        let old_srt = sidecar_path(video_path, target, false, SubtitleFormat::Srt);
        if old_srt.exists() {
            if let Err(e) = std::fs::remove_file(&old_srt) {
                warn!("Failed to remove old SRT {:?}: {e}", old_srt);
            }
        }
        if let Err(e) = self.history.record_upgrade(
            &item.file_path,
            "srt",
            item.current_score.unwrap_or(0),
            candidate.format.extension(),
            candidate.score,
            &format!("SRT->ASS via {}", candidate.provider),
        ) {
            warn!("Failed to record upgrade history: {e}");
        }
    }

    fn record_source_download(&self, candidate: &SubtitleCandidate, output_path: &str) {
        if let Err(e) = self.history.record_download(
            &candidate.provider,
            &candidate.subtitle_id,
            &candidate.language,
            candidate.format.extension(),
            output_path,
            candidate.score,
        ) {
            warn!("Failed to record download history: {e}");
        }
    }

    /// Interactive search: scored candidates without downloading.
    pub async fn search_candidates(&self, item_id: i64) -> Result<Vec<SubtitleCandidate>, String> {
        let item = self
            .wanted
            .get(item_id)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("wanted item {item_id} not found"))?;
        let context = Self::item_context(&item);
        let (source, _) = self.translator_profile(context.as_ref());
        let mut query = build_video_query(
            Path::new(&item.file_path),
            context.as_ref(),
            vec![item.target_language.clone(), source],
        );
        query.forced_only = item.subtitle_kind == SubtitleKind::Forced;
        Ok(self.providers.search(&query, None, None).await)
    }

    /// Interactive download of one chosen candidate; source-language picks
    /// are translated.
    pub async fn download_specific(
        &self,
        item_id: i64,
        candidate: &SubtitleCandidate,
    ) -> PipelineOutcome {
        let item = match self.wanted.get(item_id) {
            Ok(Some(item)) => item,
            _ => {
                return PipelineOutcome::Failed {
                    error: format!("wanted item {item_id} not found"),
                }
            }
        };
        let context = Self::item_context(&item);
        let video_path = Path::new(&item.file_path);
        let forced = item.subtitle_kind == SubtitleKind::Forced;

        let downloaded = match self.providers.download(candidate).await {
            Ok(d) => d,
            Err(e) => {
                return PipelineOutcome::Failed {
                    error: format!("download failed: {e}"),
                }
            }
        };

        let outcome = if candidate
            .language
            .eq_ignore_ascii_case(&item.target_language)
            || forced
        {
            match self
                .providers
                .save_subtitle(&downloaded, video_path, &item.target_language, forced)
            {
                Ok(output) => PipelineOutcome::Found {
                    output_path: output.to_string_lossy().to_string(),
                    provider: Some(candidate.provider.clone()),
                    upgraded: false,
                },
                Err(e) => PipelineOutcome::Failed {
                    error: format!("save failed: {e}"),
                },
            }
        } else {
            let content = String::from_utf8_lossy(&downloaded.bytes).to_string();
            match self
                .translator
                .translate_downloaded(
                    &content,
                    downloaded.format,
                    video_path,
                    &item.target_language,
                    context.as_ref(),
                )
                .await
            {
                TranslateOutcome::Success { output_path, .. } => {
                    self.record_source_download(candidate, &output_path);
                    PipelineOutcome::Found {
                        output_path,
                        provider: Some(candidate.provider.clone()),
                        upgraded: false,
                    }
                }
                TranslateOutcome::Failed { error } => PipelineOutcome::Failed { error },
                other => PipelineOutcome::Skipped {
                    reason: format!("{other:?}"),
                },
            }
        };

        if matches!(outcome, PipelineOutcome::Found { .. }) {
            let _ = self
                .wanted
                .update_status(item_id, WantedStatus::Found, None);
            self.notify_rescan(context.as_ref());
        }
        outcome
    }

    /// Fire rescan callbacks; failures never propagate.
    fn notify_rescan(&self, context: Option<&LibraryItem>) {
        let Some(item) = context.cloned() else {
            return;
        };
        for library in &self.libraries {
            if !library.handles(item.kind) {
                continue;
            }
            let library = Arc::clone(library);
            let item = item.clone();
            tokio::spawn(async move {
                if let Err(e) = library.notify_rescan(&item).await {
                    warn!("Rescan notification to {} failed: {e}", library.name());
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderRegistry;
    use crate::store::{
        ExistingSub, SqliteJobStore, SqliteProviderStore, SqliteSettingsStore,
        SqliteTranslationStore, WantedUpsert,
    };
    use crate::testing::MockProvider;
    use crate::translation::TranslationManager;
    use tempfile::TempDir;

    const ASS_PAYLOAD: &[u8] = b"[Script Info]\nTitle: DL\n\n[V4+ Styles]\nFormat: Name, Fontname, Fontsize\nStyle: Default,Arial,48\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\nDialogue: 0,0:00:01.00,0:00:02.00,Default,,0,0,0,,Hallo\n";

    struct Fixture {
        dir: TempDir,
        video: std::path::PathBuf,
        pipeline: WantedPipeline,
        wanted: Arc<SqliteWantedStore>,
        history: Arc<SqliteHistoryStore>,
        settings: Arc<SqliteSettingsStore>,
    }

    fn fixture(providers: Vec<MockProvider>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("Show.S01E02.mkv");
        std::fs::write(&video, "video").unwrap();

        let settings = Arc::new(SqliteSettingsStore::in_memory().unwrap());
        let settings_dyn: Arc<dyn SettingsStore> = Arc::clone(&settings) as _;
        let provider_store = Arc::new(SqliteProviderStore::in_memory().unwrap());
        let mut registry = ProviderRegistry::new(provider_store, Arc::clone(&settings_dyn));
        for provider in providers {
            registry.register(Arc::new(provider));
        }
        let history = Arc::new(SqliteHistoryStore::in_memory().unwrap());
        let manager = Arc::new(ProviderManager::new(
            Arc::new(registry),
            Arc::clone(&history),
            Arc::clone(&settings_dyn),
        ));
        let translation = Arc::new(TranslationManager::new(
            Arc::new(SqliteTranslationStore::in_memory().unwrap()),
            Arc::clone(&settings_dyn),
        ));
        let translator = Arc::new(Translator::new(
            Arc::clone(&manager),
            translation,
            Arc::new(SqliteJobStore::in_memory().unwrap()),
            Arc::clone(&history),
            Arc::clone(&settings_dyn),
        ));
        let wanted = Arc::new(SqliteWantedStore::in_memory().unwrap());
        let pipeline = WantedPipeline::new(
            Arc::clone(&wanted),
            manager,
            translator,
            Arc::clone(&history),
            settings_dyn,
        );
        Fixture {
            dir,
            video,
            pipeline,
            wanted,
            history,
            settings,
        }
    }

    fn upsert_item(fixture: &Fixture) -> WantedItem {
        fixture
            .wanted
            .upsert(&WantedUpsert {
                item_kind: ItemKind::Episode,
                title: "Show".to_string(),
                episode_label: "S01E02".to_string(),
                series_id: Some(3),
                episode_id: Some(30),
                movie_id: None,
                file_path: fixture.video.to_string_lossy().to_string(),
                target_language: "de".to_string(),
                subtitle_kind: SubtitleKind::Full,
                existing_sub: ExistingSub::None,
                upgrade_candidate: false,
                current_score: None,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_direct_target_ass_found() {
        let provider = MockProvider::new("ace")
            .with_candidate("s1", "de", SubtitleFormat::Ass, &["series", "season", "episode"])
            .with_payload(ASS_PAYLOAD.to_vec());
        let fixture = fixture(vec![provider]);
        let item = upsert_item(&fixture);

        let outcome = fixture.pipeline.process_item(item.id, false).await;
        match &outcome {
            PipelineOutcome::Found {
                output_path,
                provider,
                upgraded,
            } => {
                assert!(output_path.ends_with("Show.S01E02.de.ass"));
                assert!(std::path::Path::new(output_path).exists());
                assert_eq!(provider.as_deref(), Some("ace"));
                assert!(!upgraded);
            }
            other => panic!("expected found, got {other:?}"),
        }

        let after = fixture.wanted.get(item.id).unwrap().unwrap();
        assert_eq!(after.status, WantedStatus::Found);
        assert_eq!(after.search_count, 1);

        // Provenance recorded.
        let downloads = fixture.history.list_downloads(10, 0).unwrap();
        assert_eq!(downloads.len(), 1);
        assert_eq!(downloads[0].provider, "ace");
    }

    #[tokio::test]
    async fn test_refuses_past_max_attempts_without_contact() {
        let provider = MockProvider::new("ace")
            .with_candidate("s1", "de", SubtitleFormat::Ass, &["series"]);
        let fixture = fixture(vec![provider]);
        fixture
            .settings
            .set("wanted.max_search_attempts", "2")
            .unwrap();
        let item = upsert_item(&fixture);
        fixture.wanted.record_search_attempt(item.id).unwrap();
        fixture.wanted.record_search_attempt(item.id).unwrap();

        let outcome = fixture.pipeline.process_item(item.id, false).await;
        assert!(matches!(outcome, PipelineOutcome::Failed { .. }));

        let after = fixture.wanted.get(item.id).unwrap().unwrap();
        assert_eq!(after.status, WantedStatus::Failed);
        // The cap refusal never reached the provider.
        assert_eq!(
            fixture
                .pipeline
                .providers
                .registry()
                .stats("ace")
                .unwrap()
                .total_searches,
            0
        );
    }

    #[tokio::test]
    async fn test_miss_sets_adaptive_backoff() {
        let fixture = fixture(vec![]);
        let item = upsert_item(&fixture);

        let outcome = fixture.pipeline.process_item(item.id, false).await;
        assert!(matches!(outcome, PipelineOutcome::Failed { .. }));

        let after = fixture.wanted.get(item.id).unwrap().unwrap();
        assert_eq!(after.status, WantedStatus::Wanted);
        let retry_after = after.retry_after.expect("backoff set");
        let delta = retry_after - chrono::Utc::now();
        // First miss: one hour.
        assert!(delta > chrono::Duration::minutes(55));
        assert!(delta <= chrono::Duration::minutes(61));
    }

    #[tokio::test]
    async fn test_backoff_gate_skips_until_due() {
        let fixture = fixture(vec![]);
        let item = upsert_item(&fixture);
        fixture
            .wanted
            .set_retry_after(item.id, Some(chrono::Utc::now() + chrono::Duration::hours(2)))
            .unwrap();

        let outcome = fixture.pipeline.process_item(item.id, false).await;
        assert!(matches!(outcome, PipelineOutcome::Skipped { .. }));

        // Forced search ignores the gate.
        let outcome = fixture.pipeline.process_item(item.id, true).await;
        assert!(matches!(outcome, PipelineOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_ignored_item_untouched() {
        let fixture = fixture(vec![]);
        let item = upsert_item(&fixture);
        fixture
            .wanted
            .update_status(item.id, WantedStatus::Ignored, None)
            .unwrap();

        let outcome = fixture.pipeline.process_item(item.id, false).await;
        assert!(matches!(outcome, PipelineOutcome::Skipped { .. }));
        let after = fixture.wanted.get(item.id).unwrap().unwrap();
        assert_eq!(after.status, WantedStatus::Ignored);
        assert_eq!(after.search_count, 0);
    }

    #[tokio::test]
    async fn test_missing_video_fails() {
        let fixture = fixture(vec![]);
        let item = upsert_item(&fixture);
        std::fs::remove_file(&fixture.video).unwrap();

        let outcome = fixture.pipeline.process_item(item.id, false).await;
        match outcome {
            PipelineOutcome::Failed { error } => assert!(error.contains("missing")),
            other => panic!("expected failure, got {other:?}"),
        }
        let after = fixture.wanted.get(item.id).unwrap().unwrap();
        assert_eq!(after.status, WantedStatus::Failed);
    }

    #[tokio::test]
    async fn test_forced_mode_saves_forced_sidecar() {
        let provider = MockProvider::new("ace")
            .with_candidate("f1", "de", SubtitleFormat::Srt, &["series", "season", "episode"])
            .map_last_candidate(|c| c.forced = true)
            .with_payload(b"1\n00:00:01,000 --> 00:00:02,000\nNur hier\n".to_vec());
        let fixture = fixture(vec![provider]);
        let mut upsert = WantedUpsert {
            item_kind: ItemKind::Episode,
            title: "Show".to_string(),
            episode_label: "S01E02".to_string(),
            series_id: Some(3),
            episode_id: Some(30),
            movie_id: None,
            file_path: fixture.video.to_string_lossy().to_string(),
            target_language: "de".to_string(),
            subtitle_kind: SubtitleKind::Forced,
            existing_sub: ExistingSub::None,
            upgrade_candidate: false,
            current_score: None,
        };
        upsert.subtitle_kind = SubtitleKind::Forced;
        let item = fixture.wanted.upsert(&upsert).unwrap();

        let outcome = fixture.pipeline.process_item(item.id, false).await;
        match &outcome {
            PipelineOutcome::Found { output_path, .. } => {
                assert!(output_path.contains(".forced."));
                assert!(std::path::Path::new(output_path).exists());
            }
            other => panic!("expected found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_forced_mode_failure_is_terminal() {
        let fixture = fixture(vec![]);
        let mut upsert = WantedUpsert {
            item_kind: ItemKind::Episode,
            title: "Show".to_string(),
            episode_label: "S01E02".to_string(),
            series_id: Some(3),
            episode_id: Some(30),
            movie_id: None,
            file_path: fixture.video.to_string_lossy().to_string(),
            target_language: "de".to_string(),
            subtitle_kind: SubtitleKind::Forced,
            existing_sub: ExistingSub::None,
            upgrade_candidate: false,
            current_score: None,
        };
        upsert.subtitle_kind = SubtitleKind::Forced;
        let item = fixture.wanted.upsert(&upsert).unwrap();

        let outcome = fixture.pipeline.process_item(item.id, false).await;
        assert!(matches!(outcome, PipelineOutcome::Failed { .. }));
        let after = fixture.wanted.get(item.id).unwrap().unwrap();
        assert_eq!(after.status, WantedStatus::Failed);
    }

    #[tokio::test]
    async fn test_upgrade_rejection_skips() {
        let provider = MockProvider::new("ace")
            // Low-score ASS candidate (series only).
            .with_candidate("s1", "de", SubtitleFormat::Ass, &["series"])
            .with_payload(ASS_PAYLOAD.to_vec());
        let fixture = fixture(vec![provider]);
        // Disable the format-upgrade path so the score delta decides.
        fixture.settings.set("upgrade.prefer_ass", "false").unwrap();
        fixture.settings.set("upgrade.min_score_delta", "100").unwrap();

        let existing_srt = fixture.dir.path().join("Show.S01E02.de.srt");
        std::fs::write(&existing_srt, "1\n00:00:01,000 --> 00:00:02,000\nalt\n").unwrap();

        let mut upsert = WantedUpsert {
            item_kind: ItemKind::Episode,
            title: "Show".to_string(),
            episode_label: "S01E02".to_string(),
            series_id: Some(3),
            episode_id: Some(30),
            movie_id: None,
            file_path: fixture.video.to_string_lossy().to_string(),
            target_language: "de".to_string(),
            subtitle_kind: SubtitleKind::Full,
            existing_sub: ExistingSub::Srt,
            upgrade_candidate: true,
            current_score: Some(290),
        };
        upsert.upgrade_candidate = true;
        let item = fixture.wanted.upsert(&upsert).unwrap();

        let outcome = fixture.pipeline.process_item(item.id, false).await;
        assert!(matches!(outcome, PipelineOutcome::Skipped { .. }));
        assert!(existing_srt.exists(), "existing SRT must survive rejection");
        let after = fixture.wanted.get(item.id).unwrap().unwrap();
        assert_eq!(after.status, WantedStatus::Wanted);
    }

    #[tokio::test]
    async fn test_upgrade_approved_replaces_srt_and_records_history() {
        let provider = MockProvider::new("ace")
            .with_candidate("s1", "de", SubtitleFormat::Ass, &["series", "season", "episode"])
            .with_payload(ASS_PAYLOAD.to_vec());
        let fixture = fixture(vec![provider]);

        let existing_srt = fixture.dir.path().join("Show.S01E02.de.srt");
        std::fs::write(&existing_srt, "1\n00:00:01,000 --> 00:00:02,000\nalt\n").unwrap();

        let mut upsert = WantedUpsert {
            item_kind: ItemKind::Episode,
            title: "Show".to_string(),
            episode_label: "S01E02".to_string(),
            series_id: Some(3),
            episode_id: Some(30),
            movie_id: None,
            file_path: fixture.video.to_string_lossy().to_string(),
            target_language: "de".to_string(),
            subtitle_kind: SubtitleKind::Full,
            existing_sub: ExistingSub::Srt,
            upgrade_candidate: true,
            current_score: Some(120),
        };
        upsert.upgrade_candidate = true;
        let item = fixture.wanted.upsert(&upsert).unwrap();

        let outcome = fixture.pipeline.process_item(item.id, false).await;
        match &outcome {
            PipelineOutcome::Found { upgraded, .. } => assert!(upgraded),
            other => panic!("expected found, got {other:?}"),
        }
        assert!(!existing_srt.exists(), "old SRT removed on upgrade");
        let upgrades = fixture.history.list_upgrades(10, 0).unwrap();
        assert_eq!(upgrades.len(), 1);
        assert!(upgrades[0].reason.contains("via ace"));
    }

    #[tokio::test]
    async fn test_search_candidates_interactive() {
        let provider = MockProvider::new("ace")
            .with_candidate("s1", "de", SubtitleFormat::Ass, &["series", "season", "episode"]);
        let fixture = fixture(vec![provider]);
        let item = upsert_item(&fixture);

        let candidates = fixture.pipeline.search_candidates(item.id).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].score >= 400);
        // No download happened; the wanted row is untouched.
        let after = fixture.wanted.get(item.id).unwrap().unwrap();
        assert_eq!(after.status, WantedStatus::Wanted);
    }
}
