//! Library scanner and scheduler.
//!
//! Two independent periodic loops, each guarded by a non-blocking lock so
//! overlapping runs no-op: the scan loop reconciles wanted rows with the
//! library, the search loop feeds due rows through the pipeline.

mod webhook;

pub use webhook::WebhookOutcome;

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::integrations::{LibraryItem, LibraryManager};
use crate::pipeline::{PipelineOutcome, WantedPipeline};
use crate::store::{
    ExistingSub, ForcedPreference, ItemKind, SettingsStore, SqliteHistoryStore,
    SqliteTranslationStore, SqliteWantedStore, SqliteWatchedFolderStore, SubtitleKind,
    WantedUpsert,
};
use crate::subtitles::{detect_existing_target, SubtitleFormat};

/// Video extensions the watched-folder source recognizes.
const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "m4v", "webm"];

/// Events emitted by the scanner for the WebSocket layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScannerEvent {
    WantedScanCompleted { summary: ScanSummary },
    WantedSearchProgress { item_id: i64, status: String },
    ScanComplete { items_seen: usize },
    WebhookReceived { manager: String },
    WebhookCompleted { manager: String, new_items: usize },
}

/// Sink for scanner events; the server forwards them to WebSocket clients.
pub type EventSink = Arc<dyn Fn(ScannerEvent) + Send + Sync>;

/// Result of one scan pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    pub items_seen: usize,
    pub wanted_added: usize,
    pub wanted_updated: usize,
    pub upgrades_flagged: usize,
    pub removed: usize,
    pub sources_failed: usize,
}

/// Result of one search pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchSummary {
    pub processed: usize,
    pub found: usize,
    pub failed: usize,
}

/// The scanner/scheduler.
pub struct Scanner {
    wanted: Arc<SqliteWantedStore>,
    translation_store: Arc<SqliteTranslationStore>,
    watched: Arc<SqliteWatchedFolderStore>,
    history: Arc<SqliteHistoryStore>,
    pipeline: Arc<WantedPipeline>,
    libraries: Vec<Arc<dyn LibraryManager>>,
    settings: Arc<dyn SettingsStore>,
    events: Option<EventSink>,

    scanning: AtomicBool,
    searching: AtomicBool,
    last_scan_at: Mutex<Option<DateTime<Utc>>>,
    last_search_at: Mutex<Option<DateTime<Utc>>>,
    last_summary: Mutex<Option<ScanSummary>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Scanner {
    pub fn new(
        wanted: Arc<SqliteWantedStore>,
        translation_store: Arc<SqliteTranslationStore>,
        watched: Arc<SqliteWatchedFolderStore>,
        history: Arc<SqliteHistoryStore>,
        pipeline: Arc<WantedPipeline>,
        libraries: Vec<Arc<dyn LibraryManager>>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            wanted,
            translation_store,
            watched,
            history,
            pipeline,
            libraries,
            settings,
            events: None,
            scanning: AtomicBool::new(false),
            searching: AtomicBool::new(false),
            last_scan_at: Mutex::new(None),
            last_search_at: Mutex::new(None),
            last_summary: Mutex::new(None),
            shutdown_tx,
        }
    }

    pub fn with_events(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    fn emit(&self, event: ScannerEvent) {
        if let Some(sink) = &self.events {
            sink(event);
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Relaxed)
    }

    pub fn is_searching(&self) -> bool {
        self.searching.load(Ordering::Relaxed)
    }

    pub fn last_scan_at(&self) -> Option<DateTime<Utc>> {
        *self.last_scan_at.lock().unwrap()
    }

    pub fn last_summary(&self) -> Option<ScanSummary> {
        self.last_summary.lock().unwrap().clone()
    }

    // ------------------------------------------------------------------
    // Scan pass
    // ------------------------------------------------------------------

    /// Enumerate every library source and reconcile wanted rows.
    ///
    /// Returns `None` when a scan is already in flight.
    pub async fn scan_all(&self) -> Option<ScanSummary> {
        if self.scanning.swap(true, Ordering::SeqCst) {
            debug!("Scan already running, refusing overlap");
            return None;
        }
        let result = self.scan_all_inner().await;
        self.scanning.store(false, Ordering::SeqCst);
        *self.last_scan_at.lock().unwrap() = Some(Utc::now());
        *self.last_summary.lock().unwrap() = Some(result.clone());
        self.emit(ScannerEvent::WantedScanCompleted {
            summary: result.clone(),
        });
        self.emit(ScannerEvent::ScanComplete {
            items_seen: result.items_seen,
        });
        Some(result)
    }

    async fn scan_all_inner(&self) -> ScanSummary {
        let mut summary = ScanSummary::default();
        let mut scanned_paths: HashSet<String> = HashSet::new();
        let mut all_sources_ok = true;

        for library in &self.libraries {
            match library.list_items().await {
                Ok(items) => {
                    for item in items {
                        scanned_paths.insert(item.file_path.clone());
                        self.reconcile_item(&item, &mut summary);
                    }
                }
                Err(e) => {
                    warn!("Library {} enumeration failed: {e}", library.name());
                    summary.sources_failed += 1;
                    all_sources_ok = false;
                }
            }
        }

        for item in self.enumerate_watched_folders() {
            scanned_paths.insert(item.file_path.clone());
            self.reconcile_item(&item, &mut summary);
        }

        summary.items_seen = scanned_paths.len();
        summary.removed = self.cleanup(&scanned_paths, all_sources_ok);
        info!(
            "Scan complete: {} item(s), {} added, {} removed",
            summary.items_seen, summary.wanted_added, summary.removed
        );
        summary
    }

    /// Watched folders (standalone mode): walk for video files and derive
    /// metadata from filenames.
    fn enumerate_watched_folders(&self) -> Vec<LibraryItem> {
        let folders = match self.watched.list_enabled() {
            Ok(folders) => folders,
            Err(e) => {
                warn!("Cannot list watched folders: {e}");
                return Vec::new();
            }
        };
        let mut items = Vec::new();
        for folder in folders {
            for entry in walkdir::WalkDir::new(&folder.path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path();
                let ext = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_ascii_lowercase())
                    .unwrap_or_default();
                if !VIDEO_EXTENSIONS.contains(&ext.as_str()) {
                    continue;
                }
                let parsed = crate::providers::parse_filename(path);
                let is_episode = parsed.season.is_some() || parsed.absolute_episode.is_some();
                items.push(LibraryItem {
                    kind: if is_episode {
                        ItemKind::Episode
                    } else {
                        ItemKind::Movie
                    },
                    id: 0,
                    series_id: None,
                    title: if is_episode {
                        parsed.series_title
                    } else {
                        parsed.title
                    },
                    season: parsed.season,
                    episode: parsed.episode,
                    year: parsed.year,
                    file_path: path.to_string_lossy().to_string(),
                    imdb_id: None,
                    tvdb_id: None,
                    tmdb_id: None,
                });
            }
        }
        items
    }

    /// Upsert wanted rows for one library item across its profile's target
    /// languages.
    fn reconcile_item(&self, item: &LibraryItem, summary: &mut ScanSummary) {
        let video = Path::new(&item.file_path);
        if !video.exists() {
            return;
        }
        let (profile_kind, profile_id) = match item.kind {
            ItemKind::Episode => ("series", item.series_id),
            ItemKind::Movie => ("movie", Some(item.id)),
        };
        let profile = self
            .translation_store
            .effective_profile(profile_kind, profile_id)
            .ok()
            .flatten();
        let (targets, forced_pref) = match &profile {
            Some(p) => (p.target_languages.clone(), p.forced_preference),
            None => (
                vec![self
                    .settings
                    .get_string("translation.target_language", "de")],
                ForcedPreference::Disabled,
            ),
        };
        let upgrade_detection = self.settings.get_bool("upgrade.detect", true);

        for target in &targets {
            match detect_existing_target(video, target, false) {
                Some(existing) if existing.format == SubtitleFormat::Ass => {
                    // Satisfied; cleanup drops any stale row.
                }
                Some(existing) => {
                    if upgrade_detection {
                        let current_score = self.score_of(&existing.path);
                        self.upsert_wanted(
                            item,
                            target,
                            SubtitleKind::Full,
                            ExistingSub::Srt,
                            true,
                            current_score,
                            summary,
                        );
                        summary.upgrades_flagged += 1;
                    }
                }
                None => {
                    self.upsert_wanted(
                        item,
                        target,
                        SubtitleKind::Full,
                        ExistingSub::None,
                        false,
                        None,
                        summary,
                    );
                }
            }

            if forced_pref != ForcedPreference::Disabled
                && detect_existing_target(video, target, true).is_none()
            {
                self.upsert_wanted(
                    item,
                    target,
                    SubtitleKind::Forced,
                    ExistingSub::None,
                    false,
                    None,
                    summary,
                );
            }
        }
    }

    /// Last recorded download score for an existing subtitle file.
    fn score_of(&self, subtitle_path: &Path) -> Option<i32> {
        self.history
            .downloads_for_path(&subtitle_path.to_string_lossy())
            .ok()
            .and_then(|downloads| downloads.first().map(|d| d.score))
    }

    #[allow(clippy::too_many_arguments)]
    fn upsert_wanted(
        &self,
        item: &LibraryItem,
        target: &str,
        kind: SubtitleKind,
        existing: ExistingSub,
        upgrade_candidate: bool,
        current_score: Option<i32>,
        summary: &mut ScanSummary,
    ) {
        let upsert = WantedUpsert {
            item_kind: item.kind,
            title: item.title.clone(),
            episode_label: item.episode_label(),
            series_id: item.series_id,
            episode_id: (item.kind == ItemKind::Episode && item.id != 0).then_some(item.id),
            movie_id: (item.kind == ItemKind::Movie && item.id != 0).then_some(item.id),
            file_path: item.file_path.clone(),
            target_language: target.to_string(),
            subtitle_kind: kind,
            existing_sub: existing,
            upgrade_candidate,
            current_score,
        };
        let already = self
            .wanted
            .get_by_tuple(&item.file_path, target, kind)
            .ok()
            .flatten()
            .is_some();
        match self.wanted.upsert(&upsert) {
            Ok(_) => {
                if already {
                    summary.wanted_updated += 1;
                } else {
                    summary.wanted_added += 1;
                }
            }
            Err(e) => warn!("Wanted upsert failed for {}: {e}", item.file_path),
        }
    }

    /// Remove rows whose video vanished, whose target ASS appeared, or
    /// whose owning library entry is gone.
    fn cleanup(&self, scanned_paths: &HashSet<String>, all_sources_ok: bool) -> usize {
        let mut removed = 0;
        let paths = match self.wanted.all_file_paths() {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Cleanup cannot list wanted paths: {e}");
                return 0;
            }
        };
        for path in paths {
            let video = Path::new(&path);
            if !video.exists() {
                removed += self.wanted.delete_by_path(&path).unwrap_or(0);
                continue;
            }
            // Only purge unlisted items when every source enumerated; a
            // failed Sonarr poll must not wipe its whole backlog.
            if all_sources_ok && !scanned_paths.contains(&path) {
                removed += self.wanted.delete_by_path(&path).unwrap_or(0);
                continue;
            }
            // Per-tuple: a target ASS landing on disk satisfies the row.
            if let Ok(items) = self.wanted.list(&crate::store::WantedFilter {
                limit: 1000,
                ..Default::default()
            }) {
                for item in items.iter().filter(|i| i.file_path == path) {
                    let forced = item.subtitle_kind == SubtitleKind::Forced;
                    if let Some(existing) =
                        detect_existing_target(video, &item.target_language, forced)
                    {
                        if existing.format == SubtitleFormat::Ass {
                            if self.wanted.delete(item.id).unwrap_or(false) {
                                removed += 1;
                            }
                        }
                    }
                }
            }
        }
        removed
    }

    // ------------------------------------------------------------------
    // Search pass
    // ------------------------------------------------------------------

    /// Feed due wanted items through the pipeline with bounded parallelism.
    ///
    /// Returns `None` when a pass is already in flight.
    pub async fn search_pass(&self) -> Option<SearchSummary> {
        if self.searching.swap(true, Ordering::SeqCst) {
            debug!("Search pass already running, refusing overlap");
            return None;
        }
        let result = self.search_pass_inner().await;
        self.searching.store(false, Ordering::SeqCst);
        *self.last_search_at.lock().unwrap() = Some(Utc::now());
        Some(result)
    }

    async fn search_pass_inner(&self) -> SearchSummary {
        let max_attempts = self.settings.get_i64("wanted.max_search_attempts", 5) as u32;
        let max_items = self.settings.get_i64("wanted.max_items_per_run", 20);
        let pause_ms = self.settings.get_i64("wanted.search_pause_ms", 500) as u64;

        let due = match self.wanted.due_for_search(
            max_attempts,
            chrono::Duration::hours(1),
            max_items,
        ) {
            Ok(due) => due,
            Err(e) => {
                warn!("Search pass cannot select due items: {e}");
                return SearchSummary::default();
            }
        };

        let mut summary = SearchSummary::default();
        for item in due {
            let outcome = self.pipeline.process_item(item.id, false).await;
            summary.processed += 1;
            match &outcome {
                PipelineOutcome::Found { .. } => summary.found += 1,
                PipelineOutcome::Failed { .. } => summary.failed += 1,
                _ => {}
            }
            self.emit(ScannerEvent::WantedSearchProgress {
                item_id: item.id,
                status: match &outcome {
                    PipelineOutcome::Found { .. } => "found".to_string(),
                    PipelineOutcome::Skipped { .. } => "skipped".to_string(),
                    PipelineOutcome::WhisperPending { .. } => "whisper_pending".to_string(),
                    PipelineOutcome::Failed { .. } => "failed".to_string(),
                },
            });
            // Rate shaping between items.
            if pause_ms > 0 {
                tokio::time::sleep(Duration::from_millis(pause_ms)).await;
            }
        }
        info!(
            "Search pass complete: {} processed, {} found",
            summary.processed, summary.found
        );
        summary
    }

    // ------------------------------------------------------------------
    // Scheduler
    // ------------------------------------------------------------------

    /// Start the periodic loops. Zero intervals disable a loop.
    pub fn start(self: &Arc<Self>) {
        let scan_hours = self.settings.get_i64("scanner.scan_interval_hours", 6);
        let search_hours = self.settings.get_i64("scanner.search_interval_hours", 1);

        if scan_hours > 0 {
            let scanner = Arc::clone(self);
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                if scanner.settings.get_bool("scanner.scan_on_startup", false) {
                    scanner.scan_all().await;
                }
                let interval = Duration::from_secs(scan_hours as u64 * 3600);
                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = tokio::time::sleep(interval) => {
                            scanner.scan_all().await;
                        }
                    }
                }
                info!("Scan loop stopped");
            });
        }

        if search_hours > 0 {
            let scanner = Arc::clone(self);
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                let interval = Duration::from_secs(search_hours as u64 * 3600);
                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = tokio::time::sleep(interval) => {
                            scanner.search_pass().await;
                        }
                    }
                }
                info!("Search loop stopped");
            });
        }
        info!(
            "Scheduler started (scan every {}h, search every {}h)",
            scan_hours, search_hours
        );
    }

    /// Cancel scheduled timers.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ProviderManager, ProviderRegistry};
    use crate::store::{
        SqliteJobStore, SqliteProviderStore, SqliteSettingsStore, WantedFilter, WantedStatus,
    };
    use crate::testing::MockLibraryManager;
    use crate::translation::TranslationManager;
    use crate::translator::Translator;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        scanner: Arc<Scanner>,
        wanted: Arc<SqliteWantedStore>,
        library: Arc<MockLibraryManager>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("Show.S01E01.mkv");
        std::fs::write(&video, "video").unwrap();

        let library = Arc::new(MockLibraryManager::new("sonarr").with_episode(
            10,
            3,
            "Show",
            1,
            1,
            &video.to_string_lossy(),
        ));

        let settings = Arc::new(SqliteSettingsStore::in_memory().unwrap());
        let settings_dyn: Arc<dyn SettingsStore> = Arc::clone(&settings) as _;
        let wanted = Arc::new(SqliteWantedStore::in_memory().unwrap());
        let history = Arc::new(SqliteHistoryStore::in_memory().unwrap());
        let translation_store = Arc::new(SqliteTranslationStore::in_memory().unwrap());

        let registry = ProviderRegistry::new(
            Arc::new(SqliteProviderStore::in_memory().unwrap()),
            Arc::clone(&settings_dyn),
        );
        let providers = Arc::new(ProviderManager::new(
            Arc::new(registry),
            Arc::clone(&history),
            Arc::clone(&settings_dyn),
        ));
        let translation = Arc::new(TranslationManager::new(
            Arc::clone(&translation_store),
            Arc::clone(&settings_dyn),
        ));
        let translator = Arc::new(Translator::new(
            Arc::clone(&providers),
            translation,
            Arc::new(SqliteJobStore::in_memory().unwrap()),
            Arc::clone(&history),
            Arc::clone(&settings_dyn),
        ));
        let pipeline = Arc::new(WantedPipeline::new(
            Arc::clone(&wanted),
            Arc::clone(&providers),
            translator,
            Arc::clone(&history),
            Arc::clone(&settings_dyn),
        ));
        let scanner = Arc::new(Scanner::new(
            Arc::clone(&wanted),
            translation_store,
            Arc::new(SqliteWatchedFolderStore::in_memory().unwrap()),
            history,
            pipeline,
            vec![Arc::clone(&library) as Arc<dyn LibraryManager>],
            settings_dyn,
        ));
        Fixture {
            dir,
            scanner,
            wanted,
            library,
        }
    }

    #[tokio::test]
    async fn test_scan_upserts_wanted_items() {
        let fixture = fixture();
        let summary = fixture.scanner.scan_all().await.unwrap();
        assert_eq!(summary.items_seen, 1);
        assert_eq!(summary.wanted_added, 1);

        let items = fixture.wanted.list(&WantedFilter::new()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].target_language, "de");
        assert_eq!(items[0].status, WantedStatus::Wanted);
    }

    #[tokio::test]
    async fn test_rescan_is_idempotent() {
        let fixture = fixture();
        fixture.scanner.scan_all().await.unwrap();
        let second = fixture.scanner.scan_all().await.unwrap();
        assert_eq!(second.wanted_added, 0);
        assert_eq!(second.wanted_updated, 1);
        assert_eq!(fixture.wanted.list(&WantedFilter::new()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_ass_means_no_wanted_row() {
        let fixture = fixture();
        std::fs::write(fixture.dir.path().join("Show.S01E01.de.ass"), "x").unwrap();
        let summary = fixture.scanner.scan_all().await.unwrap();
        assert_eq!(summary.wanted_added, 0);
        assert!(fixture.wanted.list(&WantedFilter::new()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_existing_srt_flags_upgrade_candidate() {
        let fixture = fixture();
        std::fs::write(fixture.dir.path().join("Show.S01E01.de.srt"), "x").unwrap();
        let summary = fixture.scanner.scan_all().await.unwrap();
        assert_eq!(summary.upgrades_flagged, 1);
        let items = fixture.wanted.list(&WantedFilter::new()).unwrap();
        assert!(items[0].upgrade_candidate);
        assert_eq!(items[0].existing_sub, ExistingSub::Srt);
    }

    #[tokio::test]
    async fn test_cleanup_removes_vanished_video() {
        let fixture = fixture();
        fixture.scanner.scan_all().await.unwrap();
        assert_eq!(fixture.wanted.list(&WantedFilter::new()).unwrap().len(), 1);

        std::fs::remove_file(fixture.dir.path().join("Show.S01E01.mkv")).unwrap();
        fixture.library.set_items(Vec::new());
        let summary = fixture.scanner.scan_all().await.unwrap();
        assert_eq!(summary.removed, 1);
        assert!(fixture.wanted.list(&WantedFilter::new()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_removes_row_when_ass_appears() {
        let fixture = fixture();
        fixture.scanner.scan_all().await.unwrap();
        std::fs::write(fixture.dir.path().join("Show.S01E01.de.ass"), "x").unwrap();
        let summary = fixture.scanner.scan_all().await.unwrap();
        assert_eq!(summary.removed, 1);
        assert!(fixture.wanted.list(&WantedFilter::new()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_source_does_not_purge_backlog() {
        let fixture = fixture();
        fixture.scanner.scan_all().await.unwrap();
        assert_eq!(fixture.wanted.list(&WantedFilter::new()).unwrap().len(), 1);

        // Library goes down: items still on disk must survive the scan.
        // Rebuild a scanner against the same wanted store with a failing
        // library.
        let settings: Arc<dyn SettingsStore> =
            Arc::new(SqliteSettingsStore::in_memory().unwrap());
        let history = Arc::new(SqliteHistoryStore::in_memory().unwrap());
        let registry = ProviderRegistry::new(
            Arc::new(SqliteProviderStore::in_memory().unwrap()),
            Arc::clone(&settings),
        );
        let providers = Arc::new(ProviderManager::new(
            Arc::new(registry),
            Arc::clone(&history),
            Arc::clone(&settings),
        ));
        let translation_store = Arc::new(SqliteTranslationStore::in_memory().unwrap());
        let translator = Arc::new(Translator::new(
            Arc::clone(&providers),
            Arc::new(TranslationManager::new(
                Arc::clone(&translation_store),
                Arc::clone(&settings),
            )),
            Arc::new(SqliteJobStore::in_memory().unwrap()),
            Arc::clone(&history),
            Arc::clone(&settings),
        ));
        let pipeline = Arc::new(WantedPipeline::new(
            Arc::clone(&fixture.wanted),
            providers,
            translator,
            Arc::clone(&history),
            Arc::clone(&settings),
        ));

        struct FailingLibrary;
        #[async_trait::async_trait]
        impl LibraryManager for FailingLibrary {
            fn name(&self) -> &str {
                "failing"
            }
            async fn health_check(&self) -> Result<(), crate::integrations::IntegrationError> {
                Err(crate::integrations::IntegrationError::Connection(
                    "down".to_string(),
                ))
            }
            async fn list_items(
                &self,
            ) -> Result<Vec<LibraryItem>, crate::integrations::IntegrationError> {
                Err(crate::integrations::IntegrationError::Connection(
                    "down".to_string(),
                ))
            }
            async fn list_series_items(
                &self,
                _series_id: i64,
            ) -> Result<Vec<LibraryItem>, crate::integrations::IntegrationError> {
                Ok(Vec::new())
            }
            async fn notify_rescan(
                &self,
                _item: &LibraryItem,
            ) -> Result<(), crate::integrations::IntegrationError> {
                Ok(())
            }
        }

        let broken_scanner = Arc::new(Scanner::new(
            Arc::clone(&fixture.wanted),
            translation_store,
            Arc::new(SqliteWatchedFolderStore::in_memory().unwrap()),
            history,
            pipeline,
            vec![Arc::new(FailingLibrary) as Arc<dyn LibraryManager>],
            settings,
        ));
        let summary = broken_scanner.scan_all().await.unwrap();
        assert_eq!(summary.sources_failed, 1);
        // Video still exists, so the row survives despite not being listed.
        assert_eq!(fixture.wanted.list(&WantedFilter::new()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_scan_refused() {
        let fixture = fixture();
        fixture.scanner.scanning.store(true, Ordering::SeqCst);
        assert!(fixture.scanner.scan_all().await.is_none());
        fixture.scanner.scanning.store(false, Ordering::SeqCst);
        assert!(fixture.scanner.scan_all().await.is_some());
    }

    #[tokio::test]
    async fn test_search_pass_processes_due_items() {
        let fixture = fixture();
        fixture.scanner.scan_all().await.unwrap();
        let summary = fixture.scanner.search_pass().await.unwrap();
        assert_eq!(summary.processed, 1);
        // With no providers configured the item misses and backs off.
        let items = fixture.wanted.list(&WantedFilter::new()).unwrap();
        assert_eq!(items[0].status, WantedStatus::Wanted);
        assert!(items[0].retry_after.is_some());
    }
}
