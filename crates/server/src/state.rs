use std::sync::Arc;

use sublarr_core::{
    BatchTracker, Config, JobQueue, LibraryManager, MediaServer, ProviderManager, SanitizedConfig,
    Scanner, SettingsStore, SqliteHistoryStore, SqliteJobStore, SqliteTranslationStore,
    SqliteWantedStore, SqliteWatchedFolderStore, TranslationManager, Translator, TrashManager,
    WantedPipeline, WhisperClient,
};

use crate::api::WsBroadcaster;

/// Shared application state
pub struct AppState {
    config: Config,
    settings: Arc<dyn SettingsStore>,
    wanted_store: Arc<SqliteWantedStore>,
    job_store: Arc<SqliteJobStore>,
    translation_store: Arc<SqliteTranslationStore>,
    history_store: Arc<SqliteHistoryStore>,
    watched_store: Arc<SqliteWatchedFolderStore>,
    provider_manager: Arc<ProviderManager>,
    translation_manager: Arc<TranslationManager>,
    translator: Arc<Translator>,
    pipeline: Arc<WantedPipeline>,
    scanner: Arc<Scanner>,
    queue: Option<Arc<dyn JobQueue>>,
    batches: Arc<BatchTracker>,
    trash: Arc<TrashManager>,
    libraries: Vec<Arc<dyn LibraryManager>>,
    media_servers: Vec<Arc<dyn MediaServer>>,
    whisper: Option<Arc<WhisperClient>>,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        settings: Arc<dyn SettingsStore>,
        wanted_store: Arc<SqliteWantedStore>,
        job_store: Arc<SqliteJobStore>,
        translation_store: Arc<SqliteTranslationStore>,
        history_store: Arc<SqliteHistoryStore>,
        watched_store: Arc<SqliteWatchedFolderStore>,
        provider_manager: Arc<ProviderManager>,
        translation_manager: Arc<TranslationManager>,
        translator: Arc<Translator>,
        pipeline: Arc<WantedPipeline>,
        scanner: Arc<Scanner>,
        queue: Option<Arc<dyn JobQueue>>,
        batches: Arc<BatchTracker>,
        trash: Arc<TrashManager>,
        libraries: Vec<Arc<dyn LibraryManager>>,
        media_servers: Vec<Arc<dyn MediaServer>>,
        whisper: Option<Arc<WhisperClient>>,
        ws_broadcaster: WsBroadcaster,
    ) -> Self {
        Self {
            config,
            settings,
            wanted_store,
            job_store,
            translation_store,
            history_store,
            watched_store,
            provider_manager,
            translation_manager,
            translator,
            pipeline,
            scanner,
            queue,
            batches,
            trash,
            libraries,
            media_servers,
            whisper,
            ws_broadcaster,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    pub fn wanted_store(&self) -> &Arc<SqliteWantedStore> {
        &self.wanted_store
    }

    pub fn job_store(&self) -> &Arc<SqliteJobStore> {
        &self.job_store
    }

    pub fn translation_store(&self) -> &Arc<SqliteTranslationStore> {
        &self.translation_store
    }

    pub fn history_store(&self) -> &Arc<SqliteHistoryStore> {
        &self.history_store
    }

    pub fn watched_store(&self) -> &Arc<SqliteWatchedFolderStore> {
        &self.watched_store
    }

    pub fn provider_manager(&self) -> &Arc<ProviderManager> {
        &self.provider_manager
    }

    pub fn translation_manager(&self) -> &Arc<TranslationManager> {
        &self.translation_manager
    }

    pub fn translator(&self) -> &Arc<Translator> {
        &self.translator
    }

    pub fn pipeline(&self) -> &Arc<WantedPipeline> {
        &self.pipeline
    }

    pub fn scanner(&self) -> &Arc<Scanner> {
        &self.scanner
    }

    /// Background queue, if one is registered. Callers may execute work
    /// synchronously when absent.
    pub fn queue(&self) -> Option<&Arc<dyn JobQueue>> {
        self.queue.as_ref()
    }

    pub fn batches(&self) -> &Arc<BatchTracker> {
        &self.batches
    }

    pub fn trash(&self) -> &Arc<TrashManager> {
        &self.trash
    }

    pub fn libraries(&self) -> &[Arc<dyn LibraryManager>] {
        &self.libraries
    }

    pub fn media_servers(&self) -> &[Arc<dyn MediaServer>] {
        &self.media_servers
    }

    pub fn whisper(&self) -> Option<&Arc<WhisperClient>> {
        self.whisper.as_ref()
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }

    pub fn media_root(&self) -> &std::path::Path {
        &self.config.media.root
    }
}
