// Allow some clippy lints that are too noisy for this codebase
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::manual_range_contains)]
#![allow(clippy::collapsible_if)]

pub mod circuit;
pub mod config;
pub mod fsops;
pub mod integrations;
pub mod jobs;
pub mod pipeline;
pub mod providers;
pub mod scanner;
pub mod store;
pub mod subtitles;
pub mod translation;
pub mod translator;
pub mod whisper;

/// Testing utilities and mock implementations for E2E tests.
///
/// This module provides mock implementations of the provider, backend and
/// library-manager traits, allowing comprehensive E2E testing without real
/// infrastructure.
pub mod testing;

pub use circuit::{CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthConfig, Config, ConfigError,
    DatabaseConfig, LogConfig, MediaConfig, SanitizedConfig, ServerConfig,
};
pub use fsops::{
    atomic_write, backup_path, check_disk_space, create_backup, is_within, quality_sidecar_path,
    PathSafetyError, TrashBatch, TrashEntry, TrashError, TrashManager, TRASH_DIR_NAME,
};
pub use integrations::{
    batch_check_compatibility, check_compatibility, generate_mapping_report, CompatReport,
    CompatTarget, IntegrationError, KodiClient, LibraryItem, LibraryManager, MappingReport,
    MediaServer, PlexClient, RadarrClient, SonarrClient, WebhookPayload,
};
pub use jobs::{
    BatchProgress, BatchTracker, InMemoryJobQueue, JobQueue, QueueError, SqliteWorkQueue,
    WhisperWorker, WorkExecutor, WorkItem, WorkStatus,
};
pub use pipeline::{next_retry_after, PipelineOutcome, WantedPipeline};
pub use providers::{
    is_perfect, parse_filename, score_candidate, should_upgrade, EmbeddedProvider,
    LegendasDivxProvider, ManagerError, MatchSignal, PodnapisiProvider, ProviderError,
    ProviderManager, ProviderRegistry, RateBudget, ScoringWeights, SubtitleCandidate,
    SubtitleProvider, TitrariProvider, VideoQuery, EMBEDDED_PROVIDER, PERFECT_SCORE,
};
pub use scanner::{ScanSummary, Scanner, ScannerEvent, SearchSummary, WebhookOutcome};
pub use store::{
    BackendStats, ExistingSub, ForcedPreference, GlossaryEntry, ItemKind, JobStatus,
    LanguageProfile, ProviderStats, SettingsStore, SqliteHistoryStore, SqliteJobStore,
    SqliteProviderStore, SqliteSettingsStore, SqliteTranslationStore, SqliteWantedStore,
    SqliteWatchedFolderStore, StoreError, SubtitleDownload, SubtitleKind, TranslationJob,
    UpgradeRecord, WantedFilter, WantedItem, WantedStatus, WantedSummary, WantedUpsert,
    WatchedFolder,
};
pub use subtitles::{detect_subtitles_for, SidecarSubtitle, SubtitleError, SubtitleFormat};
pub use translation::{
    BackendError, TranslationBackend, TranslationManager, TranslationMemory, TranslationResult,
    KNOWN_BACKENDS,
};
pub use translator::{build_video_query, TranslateOutcome, Translator};
pub use whisper::{WhisperClient, WhisperError, WhisperJob, WhisperJobStatus};
