//! Durable state.
//!
//! One SQLite database file, one store struct per entity family, each
//! holding its own `Mutex<Connection>` on the shared path. Read operations
//! return plain value records; writes take the connection lock for the whole
//! statement so derived aggregates stay consistent under concurrent callers.

mod history;
mod jobs;
mod providers;
mod settings;
mod translation;
mod types;
mod wanted;
mod watched;

pub use history::SqliteHistoryStore;
pub use jobs::SqliteJobStore;
pub use providers::SqliteProviderStore;
pub use settings::{SettingsStore, SqliteSettingsStore};
pub use translation::{SqliteTranslationStore, DEFAULT_PROFILE_NAME, GLOSSARY_MERGE_CAP};
pub use watched::SqliteWatchedFolderStore;
pub use types::{
    BackendStats, ExistingSub, ForcedPreference, GlossaryEntry, ItemKind, JobStatus,
    LanguageProfile, ProviderStats, SubtitleDownload, SubtitleKind, TranslationJob, UpgradeRecord,
    WantedFilter, WantedItem, WantedStatus, WantedSummary, WantedUpsert, WatchedFolder,
};
pub use wanted::SqliteWantedStore;

use thiserror::Error;

/// Errors raised by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing storage is unreachable or cannot be opened.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A unique-key violation the caller should recover from.
    #[error("Store conflict: {0}")]
    Conflict(String),

    /// A lookup that should have succeeded found nothing.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(e.to_string())
            }
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::CannotOpen =>
            {
                StoreError::Unavailable(e.to_string())
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}

pub(crate) fn parse_ts(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

pub(crate) fn parse_ts_opt(s: Option<String>) -> Option<chrono::DateTime<chrono::Utc>> {
    s.and_then(|s| {
        chrono::DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .ok()
    })
}
