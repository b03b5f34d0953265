//! Read-only adapters to external library managers and media servers.

mod bazarr;
mod compat;
mod media_server;
mod radarr;
mod sonarr;
mod types;

pub use bazarr::{generate_mapping_report, BazarrProfile, MappingReport};
pub use compat::{batch_check_compatibility, check_compatibility, CompatReport, CompatTarget};
pub use media_server::{KodiClient, MediaServer, PlexClient};
pub use radarr::RadarrClient;
pub use sonarr::SonarrClient;
pub use types::{
    IntegrationError, LibraryItem, WebhookEpisode, WebhookMovie, WebhookPayload, WebhookSeries,
};

use async_trait::async_trait;

/// A library manager (Sonarr, Radarr or a watched-folder source) that
/// enumerates video-backed items and accepts rescan hints.
#[async_trait]
pub trait LibraryManager: Send + Sync {
    /// Instance name for logs and health reporting.
    fn name(&self) -> &str;

    /// Whether this manager owns items of `kind` (Sonarr: episodes,
    /// Radarr: movies). Used to route rescan notifications.
    fn handles(&self, kind: crate::store::ItemKind) -> bool {
        let _ = kind;
        true
    }

    async fn health_check(&self) -> Result<(), IntegrationError>;

    /// Every item that currently has a video file on disk.
    async fn list_items(&self) -> Result<Vec<LibraryItem>, IntegrationError>;

    /// Items of one series (targeted webhook scans). Movie managers return
    /// an empty list.
    async fn list_series_items(&self, series_id: i64) -> Result<Vec<LibraryItem>, IntegrationError>;

    /// Tell the manager to rescan the entity owning `item`. Failures are
    /// logged by callers and never propagate into pipeline results.
    async fn notify_rescan(&self, item: &LibraryItem) -> Result<(), IntegrationError>;
}
