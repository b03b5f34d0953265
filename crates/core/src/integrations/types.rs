//! Types shared by library-manager and media-server adapters.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::ItemKind;

/// Errors from integration calls.
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// One video-backed item known to a library manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryItem {
    pub kind: ItemKind,
    /// Library-manager id of the episode or movie.
    pub id: i64,
    /// Owning series id for episodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<i64>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvdb_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<i64>,
}

impl LibraryItem {
    /// "S01E04" style label; empty for movies.
    pub fn episode_label(&self) -> String {
        match (self.season, self.episode) {
            (Some(season), Some(episode)) => format!("S{season:02}E{episode:02}"),
            _ => String::new(),
        }
    }
}

/// Incoming arr webhook payload (Sonarr/Radarr native shape, reduced to the
/// fields the pipeline consumes).
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(default)]
    pub series: Option<WebhookSeries>,
    #[serde(default)]
    pub episodes: Vec<WebhookEpisode>,
    #[serde(default)]
    pub movie: Option<WebhookMovie>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSeries {
    pub id: i64,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEpisode {
    pub id: i64,
    #[serde(default, rename = "seasonNumber")]
    pub season_number: u32,
    #[serde(default, rename = "episodeNumber")]
    pub episode_number: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMovie {
    pub id: i64,
    #[serde(default)]
    pub title: String,
}

impl WebhookPayload {
    /// Whether this event should enter the pipeline. `Test` events are
    /// acknowledged without work; anything other than `Download` is
    /// ignored.
    pub fn is_download(&self) -> bool {
        self.event_type.eq_ignore_ascii_case("download")
    }

    pub fn is_test(&self) -> bool {
        self.event_type.eq_ignore_ascii_case("test")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_label() {
        let item = LibraryItem {
            kind: ItemKind::Episode,
            id: 1,
            series_id: Some(2),
            title: "Show".to_string(),
            season: Some(1),
            episode: Some(4),
            year: None,
            file_path: "/m/e.mkv".to_string(),
            imdb_id: None,
            tvdb_id: None,
            tmdb_id: None,
        };
        assert_eq!(item.episode_label(), "S01E04");
    }

    #[test]
    fn test_webhook_payload_parsing() {
        let json = r#"{
            "eventType": "Download",
            "series": {"id": 5, "title": "Show"},
            "episodes": [{"id": 11, "seasonNumber": 2, "episodeNumber": 3}]
        }"#;
        let payload: WebhookPayload = serde_json::from_str(json).unwrap();
        assert!(payload.is_download());
        assert!(!payload.is_test());
        assert_eq!(payload.series.unwrap().id, 5);
        assert_eq!(payload.episodes[0].season_number, 2);
    }

    #[test]
    fn test_webhook_other_events_not_download() {
        let json = r#"{"eventType": "Rename"}"#;
        let payload: WebhookPayload = serde_json::from_str(json).unwrap();
        assert!(!payload.is_download());
        assert!(!payload.is_test());
    }
}
