//! Types for the subtitle provider system.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::subtitles::SubtitleFormat;

/// Query parameters describing one video file to search subtitles for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoQuery {
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvdb_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anidb_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anilist_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// Override for absolute-numbered anime releases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute_episode: Option<u32>,
    /// Languages to search, ISO 639-1.
    pub languages: Vec<String>,
    /// Search only forced subtitles.
    #[serde(default)]
    pub forced_only: bool,
    /// Requester explicitly wants hearing-impaired subtitles.
    #[serde(default)]
    pub hearing_impaired: bool,
}

/// Match signals a provider reports for a candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MatchSignal {
    Hash,
    ImdbId,
    TvdbId,
    AnidbId,
    Series,
    Season,
    Episode,
    Year,
    ReleaseGroup,
    Resolution,
}

/// One subtitle offered by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleCandidate {
    /// Name of the provider that produced this candidate. Kept as a string
    /// so cached candidates never hold provider handles.
    pub provider: String,
    pub subtitle_id: String,
    pub filename: String,
    pub language: String,
    pub format: SubtitleFormat,
    /// Score assigned by the scorer; zero until scored.
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub release_info: String,
    #[serde(default)]
    pub hearing_impaired: bool,
    #[serde(default)]
    pub forced: bool,
    #[serde(default)]
    pub matches: HashSet<MatchSignal>,
    #[serde(default)]
    pub machine_translated: bool,
    /// Confidence in [0, 1] when machine translated.
    #[serde(default)]
    pub mt_confidence: f32,
    /// Uploader trust level reported by the provider, unbounded above.
    #[serde(default)]
    pub uploader_trust: f32,
    /// Opaque provider payload needed for download (URL, archive id, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_data: Option<serde_json::Value>,
}

/// A credential/config field a provider needs wired from settings.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigField {
    pub key: &'static str,
    pub label: &'static str,
    pub secret: bool,
    pub required: bool,
}

/// Rate-limit budget: `max_requests` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudget {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateBudget {
    pub const fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_seconds),
        }
    }
}

/// Errors from provider calls, by recovery class.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credentials rejected. Never retried.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The provider said "slow down" or the local window is exhausted.
    /// Not retried within the attempt.
    #[error("Rate limited{}", retry_after_ms.map(|ms| format!(", retry in {ms}ms")).unwrap_or_default())]
    RateLimited { retry_after_ms: Option<u64> },

    /// Timeout, connection refused, 5xx. Retried with backoff.
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// The call was refused locally (disabled, circuit open). Not an error
    /// of the provider itself.
    #[error("Skipped: {0}")]
    Skipped(String),

    /// Candidate or payload the provider cannot serve.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Whether a retry within the same attempt may help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    /// Whether the failure counts toward auto-disable.
    pub fn counts_toward_disable(&self) -> bool {
        matches!(
            self,
            ProviderError::Transient(_) | ProviderError::Other(_) | ProviderError::NotFound(_)
        )
    }
}

/// Capability set of a subtitle provider.
#[async_trait]
pub trait SubtitleProvider: Send + Sync {
    /// Unique provider name.
    fn name(&self) -> &str;

    /// ISO 639-1 codes this provider serves.
    fn languages(&self) -> &HashSet<String>;

    /// Per-provider rate budget.
    fn rate_budget(&self) -> RateBudget;

    /// Per-call timeout.
    fn timeout(&self) -> Duration {
        Duration::from_secs(15)
    }

    /// Retry attempts for transient failures.
    fn max_retries(&self) -> u32 {
        2
    }

    /// Credential fields the registry wires from settings.
    fn config_fields(&self) -> Vec<ConfigField> {
        Vec::new()
    }

    /// One-time setup (login, token fetch). Default: nothing.
    async fn initialize(&self, _config: &BTreeMap<String, String>) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Lifecycle teardown. Default: nothing.
    async fn terminate(&self) {}

    /// Cheap reachability check.
    async fn health_check(&self) -> Result<(), ProviderError>;

    /// Search for candidates matching the query.
    async fn search(&self, query: &VideoQuery) -> Result<Vec<SubtitleCandidate>, ProviderError>;

    /// Download the subtitle payload for a candidate.
    async fn download(&self, candidate: &SubtitleCandidate) -> Result<Vec<u8>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_minimal_deserialization() {
        let json = r#"{"file_path": "/m/e1.mkv", "languages": ["de"]}"#;
        let query: VideoQuery = serde_json::from_str(json).unwrap();
        assert_eq!(query.languages, vec!["de"]);
        assert!(!query.forced_only);
        assert!(query.series.is_none());
    }

    #[test]
    fn test_candidate_serialization_round_trip() {
        let mut matches = HashSet::new();
        matches.insert(MatchSignal::Series);
        matches.insert(MatchSignal::Episode);
        let candidate = SubtitleCandidate {
            provider: "podnapisi".to_string(),
            subtitle_id: "abc".to_string(),
            filename: "ep.ass".to_string(),
            language: "de".to_string(),
            format: SubtitleFormat::Ass,
            score: 420,
            release_info: "WEB-DL".to_string(),
            hearing_impaired: false,
            forced: false,
            matches,
            machine_translated: false,
            mt_confidence: 0.0,
            uploader_trust: 2.0,
            provider_data: Some(serde_json::json!({"url": "https://x/y.zip"})),
        };
        let json = serde_json::to_string(&candidate).unwrap();
        let parsed: SubtitleCandidate = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.subtitle_id, "abc");
        assert_eq!(parsed.format, SubtitleFormat::Ass);
        assert!(parsed.matches.contains(&MatchSignal::Episode));
    }

    #[test]
    fn test_error_classes() {
        assert!(ProviderError::Transient("timeout".into()).is_retryable());
        assert!(!ProviderError::Auth("bad key".into()).is_retryable());
        assert!(!ProviderError::RateLimited {
            retry_after_ms: Some(500)
        }
        .is_retryable());

        assert!(ProviderError::Transient("x".into()).counts_toward_disable());
        assert!(!ProviderError::Auth("x".into()).counts_toward_disable());
        assert!(!ProviderError::RateLimited {
            retry_after_ms: None
        }
        .counts_toward_disable());
        assert!(!ProviderError::Skipped("disabled".into()).counts_toward_disable());
    }
}
