//! Persisted entity types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of library item a wanted row belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Episode,
    Movie,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Episode => "episode",
            ItemKind::Movie => "movie",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "episode" => Some(ItemKind::Episode),
            "movie" => Some(ItemKind::Movie),
            _ => None,
        }
    }
}

/// What subtitle already exists on disk for a wanted tuple.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExistingSub {
    #[default]
    None,
    Srt,
    Ass,
    EmbeddedSrt,
    EmbeddedAss,
}

impl ExistingSub {
    /// Subtitle format of the existing file, for the upgrade decision.
    pub fn format(&self) -> crate::subtitles::SubtitleFormat {
        match self {
            ExistingSub::Ass | ExistingSub::EmbeddedAss => crate::subtitles::SubtitleFormat::Ass,
            ExistingSub::Srt | ExistingSub::EmbeddedSrt => crate::subtitles::SubtitleFormat::Srt,
            ExistingSub::None => crate::subtitles::SubtitleFormat::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExistingSub::None => "none",
            ExistingSub::Srt => "srt",
            ExistingSub::Ass => "ass",
            ExistingSub::EmbeddedSrt => "embedded_srt",
            ExistingSub::EmbeddedAss => "embedded_ass",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "srt" => ExistingSub::Srt,
            "ass" => ExistingSub::Ass,
            "embedded_srt" => ExistingSub::EmbeddedSrt,
            "embedded_ass" => ExistingSub::EmbeddedAss,
            _ => ExistingSub::None,
        }
    }
}

/// Full-dialogue vs forced-only subtitle request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubtitleKind {
    #[default]
    Full,
    Forced,
}

impl SubtitleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubtitleKind::Full => "full",
            SubtitleKind::Forced => "forced",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "forced" {
            SubtitleKind::Forced
        } else {
            SubtitleKind::Full
        }
    }
}

/// Wanted item lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WantedStatus {
    Wanted,
    Searching,
    Found,
    Failed,
    Ignored,
}

impl WantedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WantedStatus::Wanted => "wanted",
            WantedStatus::Searching => "searching",
            WantedStatus::Found => "found",
            WantedStatus::Failed => "failed",
            WantedStatus::Ignored => "ignored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "wanted" => Some(WantedStatus::Wanted),
            "searching" => Some(WantedStatus::Searching),
            "found" => Some(WantedStatus::Found),
            "failed" => Some(WantedStatus::Failed),
            "ignored" => Some(WantedStatus::Ignored),
            _ => None,
        }
    }
}

/// A request for one subtitle file.
///
/// Identity is (file_path, target_language, subtitle_kind).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WantedItem {
    pub id: i64,
    pub item_kind: ItemKind,
    pub title: String,
    /// Season/episode label, e.g. "S01E04". Empty for movies.
    #[serde(default)]
    pub episode_label: String,
    /// External library ids (Sonarr series / Radarr movie / episode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movie_id: Option<i64>,
    pub file_path: String,
    pub target_language: String,
    pub subtitle_kind: SubtitleKind,
    pub existing_sub: ExistingSub,
    pub upgrade_candidate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_score: Option<i32>,
    pub status: WantedStatus,
    pub search_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_search_at: Option<DateTime<Utc>>,
    /// Adaptive-backoff gate: the scheduler skips the item until this time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields used when creating or upserting a wanted item.
#[derive(Debug, Clone)]
pub struct WantedUpsert {
    pub item_kind: ItemKind,
    pub title: String,
    pub episode_label: String,
    pub series_id: Option<i64>,
    pub episode_id: Option<i64>,
    pub movie_id: Option<i64>,
    pub file_path: String,
    pub target_language: String,
    pub subtitle_kind: SubtitleKind,
    pub existing_sub: ExistingSub,
    pub upgrade_candidate: bool,
    pub current_score: Option<i32>,
}

/// Filter for wanted item listings.
#[derive(Debug, Clone, Default)]
pub struct WantedFilter {
    pub status: Option<WantedStatus>,
    pub item_kind: Option<ItemKind>,
    pub series_id: Option<i64>,
    pub subtitle_kind: Option<SubtitleKind>,
    pub language: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl WantedFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: WantedStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Per-status counts for the wanted dashboard.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WantedSummary {
    pub total: i64,
    pub wanted: i64,
    pub searching: i64,
    pub found: i64,
    pub failed: i64,
    pub ignored: i64,
}

/// Translation job lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// A unit of translation work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationJob {
    pub id: String,
    pub file_path: String,
    pub status: JobStatus,
    /// Free-form stats recorded by the translator (line counts, timings).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Hash of the translation settings in effect at completion. Jobs whose
    /// hash differs from the current hash are outdated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A language profile attached to series/movies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageProfile {
    pub id: i64,
    pub name: String,
    pub source_language: String,
    pub target_languages: Vec<String>,
    /// Ordered translation backend names tried in order.
    pub fallback_chain: Vec<String>,
    pub forced_preference: ForcedPreference,
    pub updated_at: DateTime<Utc>,
}

/// Whether forced subtitles are requested alongside full ones.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForcedPreference {
    #[default]
    Disabled,
    Prefer,
    Require,
}

impl ForcedPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForcedPreference::Disabled => "disabled",
            ForcedPreference::Prefer => "prefer",
            ForcedPreference::Require => "require",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "prefer" => ForcedPreference::Prefer,
            "require" => ForcedPreference::Require,
            _ => ForcedPreference::Disabled,
        }
    }
}

/// A glossary term mapping, optionally scoped to one series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<i64>,
    pub source_term: String,
    pub target_term: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Running statistics for one subtitle provider.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderStats {
    pub provider: String,
    pub total_searches: u64,
    pub successful_downloads: u64,
    pub failed_downloads: u64,
    pub avg_score: f64,
    pub avg_response_time_ms: f64,
    pub last_response_time_ms: u64,
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
    pub auto_disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_until: Option<DateTime<Utc>>,
    /// Additive scoring bias in [-50, +50] applied after all other weights.
    pub score_modifier: i32,
}

/// Running statistics for one translation backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendStats {
    pub backend: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_characters: u64,
    pub avg_response_time_ms: f64,
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// Append-only record of a downloaded subtitle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleDownload {
    pub id: i64,
    pub provider: String,
    pub subtitle_id: String,
    pub language: String,
    pub format: String,
    pub file_path: String,
    pub score: i32,
    pub downloaded_at: DateTime<Utc>,
}

/// Record of a subtitle upgrade (e.g. SRT replaced by ASS).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeRecord {
    pub id: i64,
    pub file_path: String,
    pub old_format: String,
    pub old_score: i32,
    pub new_format: String,
    pub new_score: i32,
    pub reason: String,
    pub upgraded_at: DateTime<Utc>,
}

/// A watched folder for standalone (non-arr) mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedFolder {
    pub id: i64,
    pub path: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            WantedStatus::Wanted,
            WantedStatus::Searching,
            WantedStatus::Found,
            WantedStatus::Failed,
            WantedStatus::Ignored,
        ] {
            assert_eq!(WantedStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(WantedStatus::parse("bogus"), None);
    }

    #[test]
    fn test_subtitle_kind_defaults_to_full() {
        assert_eq!(SubtitleKind::parse("full"), SubtitleKind::Full);
        assert_eq!(SubtitleKind::parse("forced"), SubtitleKind::Forced);
        assert_eq!(SubtitleKind::parse(""), SubtitleKind::Full);
    }

    #[test]
    fn test_existing_sub_parse() {
        assert_eq!(ExistingSub::parse("embedded_ass"), ExistingSub::EmbeddedAss);
        assert_eq!(ExistingSub::parse("garbage"), ExistingSub::None);
    }

    #[test]
    fn test_wanted_status_serde_snake_case() {
        let json = serde_json::to_string(&WantedStatus::Searching).unwrap();
        assert_eq!(json, "\"searching\"");
    }

    #[test]
    fn test_profile_serialization() {
        let profile = LanguageProfile {
            id: 1,
            name: "anime".to_string(),
            source_language: "ja".to_string(),
            target_languages: vec!["de".to_string(), "en".to_string()],
            fallback_chain: vec!["ollama".to_string(), "deepl".to_string()],
            forced_preference: ForcedPreference::Prefer,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&profile).unwrap();
        let parsed: LanguageProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.fallback_chain, vec!["ollama", "deepl"]);
        assert_eq!(parsed.forced_preference, ForcedPreference::Prefer);
    }
}
