//! Podnapisi.net provider.
//!
//! Broad European-language coverage, no authentication, JSON search API,
//! ZIP download payloads (unwrapped by the manager's archive handling).

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::subtitles::SubtitleFormat;

use super::types::{
    MatchSignal, ProviderError, RateBudget, SubtitleCandidate, SubtitleProvider, VideoQuery,
};

const API_BASE: &str = "https://www.podnapisi.net";

/// Podnapisi.net subtitle provider.
pub struct PodnapisiProvider {
    client: reqwest::Client,
    api_base: String,
    languages: HashSet<String>,
}

impl PodnapisiProvider {
    pub fn new() -> Self {
        let languages = [
            "en", "de", "fr", "es", "it", "pt", "sl", "hr", "sr", "cs", "sk", "pl", "hu", "ro",
            "bg", "tr", "el", "nl", "sv", "da", "no", "fi", "ru", "uk", "ja", "ko", "zh",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        Self {
            client: reqwest::Client::new(),
            api_base: API_BASE.to_string(),
            languages,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn classify_status(status: u16, body: String) -> ProviderError {
        match status {
            401 | 403 => ProviderError::Auth(body),
            429 => ProviderError::RateLimited {
                retry_after_ms: None,
            },
            500..=599 => ProviderError::Transient(format!("HTTP {status}: {body}")),
            _ => ProviderError::Other(format!("HTTP {status}: {body}")),
        }
    }
}

impl Default for PodnapisiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    releases: Vec<String>,
    #[serde(default)]
    flags: Vec<String>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    season: Option<u32>,
    #[serde(default)]
    episode: Option<u32>,
    #[serde(default)]
    year: Option<u32>,
}

impl SearchItem {
    fn to_candidate(&self, query: &VideoQuery) -> SubtitleCandidate {
        let mut matches = HashSet::new();
        if let (Some(series), Some(title)) = (&query.series, &self.title) {
            if title.to_lowercase().contains(&series.to_lowercase()) {
                matches.insert(MatchSignal::Series);
            }
        }
        if query.season.is_some() && self.season == query.season {
            matches.insert(MatchSignal::Season);
        }
        if query.episode.is_some() && self.episode == query.episode {
            matches.insert(MatchSignal::Episode);
        }
        if query.year.is_some() && self.year == query.year {
            matches.insert(MatchSignal::Year);
        }
        if let (Some(group), Some(release)) = (&query.release_group, self.releases.first()) {
            if release.to_lowercase().contains(&group.to_lowercase()) {
                matches.insert(MatchSignal::ReleaseGroup);
            }
        }
        if let (Some(resolution), Some(release)) = (&query.resolution, self.releases.first()) {
            if release.to_lowercase().contains(&resolution.to_lowercase()) {
                matches.insert(MatchSignal::Resolution);
            }
        }

        let release_info = self.releases.first().cloned().unwrap_or_default();
        let format = if release_info.to_lowercase().ends_with(".ass")
            || self.flags.iter().any(|f| f == "ass")
        {
            SubtitleFormat::Ass
        } else {
            SubtitleFormat::Srt
        };

        SubtitleCandidate {
            provider: "podnapisi".to_string(),
            subtitle_id: self.id.clone(),
            filename: release_info.clone(),
            language: self.language.clone().unwrap_or_default(),
            format,
            score: 0,
            release_info,
            hearing_impaired: self.flags.iter().any(|f| f == "hearing_impaired"),
            forced: self.flags.iter().any(|f| f == "foreign_parts_only"),
            matches,
            machine_translated: self.flags.iter().any(|f| f == "machine_translated"),
            mt_confidence: 0.0,
            uploader_trust: 0.0,
            provider_data: self
                .download_url
                .as_ref()
                .map(|url| serde_json::json!({ "download_url": url })),
        }
    }
}

#[async_trait]
impl SubtitleProvider for PodnapisiProvider {
    fn name(&self) -> &str {
        "podnapisi"
    }

    fn languages(&self) -> &HashSet<String> {
        &self.languages
    }

    fn rate_budget(&self) -> RateBudget {
        RateBudget::new(30, 60)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(15)
    }

    async fn initialize(&self, _config: &BTreeMap<String, String>) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let response = self
            .client
            .get(format!("{}/subtitles/search/", self.api_base))
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::classify_status(
                response.status().as_u16(),
                String::new(),
            ))
        }
    }

    async fn search(&self, query: &VideoQuery) -> Result<Vec<SubtitleCandidate>, ProviderError> {
        let keywords = query
            .series
            .clone()
            .or_else(|| query.title.clone())
            .unwrap_or_default();
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self
            .client
            .get(format!("{}/subtitles/search/", self.api_base))
            .header("accept", "application/json")
            .query(&[("keywords", keywords.as_str())]);
        if !query.languages.is_empty() {
            request = request.query(&[("language", query.languages.join(","))]);
        }
        if let Some(season) = query.season {
            request = request.query(&[("seasons", season.to_string())]);
        }
        if let Some(episode) = query.episode {
            request = request.query(&[("episodes", episode.to_string())]);
        }
        if let Some(year) = query.year {
            request = request.query(&[("year", year.to_string())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("JSON: {e}")))?;
        debug!("podnapisi returned {} raw results", parsed.data.len());
        Ok(parsed
            .data
            .iter()
            .map(|item| item.to_candidate(query))
            .collect())
    }

    async fn download(&self, candidate: &SubtitleCandidate) -> Result<Vec<u8>, ProviderError> {
        let url = candidate
            .provider_data
            .as_ref()
            .and_then(|d| d.get("download_url"))
            .and_then(|u| u.as_str())
            .map(|u| u.to_string())
            .unwrap_or_else(|| {
                format!(
                    "{}/subtitles/{}/download",
                    self.api_base, candidate.subtitle_id
                )
            });

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(Self::classify_status(status, String::new()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        if bytes.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "empty payload for subtitle {}",
                candidate.subtitle_id
            )));
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_item_candidate_mapping() {
        let item = SearchItem {
            id: "xyz".to_string(),
            title: Some("Breaking Bad".to_string()),
            language: Some("de".to_string()),
            releases: vec!["Breaking.Bad.S05E14.1080p.WEB-DL-NTb".to_string()],
            flags: vec!["hearing_impaired".to_string()],
            download_url: Some("https://example/dl.zip".to_string()),
            season: Some(5),
            episode: Some(14),
            year: None,
        };
        let query = VideoQuery {
            file_path: "/m/bb.mkv".to_string(),
            series: Some("Breaking Bad".to_string()),
            season: Some(5),
            episode: Some(14),
            resolution: Some("1080p".to_string()),
            release_group: Some("NTb".to_string()),
            languages: vec!["de".to_string()],
            ..Default::default()
        };
        let candidate = item.to_candidate(&query);
        assert_eq!(candidate.provider, "podnapisi");
        assert!(candidate.matches.contains(&MatchSignal::Series));
        assert!(candidate.matches.contains(&MatchSignal::Season));
        assert!(candidate.matches.contains(&MatchSignal::Episode));
        assert!(candidate.matches.contains(&MatchSignal::ReleaseGroup));
        assert!(candidate.matches.contains(&MatchSignal::Resolution));
        assert!(candidate.hearing_impaired);
        assert!(!candidate.forced);
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            PodnapisiProvider::classify_status(429, String::new()),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            PodnapisiProvider::classify_status(503, String::new()),
            ProviderError::Transient(_)
        ));
        assert!(matches!(
            PodnapisiProvider::classify_status(403, String::new()),
            ProviderError::Auth(_)
        ));
    }

    #[test]
    fn test_search_response_parsing() {
        let json = r#"{"data": [{"id": "a1", "title": "Show", "language": "de", "releases": ["Show.S01E01"], "flags": []}]}"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.data.len(), 1);
        assert_eq!(parsed.data[0].id, "a1");
    }
}
