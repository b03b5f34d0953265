//! LegendasDivx provider.
//!
//! Credential-gated Portuguese-focused tracker. Logs in during
//! initialization and keeps the session cookie; payloads arrive as RAR or
//! ZIP archives.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::subtitles::SubtitleFormat;

use super::types::{
    ConfigField, MatchSignal, ProviderError, RateBudget, SubtitleCandidate, SubtitleProvider,
    VideoQuery,
};

const API_BASE: &str = "https://www.legendasdivx.pt";

/// LegendasDivx subtitle provider.
pub struct LegendasDivxProvider {
    client: reqwest::Client,
    api_base: String,
    languages: HashSet<String>,
    session: Mutex<Option<String>>,
}

impl LegendasDivxProvider {
    pub fn new() -> Self {
        let languages = ["pt", "es", "en"].iter().map(|s| s.to_string()).collect();
        Self {
            client: reqwest::Client::builder()
                .cookie_store(true)
                .build()
                .unwrap_or_default(),
            api_base: API_BASE.to_string(),
            languages,
            session: Mutex::new(None),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn require_session(&self) -> Result<String, ProviderError> {
        self.session
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ProviderError::Auth("not logged in".to_string()))
    }
}

impl Default for LegendasDivxProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    subtitles: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: String,
    #[serde(default)]
    release: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    hits: u32,
    #[serde(default)]
    uploader_rank: f32,
    #[serde(default)]
    description: String,
}

impl SearchItem {
    fn to_candidate(&self, query: &VideoQuery) -> SubtitleCandidate {
        let mut matches = HashSet::new();
        let release = self.release.to_lowercase();
        if let Some(series) = &query.series {
            if release.contains(&series.to_lowercase().replace(' ', ".")) {
                matches.insert(MatchSignal::Series);
            }
        }
        if let (Some(season), Some(episode)) = (query.season, query.episode) {
            if release.contains(&format!("s{season:02}e{episode:02}")) {
                matches.insert(MatchSignal::Season);
                matches.insert(MatchSignal::Episode);
            }
        }
        if let Some(group) = &query.release_group {
            if release.contains(&group.to_lowercase()) {
                matches.insert(MatchSignal::ReleaseGroup);
            }
        }
        if let Some(resolution) = &query.resolution {
            if release.contains(&resolution.to_lowercase()) {
                matches.insert(MatchSignal::Resolution);
            }
        }

        SubtitleCandidate {
            provider: "legendasdivx".to_string(),
            subtitle_id: self.id.clone(),
            filename: self.release.clone(),
            language: self.language.clone(),
            format: SubtitleFormat::Srt,
            score: 0,
            release_info: self.release.clone(),
            hearing_impaired: self.description.to_lowercase().contains("impaired"),
            forced: self.description.to_lowercase().contains("forced"),
            matches,
            machine_translated: false,
            mt_confidence: 0.0,
            uploader_trust: self.uploader_rank,
            provider_data: Some(serde_json::json!({ "hits": self.hits })),
        }
    }
}

#[async_trait]
impl SubtitleProvider for LegendasDivxProvider {
    fn name(&self) -> &str {
        "legendasdivx"
    }

    fn languages(&self) -> &HashSet<String> {
        &self.languages
    }

    fn rate_budget(&self) -> RateBudget {
        RateBudget::new(12, 60)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(20)
    }

    fn config_fields(&self) -> Vec<ConfigField> {
        vec![
            ConfigField {
                key: "username",
                label: "Username",
                secret: false,
                required: true,
            },
            ConfigField {
                key: "password",
                label: "Password",
                secret: true,
                required: true,
            },
        ]
    }

    async fn initialize(&self, config: &BTreeMap<String, String>) -> Result<(), ProviderError> {
        let username = config
            .get("username")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ProviderError::Auth("username not configured".to_string()))?;
        let password = config
            .get("password")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ProviderError::Auth("password not configured".to_string()))?;

        let response = self
            .client
            .post(format!("{}/api/login", self.api_base))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        let status = response.status().as_u16();
        let parsed: LoginResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("login JSON: {e}")))?;

        match (status, parsed.token) {
            (200, Some(token)) => {
                *self.session.lock().unwrap() = Some(token);
                info!("legendasdivx session established");
                Ok(())
            }
            (401 | 403, _) => Err(ProviderError::Auth(
                parsed.error.unwrap_or_else(|| "login rejected".to_string()),
            )),
            _ => Err(ProviderError::Transient(format!(
                "login failed with HTTP {status}"
            ))),
        }
    }

    async fn terminate(&self) {
        *self.session.lock().unwrap() = None;
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.require_session()?;
        let response = self
            .client
            .get(format!("{}/api/ping", self.api_base))
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProviderError::Transient(format!(
                "ping returned {}",
                response.status()
            )))
        }
    }

    async fn search(&self, query: &VideoQuery) -> Result<Vec<SubtitleCandidate>, ProviderError> {
        let token = self.require_session()?;
        let keywords = query
            .series
            .clone()
            .or_else(|| query.title.clone())
            .unwrap_or_default();
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let mut search_term = keywords;
        if let (Some(season), Some(episode)) = (query.season, query.episode) {
            search_term.push_str(&format!(" S{season:02}E{episode:02}"));
        }

        let response = self
            .client
            .get(format!("{}/api/search", self.api_base))
            .bearer_auth(&token)
            .query(&[("q", search_term.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        let status = response.status().as_u16();
        match status {
            200 => {}
            401 | 403 => return Err(ProviderError::Auth("session expired".to_string())),
            429 => {
                return Err(ProviderError::RateLimited {
                    retry_after_ms: None,
                })
            }
            s if s >= 500 => return Err(ProviderError::Transient(format!("HTTP {s}"))),
            s => return Err(ProviderError::Other(format!("HTTP {s}"))),
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("JSON: {e}")))?;
        debug!("legendasdivx returned {} raw results", parsed.subtitles.len());
        Ok(parsed
            .subtitles
            .iter()
            .map(|item| item.to_candidate(query))
            .collect())
    }

    async fn download(&self, candidate: &SubtitleCandidate) -> Result<Vec<u8>, ProviderError> {
        let token = self.require_session()?;
        let response = self
            .client
            .get(format!(
                "{}/api/download/{}",
                self.api_base, candidate.subtitle_id
            ))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        let status = response.status().as_u16();
        match status {
            200 => {}
            404 => {
                return Err(ProviderError::NotFound(format!(
                    "subtitle {} gone",
                    candidate.subtitle_id
                )))
            }
            401 | 403 => return Err(ProviderError::Auth("session expired".to_string())),
            s if s >= 500 => return Err(ProviderError::Transient(format!("HTTP {s}"))),
            s => return Err(ProviderError::Other(format!("HTTP {s}"))),
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
