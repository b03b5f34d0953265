//! Sonarr read adapter.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::store::ItemKind;

use super::types::{IntegrationError, LibraryItem};
use super::LibraryManager;

/// Sonarr v3 API client (read-only plus rescan commands).
pub struct SonarrClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    instance_name: String,
}

impl SonarrClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            instance_name: "sonarr".to_string(),
        }
    }

    pub fn with_instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = name.into();
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, IntegrationError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| IntegrationError::Connection(e.to_string()))?;
        let status = response.status().as_u16();
        match status {
            200 => {}
            401 | 403 => return Err(IntegrationError::Auth("api key rejected".to_string())),
            s => {
                return Err(IntegrationError::Api {
                    status: s,
                    message: response.text().await.unwrap_or_default(),
                })
            }
        }
        response
            .json()
            .await
            .map_err(|e| IntegrationError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct Series {
    id: i64,
    title: String,
    #[serde(default)]
    year: Option<u32>,
    #[serde(default, rename = "imdbId")]
    imdb_id: Option<String>,
    #[serde(default, rename = "tvdbId")]
    tvdb_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Episode {
    id: i64,
    #[serde(rename = "seriesId")]
    series_id: i64,
    #[serde(rename = "seasonNumber")]
    season_number: u32,
    #[serde(rename = "episodeNumber")]
    episode_number: u32,
    #[serde(default, rename = "hasFile")]
    has_file: bool,
    #[serde(default, rename = "episodeFile")]
    episode_file: Option<EpisodeFile>,
}

#[derive(Debug, Deserialize)]
struct EpisodeFile {
    #[serde(default)]
    path: Option<String>,
}

#[async_trait]
impl LibraryManager for SonarrClient {
    fn name(&self) -> &str {
        &self.instance_name
    }

    fn handles(&self, kind: ItemKind) -> bool {
        kind == ItemKind::Episode
    }

    async fn health_check(&self) -> Result<(), IntegrationError> {
        let _: serde_json::Value = self.get_json("/api/v3/system/status").await?;
        Ok(())
    }

    async fn list_items(&self) -> Result<Vec<LibraryItem>, IntegrationError> {
        let series: Vec<Series> = self.get_json("/api/v3/series").await?;
        let mut items = Vec::new();
        for s in &series {
            let episodes: Vec<Episode> = self
                .get_json(&format!(
                    "/api/v3/episode?seriesId={}&includeEpisodeFile=true",
                    s.id
                ))
                .await?;
            for e in episodes {
                if !e.has_file {
                    continue;
                }
                let Some(path) = e.episode_file.as_ref().and_then(|f| f.path.clone()) else {
                    continue;
                };
                items.push(LibraryItem {
                    kind: ItemKind::Episode,
                    id: e.id,
                    series_id: Some(e.series_id),
                    title: s.title.clone(),
                    season: Some(e.season_number),
                    episode: Some(e.episode_number),
                    year: s.year,
                    file_path: path,
                    imdb_id: s.imdb_id.clone(),
                    tvdb_id: s.tvdb_id,
                    tmdb_id: None,
                });
            }
        }
        debug!("{} listed {} episode(s) with files", self.instance_name, items.len());
        Ok(items)
    }

    async fn list_series_items(&self, series_id: i64) -> Result<Vec<LibraryItem>, IntegrationError> {
        let series: Vec<Series> = self.get_json("/api/v3/series").await?;
        let Some(s) = series.into_iter().find(|s| s.id == series_id) else {
            return Ok(Vec::new());
        };
        let episodes: Vec<Episode> = self
            .get_json(&format!(
                "/api/v3/episode?seriesId={series_id}&includeEpisodeFile=true"
            ))
            .await?;
        Ok(episodes
            .into_iter()
            .filter(|e| e.has_file)
            .filter_map(|e| {
                let path = e.episode_file.as_ref().and_then(|f| f.path.clone())?;
                Some(LibraryItem {
                    kind: ItemKind::Episode,
                    id: e.id,
                    series_id: Some(e.series_id),
                    title: s.title.clone(),
                    season: Some(e.season_number),
                    episode: Some(e.episode_number),
                    year: s.year,
                    file_path: path,
                    imdb_id: s.imdb_id.clone(),
                    tvdb_id: s.tvdb_id,
                    tmdb_id: None,
                })
            })
            .collect())
    }

    async fn notify_rescan(&self, item: &LibraryItem) -> Result<(), IntegrationError> {
        let Some(series_id) = item.series_id else {
            return Ok(());
        };
        let response = self
            .client
            .post(format!("{}/api/v3/command", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .json(&serde_json::json!({ "name": "RescanSeries", "seriesId": series_id }))
            .send()
            .await
            .map_err(|e| IntegrationError::Connection(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(IntegrationError::Api {
                status: response.status().as_u16(),
                message: "rescan command rejected".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_parsing_with_file() {
        let json = r#"[{"id": 9, "seriesId": 3, "seasonNumber": 1, "episodeNumber": 2,
                        "hasFile": true, "episodeFile": {"path": "/m/Show/S01/E02.mkv"}}]"#;
        let episodes: Vec<Episode> = serde_json::from_str(json).unwrap();
        assert_eq!(episodes[0].series_id, 3);
        assert_eq!(
            episodes[0].episode_file.as_ref().unwrap().path.as_deref(),
            Some("/m/Show/S01/E02.mkv")
        );
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = SonarrClient::new("http://sonarr:8989/", "key");
        assert_eq!(client.base_url, "http://sonarr:8989");
    }
}
