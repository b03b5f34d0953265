//! Radarr read adapter.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::store::ItemKind;

use super::types::{IntegrationError, LibraryItem};
use super::LibraryManager;

/// Radarr v3 API client (read-only plus rescan commands).
pub struct RadarrClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    instance_name: String,
}

impl RadarrClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            instance_name: "radarr".to_string(),
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
struct Movie {
    id: i64,
    title: String,
    #[serde(default)]
    year: Option<u32>,
    #[serde(default, rename = "imdbId")]
    imdb_id: Option<String>,
    #[serde(default, rename = "tmdbId")]
    tmdb_id: Option<i64>,
    #[serde(default, rename = "hasFile")]
    has_file: bool,
    #[serde(default, rename = "movieFile")]
    movie_file: Option<MovieFile>,
}

#[derive(Debug, Deserialize)]
struct MovieFile {
    #[serde(default)]
    path: Option<String>,
}

impl Movie {
    fn to_item(&self) -> Option<LibraryItem> {
        if !self.has_file {
            return None;
        }
        let path = self.movie_file.as_ref().and_then(|f| f.path.clone())?;
        Some(LibraryItem {
            kind: ItemKind::Movie,
            id: self.id,
            series_id: None,
            title: self.title.clone(),
            season: None,
            episode: None,
            year: self.year,
            file_path: path,
            imdb_id: self.imdb_id.clone(),
            tvdb_id: None,
            tmdb_id: self.tmdb_id,
        })
    }
}

#[async_trait]
impl LibraryManager for RadarrClient {
    fn name(&self) -> &str {
        &self.instance_name
    }

    fn handles(&self, kind: ItemKind) -> bool {
        kind == ItemKind::Movie
    }

    async fn health_check(&self) -> Result<(), IntegrationError> {
        let _: serde_json::Value = self.get_json("/api/v3/system/status").await?;
        Ok(())
    }

    async fn list_items(&self) -> Result<Vec<LibraryItem>, IntegrationError> {
        let movies: Vec<Movie> = self.get_json("/api/v3/movie").await?;
        let items: Vec<LibraryItem> = movies.iter().filter_map(Movie::to_item).collect();
        debug!("{} listed {} movie(s) with files", self.instance_name, items.len());
        Ok(items)
    }

    async fn list_series_items(
        &self,
        _series_id: i64,
    ) -> Result<Vec<LibraryItem>, IntegrationError> {
        // Movies have no series grouping.
        Ok(Vec::new())
    }

    async fn notify_rescan(&self, item: &LibraryItem) -> Result<(), IntegrationError> {
        let response = self
            .client
            .post(format!("{}/api/v3/command", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .json(&serde_json::json!({ "name": "RescanMovie", "movieId": item.id }))
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
