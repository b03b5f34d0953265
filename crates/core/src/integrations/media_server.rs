//! Media-server notifiers (Plex, Kodi).
//!
//! Fire-and-forget refresh calls after a subtitle lands on disk, so the
//! media server picks it up without waiting for its own periodic scan.

use async_trait::async_trait;
use tracing::debug;

use super::types::IntegrationError;

/// A media server that can refresh a library path.
#[async_trait]
pub trait MediaServer: Send + Sync {
    fn name(&self) -> &str;

    async fn health_check(&self) -> Result<(), IntegrationError>;

    /// Ask the server to re-read metadata for the directory containing
    /// `path`.
    async fn refresh_path(&self, path: &str) -> Result<(), IntegrationError>;
}

/// Plex media server client.
pub struct PlexClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl PlexClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl MediaServer for PlexClient {
    fn name(&self) -> &str {
        "plex"
    }

    async fn health_check(&self) -> Result<(), IntegrationError> {
        let response = self
            .client
            .get(format!("{}/identity", self.base_url))
            .header("X-Plex-Token", &self.token)
            .send()
            .await
            .map_err(|e| IntegrationError::Connection(e.to_string()))?;
        match response.status().as_u16() {
            200 => Ok(()),
            401 => Err(IntegrationError::Auth("token rejected".to_string())),
            s => Err(IntegrationError::Api {
                status: s,
                message: "identity failed".to_string(),
            }),
        }
    }

    async fn refresh_path(&self, path: &str) -> Result<(), IntegrationError> {
        debug!("Asking Plex to refresh {path}");
        let response = self
            .client
            .get(format!("{}/library/sections/all/refresh", self.base_url))
            .header("X-Plex-Token", &self.token)
            .query(&[("path", path)])
            .send()
            .await
            .map_err(|e| IntegrationError::Connection(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(IntegrationError::Api {
                status: response.status().as_u16(),
                message: "refresh rejected".to_string(),
            })
        }
    }
}

/// Kodi JSON-RPC client.
pub struct KodiClient {
    client: reqwest::Client,
    base_url: String,
}

impl KodiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn rpc(&self, method: &str, params: serde_json::Value) -> Result<(), IntegrationError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(format!("{}/jsonrpc", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| IntegrationError::Connection(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(IntegrationError::Api {
                status: response.status().as_u16(),
                message: format!("{method} failed"),
            })
        }
    }
}

#[async_trait]
impl MediaServer for KodiClient {
    fn name(&self) -> &str {
        "kodi"
    }

    async fn health_check(&self) -> Result<(), IntegrationError> {
        self.rpc("JSONRPC.Ping", serde_json::json!({})).await
    }

    async fn refresh_path(&self, path: &str) -> Result<(), IntegrationError> {
        let directory = std::path::Path::new(path)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());
        self.rpc(
            "VideoLibrary.Scan",
            serde_json::json!({ "directory": directory }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plex_trims_trailing_slash() {
        let plex = PlexClient::new("http://plex:32400/", "tok");
        assert_eq!(plex.base_url, "http://plex:32400");
        assert_eq!(plex.name(), "plex");
    }

    #[test]
    fn test_kodi_name() {
        let kodi = KodiClient::new("http://kodi:8080");
        assert_eq!(kodi.name(), "kodi");
    }
}
