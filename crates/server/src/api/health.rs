//! Health endpoint: per-integration status, overall healthy iff the
//! default profile's first translation backend is reachable.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub integrations: Vec<IntegrationHealth>,
}

#[derive(Debug, Serialize)]
pub struct IntegrationHealth {
    pub name: String,
    pub kind: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut integrations = Vec::new();

    for library in state.libraries() {
        let result = library.health_check().await;
        integrations.push(IntegrationHealth {
            name: library.name().to_string(),
            kind: "library".to_string(),
            healthy: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
        });
    }

    for server in state.media_servers() {
        let result = server.health_check().await;
        integrations.push(IntegrationHealth {
            name: server.name().to_string(),
            kind: "media_server".to_string(),
            healthy: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
        });
    }

    if let Some(whisper) = state.whisper() {
        let result = whisper.health_check().await;
        integrations.push(IntegrationHealth {
            name: "whisper".to_string(),
            kind: "transcription".to_string(),
            healthy: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
        });
    }

    // The default translation backend decides overall health.
    let default_profile = state
        .translation_store()
        .effective_profile("series", None)
        .ok()
        .flatten();
    let primary_backend = default_profile
        .as_ref()
        .and_then(|p| p.fallback_chain.first().cloned())
        .unwrap_or_else(|| state.settings().get_string("translation.backend", "ollama"));

    let backend_healthy = match state.translation_manager().backend(&primary_backend) {
        Some(backend) => {
            let result = backend.health_check().await;
            integrations.push(IntegrationHealth {
                name: primary_backend.clone(),
                kind: "translation_backend".to_string(),
                healthy: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            });
            integrations.last().map(|i| i.healthy).unwrap_or(false)
        }
        None => {
            integrations.push(IntegrationHealth {
                name: primary_backend.clone(),
                kind: "translation_backend".to_string(),
                healthy: false,
                error: Some("unknown backend".to_string()),
            });
            false
        }
    };

    let response = HealthResponse {
        healthy: backend_healthy,
        integrations,
    };
    let status = if response.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
