//! Provider API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use sublarr_core::{ProviderStats, VideoQuery};

use super::error_response;
use crate::metrics::PROVIDER_SEARCHES_TOTAL;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub enabled: bool,
    pub priority: i64,
    pub languages: Vec<String>,
    pub config_fields: Vec<serde_json::Value>,
    pub stats: Option<ProviderStats>,
}

/// GET /providers
pub async fn list_providers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry = state.provider_manager().registry();
    let mut providers = Vec::new();
    for name in registry.names() {
        let provider = registry.get(&name);
        let mut languages: Vec<String> = provider
            .map(|p| p.languages().iter().cloned().collect())
            .unwrap_or_default();
        languages.sort();
        let config_fields = provider
            .map(|p| {
                p.config_fields()
                    .iter()
                    .map(|f| serde_json::to_value(f).unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();
        providers.push(ProviderInfo {
            enabled: registry.is_enabled(&name),
            priority: registry.manual_priority(&name),
            languages,
            config_fields,
            stats: registry.stats(&name).ok(),
            name,
        });
    }
    Json(serde_json::json!({ "providers": providers }))
}

/// GET /providers/stats
pub async fn provider_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry = state.provider_manager().registry();
    let stats: Vec<ProviderStats> = registry
        .names()
        .iter()
        .filter_map(|name| registry.stats(name).ok())
        .collect();
    Json(serde_json::json!({ "stats": stats }))
}

/// GET /providers/health
pub async fn provider_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry = state.provider_manager().registry();
    let mut health = Vec::new();
    for name in registry.names() {
        let Some(provider) = registry.get(&name) else {
            continue;
        };
        let result = provider.health_check().await;
        health.push(serde_json::json!({
            "name": name,
            "healthy": result.is_ok(),
            "error": result.err().map(|e| e.to_string()),
        }));
    }
    Json(serde_json::json!({ "providers": health }))
}

#[derive(Debug, Deserialize)]
pub struct TestProviderBody {
    /// Optional search to run after the health check.
    #[serde(default)]
    pub query: Option<VideoQuery>,
}

/// POST /providers/test/{name}
pub async fn test_provider(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<TestProviderBody>,
) -> impl IntoResponse {
    let registry = state.provider_manager().registry();
    let Some(provider) = registry.get(&name) else {
        return error_response(StatusCode::NOT_FOUND, format!("unknown provider {name}"))
            .into_response();
    };
    if let Err(e) = provider.health_check().await {
        return Json(serde_json::json!({
            "name": name,
            "healthy": false,
            "error": e.to_string(),
        }))
        .into_response();
    }
    let mut response = serde_json::json!({ "name": name, "healthy": true });
    if let Some(query) = body.query {
        match provider.search(&query).await {
            Ok(candidates) => {
                response["search_results"] = serde_json::json!(candidates.len());
            }
            Err(e) => {
                response["search_error"] = serde_json::json!(e.to_string());
            }
        }
    }
    Json(response).into_response()
}

/// POST /providers/search - ad-hoc fan-out search.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(query): Json<VideoQuery>,
) -> impl IntoResponse {
    if query.languages.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "languages is empty").into_response();
    }
    PROVIDER_SEARCHES_TOTAL.inc();
    let candidates = state.provider_manager().search(&query, None, None).await;
    Json(serde_json::json!({ "candidates": candidates })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct EnableBody {
    pub enabled: bool,
}

/// POST /providers/{name}/enable - flip the enabled flag and clear any
/// auto-disable.
pub async fn set_enabled(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<EnableBody>,
) -> impl IntoResponse {
    let registry = state.provider_manager().registry();
    if registry.get(&name).is_none() {
        return error_response(StatusCode::NOT_FOUND, format!("unknown provider {name}"))
            .into_response();
    }
    if let Err(e) = state.settings().set(
        &format!("provider.{name}.enabled"),
        if body.enabled { "true" } else { "false" },
    ) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    if body.enabled {
        if let Err(e) = registry.re_enable(&name) {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                .into_response();
        }
    }
    Json(serde_json::json!({ "name": name, "enabled": body.enabled })).into_response()
}

/// POST /providers/cache/clear
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.provider_manager().registry().store().cache_clear() {
        Ok(removed) => Json(serde_json::json!({ "removed": removed })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
