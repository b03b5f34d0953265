//! API-key management.
//!
//! Besides the optional master key in the startup config, named keys live
//! in the settings table under `apikeys.<name>` and are accepted by the
//! auth middleware. Keys are generated server-side and shown once.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::error_response;
use crate::state::AppState;

/// Settings prefix for named API keys.
pub const API_KEY_PREFIX: &str = "apikeys.";

/// GET /apikeys - key names only, never values.
pub async fn list_keys(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.settings().get_prefixed(API_KEY_PREFIX) {
        Ok(keys) => {
            let names: Vec<String> = keys
                .keys()
                .filter_map(|k| k.strip_prefix(API_KEY_PREFIX))
                .map(str::to_string)
                .collect();
            Json(serde_json::json!({ "keys": names })).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateKeyBody {
    pub name: String,
}

/// POST /apikeys - generate a named key; the value is returned exactly
/// once.
pub async fn create_key(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateKeyBody>,
) -> impl IntoResponse {
    let name = body.name.trim();
    if name.is_empty() || name.contains('.') {
        return error_response(StatusCode::BAD_REQUEST, "invalid key name").into_response();
    }
    let setting = format!("{API_KEY_PREFIX}{name}");
    if state.settings().get(&setting).ok().flatten().is_some() {
        return error_response(StatusCode::CONFLICT, format!("key {name} exists")).into_response();
    }
    let value = Uuid::new_v4().simple().to_string();
    if let Err(e) = state.settings().set(&setting, &value) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "name": name, "key": value })),
    )
        .into_response()
}

/// DELETE /apikeys/{name}
pub async fn delete_key(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.settings().delete(&format!("{API_KEY_PREFIX}{name}")) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, format!("key {name}")).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct TestKeyBody {
    pub key: String,
}

/// POST /apikeys/test - check whether a key value would be accepted.
pub async fn test_key(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TestKeyBody>,
) -> impl IntoResponse {
    let valid = super::middleware::key_is_valid(&state, &body.key);
    Json(serde_json::json!({ "valid": valid }))
}

/// GET /apikeys/export - names and values for backup.
pub async fn export_keys(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.settings().get_prefixed(API_KEY_PREFIX) {
        Ok(keys) => {
            let entries: Vec<serde_json::Value> = keys
                .iter()
                .filter_map(|(k, v)| {
                    k.strip_prefix(API_KEY_PREFIX)
                        .map(|name| serde_json::json!({ "name": name, "key": v }))
                })
                .collect();
            Json(serde_json::json!({ "keys": entries })).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ImportKeysBody {
    pub keys: Vec<ImportKeyEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ImportKeyEntry {
    pub name: String,
    pub key: String,
}

/// POST /apikeys/import - restore keys from an export.
pub async fn import_keys(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ImportKeysBody>,
) -> impl IntoResponse {
    let mut imported = 0;
    for entry in &body.keys {
        let name = entry.name.trim();
        if name.is_empty() || name.contains('.') || entry.key.is_empty() {
            continue;
        }
        if state
            .settings()
            .set(&format!("{API_KEY_PREFIX}{name}"), &entry.key)
            .is_ok()
        {
            imported += 1;
        }
    }
    Json(serde_json::json!({ "imported": imported }))
}
