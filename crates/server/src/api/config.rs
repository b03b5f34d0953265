//! Runtime configuration endpoints.
//!
//! Reads and writes go to the settings table; writes invalidate the
//! dependent singletons and broadcast `config_updated`.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{error_response, WsMessage};
use crate::state::AppState;

/// Settings keys whose values are redacted in responses.
const SECRET_MARKERS: &[&str] = &["api_key", "password", "token"];

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    /// Startup configuration (paths, listen address), secrets redacted.
    pub startup: sublarr_core::SanitizedConfig,
    /// Runtime settings, secret values redacted.
    pub settings: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateConfigBody {
    /// Key/value pairs to write into the settings table.
    pub settings: BTreeMap<String, String>,
}

fn redact(key: &str, value: &str) -> String {
    if SECRET_MARKERS.iter().any(|m| key.contains(m)) && !value.is_empty() {
        "••••••".to_string()
    } else {
        value.to_string()
    }
}

/// GET /config
pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.settings().get_prefixed("") {
        Ok(all) => {
            let settings = all
                .into_iter()
                .map(|(k, v)| {
                    let redacted = redact(&k, &v);
                    (k, redacted)
                })
                .collect();
            Json(ConfigResponse {
                startup: state.sanitized_config(),
                settings,
            })
            .into_response()
        }
        Err(e) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// PUT /config
pub async fn put_config(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UpdateConfigBody>,
) -> impl IntoResponse {
    if body.settings.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "no settings provided").into_response();
    }

    let mut written = Vec::new();
    for (key, value) in &body.settings {
        if key.trim().is_empty() {
            return error_response(StatusCode::BAD_REQUEST, "empty settings key").into_response();
        }
        if let Err(e) = state.settings().set(key, value) {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                .into_response();
        }
        written.push(key.clone());
    }

    // Config changes invalidate the dependent singletons; they rebuild
    // against the new settings on next access.
    state.translation_manager().invalidate_all();
    info!("Updated {} setting(s): {:?}", written.len(), written);

    state
        .ws_broadcaster()
        .broadcast(WsMessage::ConfigUpdated {
            keys: written.clone(),
        });
    Json(serde_json::json!({ "updated": written })).into_response()
}
