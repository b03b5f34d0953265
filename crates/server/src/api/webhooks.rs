//! Arr webhook handlers.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;

use sublarr_core::{WebhookOutcome, WebhookPayload};

use super::{error_response, middleware::validate_callback_url};
use crate::state::AppState;

fn respond(outcome: WebhookOutcome) -> impl IntoResponse {
    let message = match outcome {
        WebhookOutcome::TestOk => "test ok",
        WebhookOutcome::Ignored => "event ignored",
        WebhookOutcome::Accepted => "processing scheduled",
    };
    Json(serde_json::json!({ "result": outcome, "message": message }))
}

/// POST /webhook/sonarr
pub async fn sonarr(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WebhookPayload>,
) -> impl IntoResponse {
    respond(state.scanner().handle_webhook("sonarr", payload))
}

/// POST /webhook/radarr
pub async fn radarr(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WebhookPayload>,
) -> impl IntoResponse {
    respond(state.scanner().handle_webhook("radarr", payload))
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    pub url: String,
}

/// POST /webhook/validate-callback - check a user-provided callback URL
/// before it is stored.
pub async fn validate_callback(Json(body): Json<CallbackBody>) -> impl IntoResponse {
    match validate_callback_url(&body.url) {
        Ok(()) => Json(serde_json::json!({ "valid": true })).into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e).into_response(),
    }
}
