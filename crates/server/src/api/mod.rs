//! HTTP API surface: thin adapters over core operations.

pub mod api_keys;
pub mod config;
pub mod health;
pub mod integrations;
pub mod library;
pub mod middleware;
pub mod profiles;
pub mod providers;
pub mod routes;
pub mod system;
pub mod tools;
pub mod translate;
pub mod wanted;
pub mod webhooks;
pub mod ws;

pub use routes::create_router;
pub use ws::{WsBroadcaster, WsMessage};

use axum::http::StatusCode;
use axum::Json;

/// Standard error payload.
pub fn error_body(message: impl Into<String>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": message.into() }))
}

/// Shorthand for a (status, error-json) response.
pub fn error_response(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    (status, error_body(message))
}
