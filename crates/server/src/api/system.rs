//! Standalone mode, export and metrics handlers.

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use sublarr_core::{detect_subtitles_for, is_within};

use super::error_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WatchedFolderBody {
    pub path: String,
    #[serde(default)]
    pub profile_id: Option<i64>,
}

/// GET /standalone/folders
pub async fn list_folders(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.watched_store().list() {
        Ok(folders) => Json(serde_json::json!({ "folders": folders })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// POST /standalone/folders
pub async fn add_folder(
    State(state): State<Arc<AppState>>,
    Json(body): Json<WatchedFolderBody>,
) -> impl IntoResponse {
    let path = FsPath::new(&body.path);
    if !path.is_dir() {
        return error_response(StatusCode::BAD_REQUEST, format!("{} is not a directory", body.path))
            .into_response();
    }
    if !is_within(path, state.media_root()) {
        return error_response(
            StatusCode::FORBIDDEN,
            format!("{} is outside the media root", body.path),
        )
        .into_response();
    }
    match state.watched_store().add(&body.path, body.profile_id) {
        Ok(folder) => (StatusCode::CREATED, Json(folder)).into_response(),
        Err(sublarr_core::StoreError::Conflict(_)) => {
            error_response(StatusCode::CONFLICT, "folder already watched").into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// DELETE /standalone/folders/{id}
pub async fn remove_folder(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.watched_store().remove(id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, format!("folder {id}")).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// POST /standalone/scan - trigger a scan (includes watched folders).
pub async fn scan(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.scanner().scan_all().await {
        Some(summary) => Json(summary).into_response(),
        None => error_response(StatusCode::CONFLICT, "scan already running").into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    /// bazarr | plex | kodi | json
    #[serde(default)]
    pub format: Option<String>,
}

/// GET /system/export - subtitle inventory report.
///
/// The named flavors are field-mapping variants of the same report.
pub async fn export(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExportParams>,
) -> impl IntoResponse {
    let flavor = params.format.as_deref().unwrap_or("json");
    if !["bazarr", "plex", "kodi", "json"].contains(&flavor) {
        return error_response(StatusCode::BAD_REQUEST, format!("unknown format {flavor}"))
            .into_response();
    }

    let mut items = Vec::new();
    for library in state.libraries() {
        if let Ok(listed) = library.list_items().await {
            items.extend(listed);
        }
    }

    let entries: Vec<serde_json::Value> = items
        .iter()
        .map(|item| {
            let subtitles: Vec<serde_json::Value> =
                detect_subtitles_for(FsPath::new(&item.file_path))
                    .into_iter()
                    .map(|s| match flavor {
                        "bazarr" => serde_json::json!({
                            "path": s.path.display().to_string(),
                            "language": s.language,
                            "forced": s.forced,
                            "hi": false,
                        }),
                        "plex" | "kodi" => serde_json::json!({
                            "file": s.path.display().to_string(),
                            "lang": s.language,
                        }),
                        _ => serde_json::json!({
                            "path": s.path.display().to_string(),
                            "language": s.language,
                            "format": s.format.extension(),
                            "forced": s.forced,
                        }),
                    })
                    .collect();
            serde_json::json!({
                "title": item.title,
                "file_path": item.file_path,
                "subtitles": subtitles,
            })
        })
        .collect();

    Json(serde_json::json!({ "format": flavor, "items": entries })).into_response()
}

/// GET /metrics (Prometheus text format)
pub async fn metrics() -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        crate::metrics::gather(),
    )
}
