//! Library inventory, subtitle deletion and trash handlers.

use std::collections::BTreeMap;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use sublarr_core::{detect_subtitles_for, is_within, ItemKind, LibraryItem};

use super::error_response;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct LibraryEntry {
    #[serde(flatten)]
    pub item: LibraryItem,
    pub subtitles: Vec<SubtitleFile>,
}

#[derive(Debug, Serialize)]
pub struct SubtitleFile {
    pub path: String,
    pub language: String,
    pub format: String,
    pub forced: bool,
}

async fn enumerate(state: &AppState) -> Vec<LibraryItem> {
    let mut items = Vec::new();
    for library in state.libraries() {
        if let Ok(listed) = library.list_items().await {
            items.extend(listed);
        }
    }
    items
}

fn with_subtitles(items: Vec<LibraryItem>) -> Vec<LibraryEntry> {
    items
        .into_iter()
        .map(|item| {
            let subtitles = detect_subtitles_for(FsPath::new(&item.file_path))
                .into_iter()
                .map(|s| SubtitleFile {
                    path: s.path.to_string_lossy().to_string(),
                    language: s.language,
                    format: s.format.extension().to_string(),
                    forced: s.forced,
                })
                .collect();
            LibraryEntry { item, subtitles }
        })
        .collect()
}

/// GET /library - series/movies with subtitle presence summary.
pub async fn list_library(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let entries = with_subtitles(enumerate(&state).await);
    let mut series: BTreeMap<i64, Vec<&LibraryEntry>> = BTreeMap::new();
    let mut movies = Vec::new();
    for entry in &entries {
        match entry.item.kind {
            ItemKind::Episode => {
                series
                    .entry(entry.item.series_id.unwrap_or(0))
                    .or_default()
                    .push(entry);
            }
            ItemKind::Movie => movies.push(entry),
        }
    }
    let series_summary: Vec<serde_json::Value> = series
        .iter()
        .map(|(series_id, episodes)| {
            let with_subs = episodes.iter().filter(|e| !e.subtitles.is_empty()).count();
            serde_json::json!({
                "series_id": series_id,
                "title": episodes.first().map(|e| e.item.title.clone()).unwrap_or_default(),
                "episodes": episodes.len(),
                "episodes_with_subtitles": with_subs,
            })
        })
        .collect();
    Json(serde_json::json!({ "series": series_summary, "movies": movies }))
}

/// GET /library/episodes/{id}/subtitles
pub async fn episode_subtitles(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let items = enumerate(&state).await;
    match items
        .into_iter()
        .find(|i| i.kind == ItemKind::Episode && i.id == id)
    {
        Some(item) => {
            let entries = with_subtitles(vec![item]);
            Json(serde_json::json!({ "subtitles": entries[0].subtitles })).into_response()
        }
        None => error_response(StatusCode::NOT_FOUND, format!("episode {id}")).into_response(),
    }
}

/// GET /library/series/{id}/subtitles
pub async fn series_subtitles(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let mut items = Vec::new();
    for library in state.libraries() {
        if let Ok(listed) = library.list_series_items(id).await {
            items.extend(listed);
        }
    }
    Json(serde_json::json!({ "episodes": with_subtitles(items) }))
}

#[derive(Debug, Deserialize)]
pub struct DeleteSubtitlesBody {
    pub paths: Vec<String>,
}

/// DELETE /library/subtitles - soft-delete to trash.
pub async fn delete_subtitles(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DeleteSubtitlesBody>,
) -> impl IntoResponse {
    if body.paths.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "paths is empty").into_response();
    }
    let paths: Vec<PathBuf> = body.paths.iter().map(PathBuf::from).collect();
    for path in &paths {
        if !is_within(path, state.media_root()) {
            return error_response(
                StatusCode::FORBIDDEN,
                format!("{} is outside the media root", path.display()),
            )
            .into_response();
        }
    }
    match state.trash().soft_delete(&paths) {
        Ok(batch) => Json(batch).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchDeleteBody {
    #[serde(default)]
    pub languages: Vec<String>,
}

/// POST /library/series/{id}/subtitles/batch-delete
pub async fn batch_delete_series_subtitles(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<BatchDeleteBody>,
) -> impl IntoResponse {
    let mut items = Vec::new();
    for library in state.libraries() {
        if let Ok(listed) = library.list_series_items(id).await {
            items.extend(listed);
        }
    }
    let mut to_delete = Vec::new();
    for item in &items {
        for sub in detect_subtitles_for(FsPath::new(&item.file_path)) {
            if body.languages.is_empty() || body.languages.contains(&sub.language) {
                to_delete.push(sub.path);
            }
        }
    }
    if to_delete.is_empty() {
        return Json(serde_json::json!({ "deleted": 0 })).into_response();
    }
    match state.trash().soft_delete(&to_delete) {
        Ok(batch) => Json(batch).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// GET /library/trash
pub async fn list_trash(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.trash().list_batches() {
        Ok(batches) => Json(serde_json::json!({ "batches": batches })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// POST /library/trash/{batch_id}/restore
pub async fn restore_trash(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> impl IntoResponse {
    match state.trash().restore(&batch_id) {
        Ok(restored) => Json(serde_json::json!({
            "restored": restored.iter().map(|p| p.display().to_string()).collect::<Vec<_>>()
        }))
        .into_response(),
        Err(sublarr_core::TrashError::BatchNotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, format!("batch {batch_id}")).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// DELETE /library/trash/{batch_id}
pub async fn delete_trash(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> impl IntoResponse {
    match state.trash().delete_batch(&batch_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(sublarr_core::TrashError::BatchNotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, format!("batch {batch_id}")).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// GET /library/history
pub async fn download_history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.history_store().list_downloads(200, 0) {
        Ok(downloads) => Json(serde_json::json!({ "downloads": downloads })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
