//! Wanted item API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use sublarr_core::{
    ItemKind, PipelineOutcome, SubtitleKind, WantedFilter, WantedItem, WantedStatus,
};

use super::{error_response, WsMessage};
use crate::state::AppState;

const MAX_LIMIT: i64 = 1000;
const DEFAULT_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListWantedParams {
    pub status: Option<String>,
    pub item_type: Option<String>,
    pub series_id: Option<i64>,
    pub subtitle_type: Option<String>,
    pub language: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListWantedResponse {
    pub items: Vec<WantedItem>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

fn build_filter(params: &ListWantedParams) -> Result<WantedFilter, String> {
    let mut filter = WantedFilter::new();
    if let Some(status) = &params.status {
        filter.status =
            Some(WantedStatus::parse(status).ok_or_else(|| format!("unknown status {status}"))?);
    }
    if let Some(item_type) = &params.item_type {
        filter.item_kind =
            Some(ItemKind::parse(item_type).ok_or_else(|| format!("unknown item type {item_type}"))?);
    }
    filter.series_id = params.series_id;
    if let Some(subtitle_type) = &params.subtitle_type {
        filter.subtitle_kind = Some(SubtitleKind::parse(subtitle_type));
    }
    filter.language = params.language.clone();
    filter.limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    filter.offset = params.offset.unwrap_or(0).max(0);
    Ok(filter)
}

/// GET /wanted
pub async fn list_wanted(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListWantedParams>,
) -> impl IntoResponse {
    let filter = match build_filter(&params) {
        Ok(filter) => filter,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e).into_response(),
    };
    let items = match state.wanted_store().list(&filter) {
        Ok(items) => items,
        Err(e) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                .into_response()
        }
    };
    let total = state.wanted_store().count(&filter).unwrap_or(0);
    Json(ListWantedResponse {
        items,
        total,
        limit: filter.limit,
        offset: filter.offset,
    })
    .into_response()
}

/// GET /wanted/summary
pub async fn summary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.wanted_store().summary() {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// POST /wanted/refresh - trigger a library scan.
pub async fn refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.scanner().scan_all().await {
        Some(summary) => Json(summary).into_response(),
        None => error_response(StatusCode::CONFLICT, "scan already running").into_response(),
    }
}

/// POST /wanted/{id}/search - interactive scored candidate listing.
pub async fn search_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.pipeline().search_candidates(id).await {
        Ok(candidates) => Json(serde_json::json!({ "candidates": candidates })).into_response(),
        Err(e) => error_response(StatusCode::NOT_FOUND, e).into_response(),
    }
}

/// POST /wanted/{id}/download - download one chosen candidate from an
/// interactive search (translating source-language picks).
pub async fn download_candidate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(candidate): Json<sublarr_core::SubtitleCandidate>,
) -> impl IntoResponse {
    let outcome = state.pipeline().download_specific(id, &candidate).await;
    let status = match &outcome {
        PipelineOutcome::Found { .. } => StatusCode::OK,
        PipelineOutcome::Failed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::OK,
    };
    (status, Json(outcome)).into_response()
}

/// POST /wanted/{id}/process - run the pipeline for one item now.
pub async fn process_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let outcome = state.pipeline().process_item(id, true).await;
    let status = match &outcome {
        PipelineOutcome::Found { .. }
        | PipelineOutcome::Skipped { .. }
        | PipelineOutcome::WhisperPending { .. } => StatusCode::OK,
        PipelineOutcome::Failed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status, Json(outcome)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct BatchSearchBody {
    pub item_ids: Vec<i64>,
}

/// POST /wanted/batch-search
pub async fn batch_search(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BatchSearchBody>,
) -> impl IntoResponse {
    if body.item_ids.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "item_ids is empty").into_response();
    }
    let batch_id = Uuid::new_v4().to_string();
    run_batch(state, batch_id.clone(), body.item_ids);
    Json(serde_json::json!({ "batch_id": batch_id })).into_response()
}

/// POST /wanted/search-all - batch over every due wanted item.
pub async fn search_all(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let items = match state
        .wanted_store()
        .list(&WantedFilter::new().with_status(WantedStatus::Wanted).with_limit(MAX_LIMIT))
    {
        Ok(items) => items,
        Err(e) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                .into_response()
        }
    };
    let batch_id = Uuid::new_v4().to_string();
    let item_ids: Vec<i64> = items.iter().map(|i| i.id).collect();
    run_batch(state, batch_id.clone(), item_ids.clone());
    Json(serde_json::json!({ "batch_id": batch_id, "total": item_ids.len() })).into_response()
}

/// Spawn batch processing with progress events.
fn run_batch(state: Arc<AppState>, batch_id: String, item_ids: Vec<i64>) {
    state.batches().start(&batch_id, item_ids.len());
    tokio::spawn(async move {
        let mut completed = 0usize;
        let mut failed = 0usize;
        for item_id in item_ids {
            state.batches().set_current(&batch_id, &item_id.to_string());
            let outcome = state.pipeline().process_item(item_id, true).await;
            let success = matches!(outcome, PipelineOutcome::Found { .. });
            if success {
                completed += 1;
            } else {
                failed += 1;
            }
            if let Some(progress) = state.batches().record(&batch_id, success) {
                state
                    .ws_broadcaster()
                    .broadcast(WsMessage::WantedBatchProgress { batch: progress });
            }
        }
        state
            .ws_broadcaster()
            .broadcast(WsMessage::WantedBatchCompleted {
                batch_id: batch_id.clone(),
                completed,
                failed,
            });
        warn!(
            "Wanted batch {batch_id} finished: {completed} found, {failed} without result"
        );
    });
}

/// DELETE /wanted/{id}
pub async fn delete_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.wanted_store().delete(id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, format!("item {id}")).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// POST /wanted/{id}/ignore - sticky opt-out.
pub async fn ignore_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state
        .wanted_store()
        .update_status(id, WantedStatus::Ignored, None)
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

/// GET /wanted/batch-status
pub async fn batch_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({ "batches": state.batches().all() }))
}
