//! Translation job API handlers.

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use sublarr_core::{is_within, JobStatus, TranslateOutcome, WorkItem};

use super::{error_response, WsMessage};
use crate::metrics::TRANSLATION_JOBS_TOTAL;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TranslateBody {
    pub file_path: String,
    #[serde(default)]
    pub target_language: Option<String>,
}

fn resolve_target(state: &AppState, body: &TranslateBody) -> String {
    body.target_language
        .clone()
        .unwrap_or_else(|| state.settings().get_string("translation.target_language", "de"))
}

fn check_path(state: &AppState, file_path: &str) -> Result<(), (StatusCode, String)> {
    let path = FsPath::new(file_path);
    if !is_within(path, state.media_root()) {
        return Err((
            StatusCode::FORBIDDEN,
            format!("{file_path} is outside the media root"),
        ));
    }
    if !path.exists() {
        return Err((StatusCode::NOT_FOUND, format!("{file_path} does not exist")));
    }
    Ok(())
}

/// POST /translate - async, returns a work id.
pub async fn translate_async(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TranslateBody>,
) -> impl IntoResponse {
    if let Err((status, message)) = check_path(&state, &body.file_path) {
        return error_response(status, message).into_response();
    }
    let target = resolve_target(&state, &body);
    let item = WorkItem::TranslateFile {
        file_path: body.file_path.clone(),
        target_language: target,
    };
    match state.queue() {
        Some(queue) => match queue.enqueue(item).await {
            Ok(work_id) => (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({ "work_id": work_id })),
            )
                .into_response(),
            Err(e) => {
                error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
            }
        },
        None => {
            // No queue registered: run detached.
            let work_id = Uuid::new_v4().to_string();
            let state = Arc::clone(&state);
            let file_path = body.file_path.clone();
            let target = resolve_target(&state, &body);
            tokio::spawn(async move {
                run_translation(&state, &file_path, &target).await;
            });
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({ "work_id": work_id })),
            )
                .into_response()
        }
    }
}

/// POST /translate/sync - blocks until the waterfall finishes.
pub async fn translate_sync(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TranslateBody>,
) -> impl IntoResponse {
    if let Err((status, message)) = check_path(&state, &body.file_path) {
        return error_response(status, message).into_response();
    }
    let target = resolve_target(&state, &body);
    let outcome = run_translation(&state, &body.file_path, &target).await;
    let status = match &outcome {
        TranslateOutcome::Failed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::OK,
    };
    (status, Json(outcome)).into_response()
}

/// Shared execution path for sync and detached translation runs.
pub async fn run_translation(
    state: &AppState,
    file_path: &str,
    target_language: &str,
) -> TranslateOutcome {
    let outcome = state
        .translator()
        .translate_file(FsPath::new(file_path), target_language, None)
        .await;
    let (status_label, output_path) = match &outcome {
        TranslateOutcome::Success { output_path, .. } => ("completed", Some(output_path.clone())),
        TranslateOutcome::Skipped { .. } => ("skipped", None),
        TranslateOutcome::WhisperPending { .. } => ("whisper_pending", None),
        TranslateOutcome::Failed { .. } => ("failed", None),
    };
    TRANSLATION_JOBS_TOTAL
        .with_label_values(&[status_label])
        .inc();
    state.ws_broadcaster().broadcast(WsMessage::JobUpdate {
        job_id: file_path.to_string(),
        status: status_label.to_string(),
        output_path,
    });
    outcome
}

/// GET /status/{job_id}
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match state.job_store().get(&job_id) {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("job {job_id}")).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /jobs
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> impl IntoResponse {
    let status = match params.status.as_deref() {
        Some(s) => match JobStatus::parse(s) {
            Some(status) => Some(status),
            None => {
                return error_response(StatusCode::BAD_REQUEST, format!("unknown status {s}"))
                    .into_response()
            }
        },
        None => None,
    };
    match state.job_store().list(
        status,
        params.limit.unwrap_or(100).clamp(1, 1000),
        params.offset.unwrap_or(0).max(0),
    ) {
        Ok(jobs) => Json(serde_json::json!({ "jobs": jobs })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// POST /jobs/{id}/retry - re-run a failed job's file.
pub async fn retry_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let job = match state.job_store().get(&job_id) {
        Ok(Some(job)) => job,
        Ok(None) => {
            return error_response(StatusCode::NOT_FOUND, format!("job {job_id}")).into_response()
        }
        Err(e) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                .into_response()
        }
    };
    if job.status != JobStatus::Failed {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("job is {}, only failed jobs retry", job.status.as_str()),
        )
        .into_response();
    }
    let target = state.settings().get_string("translation.target_language", "de");
    let outcome = run_translation(&state, &job.file_path, &target).await;
    (StatusCode::OK, Json(outcome)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct BatchTranslateBody {
    pub file_paths: Vec<String>,
    #[serde(default)]
    pub target_language: Option<String>,
}

/// POST /batch
pub async fn batch_translate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BatchTranslateBody>,
) -> impl IntoResponse {
    if body.file_paths.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "file_paths is empty").into_response();
    }
    for path in &body.file_paths {
        if let Err((status, message)) = check_path(&state, path) {
            return error_response(status, message).into_response();
        }
    }
    let target = body
        .target_language
        .clone()
        .unwrap_or_else(|| state.settings().get_string("translation.target_language", "de"));
    let batch_id = Uuid::new_v4().to_string();
    state.batches().start(&batch_id, body.file_paths.len());

    let state_bg = Arc::clone(&state);
    let batch_bg = batch_id.clone();
    tokio::spawn(async move {
        let mut completed = 0usize;
        let mut failed = 0usize;
        for file_path in body.file_paths {
            state_bg.batches().set_current(&batch_bg, &file_path);
            let outcome = run_translation(&state_bg, &file_path, &target).await;
            let success = !matches!(outcome, TranslateOutcome::Failed { .. });
            if success {
                completed += 1;
            } else {
                failed += 1;
            }
            if let Some(progress) = state_bg.batches().record(&batch_bg, success) {
                state_bg
                    .ws_broadcaster()
                    .broadcast(WsMessage::BatchProgress { batch: progress });
            }
        }
        state_bg
            .ws_broadcaster()
            .broadcast(WsMessage::BatchCompleted {
                batch_id: batch_bg,
                completed,
                failed,
            });
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "batch_id": batch_id })),
    )
        .into_response()
}

/// GET /batch/status
pub async fn batch_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({ "batches": state.batches().all() }))
}

/// GET /retranslate/status - jobs outdated by config changes.
pub async fn retranslate_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let chain = default_chain(&state);
    let target = state.settings().get_string("translation.target_language", "de");
    let current_hash = state.translation_manager().config_hash(&chain, &target, &[]);
    match state.job_store().outdated_jobs(&current_hash) {
        Ok(jobs) => Json(serde_json::json!({
            "current_hash": current_hash,
            "outdated": jobs,
        }))
        .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// POST /retranslate/{id}
pub async fn retranslate_one(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let job = match state.job_store().get(&job_id) {
        Ok(Some(job)) => job,
        Ok(None) => {
            return error_response(StatusCode::NOT_FOUND, format!("job {job_id}")).into_response()
        }
        Err(e) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                .into_response()
        }
    };
    let target = state.settings().get_string("translation.target_language", "de");
    let outcome = run_translation(&state, &job.file_path, &target).await;
    (StatusCode::OK, Json(outcome)).into_response()
}

/// POST /retranslate/batch - re-run every outdated job.
pub async fn retranslate_batch(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let chain = default_chain(&state);
    let target = state.settings().get_string("translation.target_language", "de");
    let current_hash = state.translation_manager().config_hash(&chain, &target, &[]);
    let outdated = match state.job_store().outdated_jobs(&current_hash) {
        Ok(jobs) => jobs,
        Err(e) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                .into_response()
        }
    };
    let batch_id = Uuid::new_v4().to_string();
    state.batches().start(&batch_id, outdated.len());
    info!("Re-translation batch {batch_id}: {} outdated job(s)", outdated.len());

    let state_bg = Arc::clone(&state);
    let batch_bg = batch_id.clone();
    tokio::spawn(async move {
        let mut completed = 0usize;
        let mut failed = 0usize;
        for job in outdated {
            state_bg.batches().set_current(&batch_bg, &job.file_path);
            let outcome = run_translation(&state_bg, &job.file_path, &target).await;
            let success = !matches!(outcome, TranslateOutcome::Failed { .. });
            if success {
                completed += 1;
            } else {
                failed += 1;
            }
            if let Some(progress) = state_bg.batches().record(&batch_bg, success) {
                state_bg
                    .ws_broadcaster()
                    .broadcast(WsMessage::RetranslationProgress { batch: progress });
            }
        }
        state_bg
            .ws_broadcaster()
            .broadcast(WsMessage::RetranslationCompleted {
                batch_id: batch_bg,
                completed,
                failed,
            });
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "batch_id": batch_id })),
    )
        .into_response()
}

fn default_chain(state: &AppState) -> Vec<String> {
    state
        .translation_store()
        .effective_profile("series", None)
        .ok()
        .flatten()
        .map(|p| p.fallback_chain)
        .unwrap_or_else(|| vec![state.settings().get_string("translation.backend", "ollama")])
}
