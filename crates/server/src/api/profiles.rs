//! Language profile and glossary handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use sublarr_core::{ForcedPreference, LanguageProfile, StoreError};

use super::error_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProfileBody {
    pub name: String,
    pub source_language: String,
    pub target_languages: Vec<String>,
    pub fallback_chain: Vec<String>,
    #[serde(default)]
    pub forced_preference: Option<String>,
}

fn parse_forced(value: &Option<String>) -> ForcedPreference {
    value
        .as_deref()
        .map(ForcedPreference::parse)
        .unwrap_or_default()
}

fn validate_profile(body: &ProfileBody) -> Result<(), String> {
    if body.name.trim().is_empty() {
        return Err("name is empty".to_string());
    }
    if body.target_languages.is_empty() {
        return Err("target_languages is empty".to_string());
    }
    if body.fallback_chain.is_empty() {
        return Err("fallback_chain is empty".to_string());
    }
    for backend in &body.fallback_chain {
        if !sublarr_core::KNOWN_BACKENDS.contains(&backend.as_str()) {
            return Err(format!("unknown backend {backend}"));
        }
    }
    Ok(())
}

/// GET /profiles
pub async fn list_profiles(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.translation_store().profile_list() {
        Ok(profiles) => Json(serde_json::json!({ "profiles": profiles })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// POST /profiles
pub async fn create_profile(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProfileBody>,
) -> impl IntoResponse {
    if let Err(e) = validate_profile(&body) {
        return error_response(StatusCode::BAD_REQUEST, e).into_response();
    }
    match state.translation_store().profile_create(
        &body.name,
        &body.source_language,
        &body.target_languages,
        &body.fallback_chain,
        parse_forced(&body.forced_preference),
    ) {
        Ok(profile) => (StatusCode::CREATED, Json(profile)).into_response(),
        Err(StoreError::Conflict(_)) => {
            error_response(StatusCode::CONFLICT, format!("profile {} exists", body.name))
                .into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// PUT /profiles/{id}
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<ProfileBody>,
) -> impl IntoResponse {
    if let Err(e) = validate_profile(&body) {
        return error_response(StatusCode::BAD_REQUEST, e).into_response();
    }
    let profile = LanguageProfile {
        id,
        name: body.name.clone(),
        source_language: body.source_language.clone(),
        target_languages: body.target_languages.clone(),
        fallback_chain: body.fallback_chain.clone(),
        forced_preference: parse_forced(&body.forced_preference),
        updated_at: chrono::Utc::now(),
    };
    match state.translation_store().profile_update(&profile) {
        Ok(()) => Json(profile).into_response(),
        Err(StoreError::NotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, format!("profile {id}")).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// DELETE /profiles/{id}
pub async fn delete_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.translation_store().profile_delete(id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(
            StatusCode::BAD_REQUEST,
            "profile not found or is the default profile",
        )
        .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignBody {
    /// "series" or "movie".
    pub item_kind: String,
    pub item_id: i64,
}

/// POST /profiles/{id}/assign
pub async fn assign_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<AssignBody>,
) -> impl IntoResponse {
    if body.item_kind != "series" && body.item_kind != "movie" {
        return error_response(StatusCode::BAD_REQUEST, "item_kind must be series or movie")
            .into_response();
    }
    match state.translation_store().profile_get(id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(StatusCode::NOT_FOUND, format!("profile {id}")).into_response()
        }
        Err(e) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                .into_response()
        }
    }
    match state
        .translation_store()
        .profile_assign(&body.item_kind, body.item_id, id)
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct GlossaryParams {
    pub series_id: Option<i64>,
    /// When set, return the capped per-series merge instead of a raw list.
    #[serde(default)]
    pub merged: bool,
}

/// GET /glossary
pub async fn list_glossary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GlossaryParams>,
) -> impl IntoResponse {
    let result = if params.merged {
        state.translation_store().glossary_merged(params.series_id)
    } else {
        state.translation_store().glossary_list(params.series_id)
    };
    match result {
        Ok(entries) => Json(serde_json::json!({ "entries": entries })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct GlossaryBody {
    #[serde(default)]
    pub series_id: Option<i64>,
    pub source_term: String,
    pub target_term: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// POST /glossary
pub async fn add_glossary(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GlossaryBody>,
) -> impl IntoResponse {
    if body.source_term.trim().is_empty() || body.target_term.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "terms must be non-empty").into_response();
    }
    match state.translation_store().glossary_add(
        body.series_id,
        body.source_term.trim(),
        body.target_term.trim(),
        body.notes.as_deref(),
    ) {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// DELETE /glossary/{id}
pub async fn delete_glossary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.translation_store().glossary_delete(id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, format!("entry {id}")).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
