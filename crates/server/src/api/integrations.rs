//! External-integration endpoints: Bazarr mapping report, Plex/Kodi
//! compatibility checks, aggregated extended health, and config export
//! (single format or ZIP bundle).

use std::path::{Path as FsPath, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::warn;

use sublarr_core::{
    batch_check_compatibility, check_compatibility, generate_mapping_report, is_within,
    CompatTarget,
};

use super::error_response;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Bazarr mapping report
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MappingReportBody {
    pub db_path: String,
}

/// POST /integrations/bazarr/mapping-report
///
/// Read-only inspection of a Bazarr database; the path must live under the
/// config directory or the media root.
pub async fn bazarr_mapping_report(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MappingReportBody>,
) -> impl IntoResponse {
    if body.db_path.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "db_path is required").into_response();
    }
    let db_path = FsPath::new(&body.db_path);
    let config_dir = &state.config().media.config_dir;
    if !is_within(db_path, state.media_root()) && !is_within(db_path, config_dir) {
        return error_response(
            StatusCode::FORBIDDEN,
            "db_path must be under the config directory or the media root",
        )
        .into_response();
    }
    if !db_path.is_file() {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("file not found: {}", body.db_path),
        )
        .into_response();
    }
    match generate_mapping_report(db_path) {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("mapping report failed: {e}"),
        )
        .into_response(),
    }
}

// ---------------------------------------------------------------------------
// Plex/Kodi compatibility checks
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CompatBatchBody {
    pub subtitle_paths: Vec<String>,
    pub video_path: String,
    pub target: CompatTarget,
}

/// POST /integrations/compat-check
pub async fn compat_check_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CompatBatchBody>,
) -> impl IntoResponse {
    if body.subtitle_paths.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "subtitle_paths is required")
            .into_response();
    }
    if body.video_path.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "video_path is required").into_response();
    }
    for raw in body.subtitle_paths.iter().chain([&body.video_path]) {
        if !is_within(FsPath::new(raw), state.media_root()) {
            return error_response(
                StatusCode::FORBIDDEN,
                format!("{raw} is outside the media root"),
            )
            .into_response();
        }
    }
    let subtitles: Vec<PathBuf> = body.subtitle_paths.iter().map(PathBuf::from).collect();
    let reports =
        batch_check_compatibility(&subtitles, FsPath::new(&body.video_path), body.target);
    let compatible = reports.iter().filter(|r| r.compatible).count();
    Json(serde_json::json!({
        "target": body.target.as_str(),
        "checked": reports.len(),
        "compatible": compatible,
        "reports": reports,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct CompatSingleBody {
    pub subtitle_path: String,
    pub video_path: String,
    pub target: CompatTarget,
}

/// POST /integrations/compat-check/single
pub async fn compat_check_single(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CompatSingleBody>,
) -> impl IntoResponse {
    if body.subtitle_path.is_empty() || body.video_path.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "subtitle_path and video_path are required",
        )
        .into_response();
    }
    for raw in [&body.subtitle_path, &body.video_path] {
        if !is_within(FsPath::new(raw), state.media_root()) {
            return error_response(
                StatusCode::FORBIDDEN,
                format!("{raw} is outside the media root"),
            )
            .into_response();
        }
    }
    Json(check_compatibility(
        FsPath::new(&body.subtitle_path),
        FsPath::new(&body.video_path),
        body.target,
    ))
    .into_response()
}

// ---------------------------------------------------------------------------
// Aggregated extended health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub name: String,
    pub kind: String,
    pub healthy: bool,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn timed<F, E>(name: &str, kind: &str, check: F) -> ServiceHealth
where
    F: std::future::Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let started = Instant::now();
    let result = check.await;
    ServiceHealth {
        name: name.to_string(),
        kind: kind.to_string(),
        healthy: result.is_ok(),
        response_time_ms: started.elapsed().as_millis() as u64,
        error: result.err().map(|e| e.to_string()),
    }
}

/// GET /integrations/health/all
///
/// Extended health across every configured external service: library
/// managers, media servers, subtitle providers, translation backends and
/// Whisper, each with its observed response time.
pub async fn health_all(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut services = Vec::new();

    for library in state.libraries() {
        services.push(timed(library.name(), "library", library.health_check()).await);
    }
    for server in state.media_servers() {
        services.push(timed(server.name(), "media_server", server.health_check()).await);
    }
    {
        let registry = state.provider_manager().registry();
        for name in registry.names() {
            let Some(provider) = registry.get(&name) else {
                continue;
            };
            services.push(timed(&name, "provider", provider.health_check()).await);
        }
    }
    for name in sublarr_core::KNOWN_BACKENDS {
        let Some(backend) = state.translation_manager().backend(name) else {
            continue;
        };
        services.push(timed(name, "translation_backend", backend.health_check()).await);
    }
    if let Some(whisper) = state.whisper() {
        services.push(timed("whisper", "transcription", whisper.health_check()).await);
    }

    let healthy = services.iter().filter(|s| s.healthy).count();
    Json(serde_json::json!({
        "total": services.len(),
        "healthy": healthy,
        "services": services,
    }))
}

// ---------------------------------------------------------------------------
// Config export (single format and ZIP bundle)
// ---------------------------------------------------------------------------

const EXPORT_FORMATS: &[&str] = &["bazarr", "plex", "kodi", "json"];

#[derive(Debug, Deserialize)]
pub struct ExportBody {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub include_secrets: bool,
}

fn is_secret_key(key: &str) -> bool {
    ["api_key", "password", "token"].iter().any(|m| key.contains(m))
}

/// Render the configuration in one export flavor. The named flavors are
/// field-mapping variants of the same settings + profiles payload.
fn render_export(state: &AppState, flavor: &str, include_secrets: bool) -> serde_json::Value {
    let settings: serde_json::Map<String, serde_json::Value> = state
        .settings()
        .get_prefixed("")
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| {
            let value = if include_secrets || !is_secret_key(&k) {
                v
            } else {
                "REDACTED".to_string()
            };
            (k, serde_json::Value::String(value))
        })
        .collect();
    let profiles = state
        .translation_store()
        .profile_list()
        .unwrap_or_default();

    match flavor {
        "bazarr" => serde_json::json!({
            "format": "bazarr",
            "languages_profiles": profiles.iter().map(|p| serde_json::json!({
                "name": p.name,
                "items": p.target_languages.iter().map(|l| serde_json::json!({
                    "language": l,
                    "forced": p.forced_preference != sublarr_core::ForcedPreference::Disabled,
                })).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
            "settings": settings,
        }),
        "plex" | "kodi" => serde_json::json!({
            "format": flavor,
            "subtitle_languages": profiles
                .iter()
                .flat_map(|p| p.target_languages.iter().cloned())
                .collect::<std::collections::BTreeSet<_>>(),
            "settings": settings,
        }),
        _ => serde_json::json!({
            "format": "json",
            "profiles": profiles,
            "settings": settings,
        }),
    }
}

/// POST /integrations/export
pub async fn export_config(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExportBody>,
) -> impl IntoResponse {
    let flavor = body.format.as_deref().unwrap_or("json");
    if !EXPORT_FORMATS.contains(&flavor) {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("unknown format {flavor}; supported: {}", EXPORT_FORMATS.join(", ")),
        )
        .into_response();
    }
    Json(render_export(&state, flavor, body.include_secrets)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ExportZipBody {
    pub formats: Vec<String>,
    #[serde(default)]
    pub include_secrets: bool,
}

/// POST /integrations/export/zip
///
/// Bundle several export flavors into one ZIP, returned as a download.
/// The archive is assembled with the `zip` CLI in a temp directory.
pub async fn export_zip(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExportZipBody>,
) -> impl IntoResponse {
    if body.formats.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "formats is required").into_response();
    }
    for flavor in &body.formats {
        if !EXPORT_FORMATS.contains(&flavor.as_str()) {
            return error_response(StatusCode::BAD_REQUEST, format!("unknown format {flavor}"))
                .into_response();
        }
    }

    let dir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                .into_response()
        }
    };
    let mut files = Vec::new();
    for flavor in &body.formats {
        let rendered = render_export(&state, flavor, body.include_secrets);
        let file = dir.path().join(format!("sublarr_{flavor}.json"));
        let payload = serde_json::to_vec_pretty(&rendered).unwrap_or_default();
        if let Err(e) = std::fs::write(&file, payload) {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                .into_response();
        }
        files.push(file);
    }

    let zip_path = dir.path().join("sublarr_export.zip");
    let output = Command::new("zip")
        .arg("-j")
        .arg(&zip_path)
        .args(&files)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await;
    let zip_bytes = match output {
        Ok(output) if output.status.success() => match std::fs::read(&zip_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                    .into_response()
            }
        },
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("zip failed: {}", stderr.trim());
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("zip failed: {}", stderr.trim()),
            )
            .into_response();
        }
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to run zip: {e}"),
            )
            .into_response()
        }
    };

    (
        [
            ("content-type", "application/zip".to_string()),
            (
                "content-disposition",
                "attachment; filename=sublarr_export.zip".to_string(),
            ),
        ],
        zip_bytes,
    )
        .into_response()
}
