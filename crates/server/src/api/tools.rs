//! In-place subtitle tools.
//!
//! Each tool mutates at most one subtitle file (`.srt`, `.ass` or `.ssa`),
//! creates a `.bak` sibling first, and is contained to the media root.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use sublarr_core::subtitles::{
    classify_styles, extract_tags, fix_line_breaks, format_ass_time, parse_ass_time, restore_tags,
    strip_hi_markers, AssFile, SrtEntry, StyleClass,
};
use sublarr_core::{create_backup, is_within, SubtitleFormat};

use super::error_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ToolBody {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct TimingBody {
    pub path: String,
    /// Shift in milliseconds; negative shifts earlier.
    pub offset_ms: i64,
}

type ToolError = (StatusCode, String);

fn checked_subtitle_path(state: &AppState, path: &str) -> Result<(PathBuf, SubtitleFormat), ToolError> {
    let path = PathBuf::from(path);
    if !is_within(&path, state.media_root()) {
        return Err((
            StatusCode::FORBIDDEN,
            format!("{} is outside the media root", path.display()),
        ));
    }
    if !path.exists() {
        return Err((StatusCode::NOT_FOUND, format!("{}", path.display())));
    }
    let format = SubtitleFormat::from_path(&path);
    match format {
        SubtitleFormat::Srt | SubtitleFormat::Ass | SubtitleFormat::Ssa => Ok((path, format)),
        _ => Err((
            StatusCode::BAD_REQUEST,
            "only .srt, .ass and .ssa files are supported".to_string(),
        )),
    }
}

fn read_file(path: &FsPath) -> Result<String, ToolError> {
    std::fs::read_to_string(path).map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

fn load_srt(path: &FsPath) -> Result<Vec<SrtEntry>, ToolError> {
    SrtEntry::parse(&read_file(path)?)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
}

fn load_ass(path: &FsPath) -> Result<AssFile, ToolError> {
    AssFile::parse(&read_file(path)?)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
}

/// Back up the original, then atomically replace it with `rendered`.
fn write_back(path: &FsPath, rendered: &str) -> Result<PathBuf, ToolError> {
    let backup =
        create_backup(path).map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    sublarr_core::atomic_write(path, rendered.as_bytes())
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(backup)
}

/// Strip HI markers from dialog events, preserving override tags and
/// signs/songs events. Returns how many events were emptied out.
fn remove_hi_from_ass(file: &mut AssFile) -> usize {
    let classes = classify_styles(file);
    let mut emptied = 0;
    for event in &mut file.events {
        if event.is_comment() || classes.get(&event.style) != Some(&StyleClass::Dialog) {
            continue;
        }
        let (clean, spans) = extract_tags(&event.text);
        let stripped = strip_hi_markers(&clean.replace("\\N", "\n")).replace('\n', "\\N");
        if stripped == clean {
            continue;
        }
        if stripped.trim().is_empty() && !clean.trim().is_empty() {
            emptied += 1;
        }
        event.text = restore_tags(&stripped, &spans, clean.chars().count());
    }
    emptied
}

/// POST /tools/remove-hi
pub async fn remove_hi(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ToolBody>,
) -> impl IntoResponse {
    let (path, format) = match checked_subtitle_path(&state, &body.path) {
        Ok(checked) => checked,
        Err((status, message)) => return error_response(status, message).into_response(),
    };

    let result = match format {
        SubtitleFormat::Srt => {
            let mut entries = match load_srt(&path) {
                Ok(entries) => entries,
                Err(e) => return error_response(e.0, e.1).into_response(),
            };
            let before = entries.len();
            for entry in &mut entries {
                entry.text = strip_hi_markers(&entry.text);
            }
            entries.retain(|e| !e.text.trim().is_empty());
            write_back(&path, &SrtEntry::render(&entries))
                .map(|backup| (backup, before - entries.len(), entries.len()))
        }
        _ => {
            let mut file = match load_ass(&path) {
                Ok(file) => file,
                Err(e) => return error_response(e.0, e.1).into_response(),
            };
            let emptied = remove_hi_from_ass(&mut file);
            let remaining = file.events.len() - emptied;
            write_back(&path, &file.render()).map(|backup| (backup, emptied, remaining))
        }
    };

    match result {
        Ok((backup, removed, remaining)) => Json(serde_json::json!({
            "path": path.display().to_string(),
            "backup": backup.display().to_string(),
            "cues_removed": removed,
            "cues_remaining": remaining,
        }))
        .into_response(),
        Err((status, message)) => error_response(status, message).into_response(),
    }
}

/// POST /tools/adjust-timing
pub async fn adjust_timing(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TimingBody>,
) -> impl IntoResponse {
    let (path, format) = match checked_subtitle_path(&state, &body.path) {
        Ok(checked) => checked,
        Err((status, message)) => return error_response(status, message).into_response(),
    };

    let result = match format {
        SubtitleFormat::Srt => {
            let mut entries = match load_srt(&path) {
                Ok(entries) => entries,
                Err(e) => return error_response(e.0, e.1).into_response(),
            };
            for entry in &mut entries {
                entry.start_ms = entry.start_ms.saturating_add_signed(body.offset_ms);
                entry.end_ms = entry.end_ms.saturating_add_signed(body.offset_ms);
            }
            let shifted = entries.len();
            write_back(&path, &SrtEntry::render(&entries)).map(|backup| (backup, shifted))
        }
        _ => {
            let mut file = match load_ass(&path) {
                Ok(file) => file,
                Err(e) => return error_response(e.0, e.1).into_response(),
            };
            let shifted = file.shift_times(body.offset_ms);
            write_back(&path, &file.render()).map(|backup| (backup, shifted))
        }
    };

    match result {
        Ok((backup, shifted)) => Json(serde_json::json!({
            "path": path.display().to_string(),
            "backup": backup.display().to_string(),
            "offset_ms": body.offset_ms,
            "cues": shifted,
        }))
        .into_response(),
        Err((status, message)) => error_response(status, message).into_response(),
    }
}

fn tidy_lines(text: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect();
    let mut deduped: Vec<String> = Vec::new();
    for line in lines {
        if deduped.last() != Some(&line) {
            deduped.push(line);
        }
    }
    deduped.join("\n")
}

/// POST /tools/common-fixes - strip empty cues, collapse duplicate
/// consecutive lines, normalize whitespace and line breaks.
pub async fn common_fixes(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ToolBody>,
) -> impl IntoResponse {
    let (path, format) = match checked_subtitle_path(&state, &body.path) {
        Ok(checked) => checked,
        Err((status, message)) => return error_response(status, message).into_response(),
    };

    let result = match format {
        SubtitleFormat::Srt => {
            let mut entries = match load_srt(&path) {
                Ok(entries) => entries,
                Err(e) => return error_response(e.0, e.1).into_response(),
            };
            let before = entries.len();
            for entry in &mut entries {
                entry.text = tidy_lines(&entry.text);
            }
            entries.retain(|e| !e.text.is_empty());
            write_back(&path, &SrtEntry::render(&entries))
                .map(|backup| (backup, before - entries.len()))
        }
        _ => {
            let mut file = match load_ass(&path) {
                Ok(file) => file,
                Err(e) => return error_response(e.0, e.1).into_response(),
            };
            let before = file.events.len();
            for event in &mut file.events {
                if event.is_comment() {
                    continue;
                }
                // Models and bad muxes leave literal newlines and doubled
                // spaces in event text.
                event.text = fix_line_breaks(&event.text);
            }
            file.events
                .retain(|e| e.is_comment() || !e.text.trim().is_empty());
            write_back(&path, &file.render()).map(|backup| (backup, before - file.events.len()))
        }
    };

    match result {
        Ok((backup, removed)) => Json(serde_json::json!({
            "path": path.display().to_string(),
            "backup": backup.display().to_string(),
            "cues_removed": removed,
        }))
        .into_response(),
        Err((status, message)) => error_response(status, message).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    pub path: String,
    pub limit: Option<usize>,
}

/// GET /tools/preview - first cues of a subtitle, read-only.
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PreviewParams>,
) -> impl IntoResponse {
    let (path, format) = match checked_subtitle_path(&state, &params.path) {
        Ok(checked) => checked,
        Err((status, message)) => return error_response(status, message).into_response(),
    };
    let limit = params.limit.unwrap_or(20).min(200);

    match format {
        SubtitleFormat::Srt => {
            let entries = match load_srt(&path) {
                Ok(entries) => entries,
                Err(e) => return error_response(e.0, e.1).into_response(),
            };
            let cues: Vec<serde_json::Value> = entries
                .iter()
                .take(limit)
                .map(|e| {
                    serde_json::json!({
                        "start": SrtEntry::format_timestamp(e.start_ms),
                        "end": SrtEntry::format_timestamp(e.end_ms),
                        "text": e.text,
                    })
                })
                .collect();
            Json(serde_json::json!({ "total": entries.len(), "cues": cues })).into_response()
        }
        _ => {
            let file = match load_ass(&path) {
                Ok(file) => file,
                Err(e) => return error_response(e.0, e.1).into_response(),
            };
            let start_idx = file
                .events_format
                .iter()
                .position(|c| c.eq_ignore_ascii_case("start"))
                .unwrap_or(1);
            let end_idx = file
                .events_format
                .iter()
                .position(|c| c.eq_ignore_ascii_case("end"))
                .unwrap_or(2);
            let dialogue: Vec<_> = file.events.iter().filter(|e| !e.is_comment()).collect();
            let cues: Vec<serde_json::Value> = dialogue
                .iter()
                .take(limit)
                .map(|e| {
                    let ms_of = |idx: usize| {
                        e.fields
                            .get(idx)
                            .and_then(|f| parse_ass_time(f))
                            .unwrap_or(0)
                    };
                    serde_json::json!({
                        "start": format_ass_time(ms_of(start_idx)),
                        "end": format_ass_time(ms_of(end_idx)),
                        "style": e.style,
                        "text": e.text,
                    })
                })
                .collect();
            Json(serde_json::json!({ "total": dialogue.len(), "cues": cues })).into_response()
        }
    }
}
