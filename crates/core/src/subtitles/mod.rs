//! Subtitle parsing, probing and file conventions.
//!
//! SRT and ASS documents are modeled just deeply enough for translation:
//! timed events with text, ASS styles and override tags, and the container
//! probing needed to find embedded streams.

mod ass;
mod naming;
mod probe;
mod quality;
mod srt;

pub use ass::{
    classify_styles, extract_tags, fix_line_breaks, format_ass_time, parse_ass_time, restore_tags,
    AssEvent, AssFile, StyleClass, TagSpan,
};
pub use naming::{
    detect_existing_target, detect_subtitles_for, find_external_source_sub, language_tags,
    sidecar_path, ExistingTarget, SidecarSubtitle,
};
pub use probe::{
    extract_subtitle_stream, has_target_language_audio, has_target_language_stream, run_ffprobe,
    select_best_subtitle_stream, ProbeData, ProbeStream, StreamChoice,
};
pub use quality::{
    check_translation_quality, validate_translation_output, QualityReport, ValidationOutcome,
};
pub use srt::{strip_hi_markers, strip_inline_markup, SrtEntry};

use thiserror::Error;

/// Subtitle file format, ranked for scoring (ASS best).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    Ass,
    Ssa,
    Srt,
    Vtt,
    Unknown,
}

impl SubtitleFormat {
    /// Sort rank: lower is better.
    pub fn rank(&self) -> u8 {
        match self {
            SubtitleFormat::Ass => 0,
            SubtitleFormat::Ssa => 1,
            SubtitleFormat::Srt => 2,
            SubtitleFormat::Vtt => 3,
            SubtitleFormat::Unknown => 4,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SubtitleFormat::Ass => "ass",
            SubtitleFormat::Ssa => "ssa",
            SubtitleFormat::Srt => "srt",
            SubtitleFormat::Vtt => "vtt",
            SubtitleFormat::Unknown => "sub",
        }
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "ass" => SubtitleFormat::Ass,
            "ssa" => SubtitleFormat::Ssa,
            "srt" => SubtitleFormat::Srt,
            "vtt" => SubtitleFormat::Vtt,
            _ => SubtitleFormat::Unknown,
        }
    }

    pub fn from_path(path: &std::path::Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(SubtitleFormat::Unknown)
    }
}

/// Errors raised by subtitle parsing and stream extraction.
#[derive(Debug, Error)]
pub enum SubtitleError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No usable subtitle stream in {0}")]
    NoStream(String),

    #[error("ffprobe/ffmpeg failed: {0}")]
    Tool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
