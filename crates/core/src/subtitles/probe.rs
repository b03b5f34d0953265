//! Container probing and embedded-stream extraction via ffprobe/ffmpeg.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use super::naming::language_tags;
use super::{SubtitleError, SubtitleFormat};

/// Parsed ffprobe output, reduced to what stream selection needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeData {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
}

/// One stream entry from ffprobe JSON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeStream {
    pub index: i64,
    #[serde(default)]
    pub codec_type: Option<String>,
    #[serde(default)]
    pub codec_name: Option<String>,
    #[serde(default)]
    pub tags: Option<HashMap<String, String>>,
}

impl ProbeStream {
    fn tag(&self, key: &str) -> String {
        self.tags
            .as_ref()
            .and_then(|t| t.get(key))
            .map(|v| v.to_lowercase())
            .unwrap_or_default()
    }

    fn is_subtitle(&self) -> bool {
        self.codec_type.as_deref() == Some("subtitle")
    }

    fn is_audio(&self) -> bool {
        self.codec_type.as_deref() == Some("audio")
    }

    fn codec(&self) -> String {
        self.codec_name
            .as_deref()
            .unwrap_or_default()
            .to_lowercase()
    }
}

/// Run ffprobe and parse the stream list.
pub async fn run_ffprobe(file_path: &Path) -> Result<ProbeData, SubtitleError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
        ])
        .arg(file_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|e| SubtitleError::Tool(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(SubtitleError::Tool(format!(
            "ffprobe exited with {} for {:?}",
            output.status, file_path
        )));
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|e| SubtitleError::Parse(format!("ffprobe JSON: {e}")))
}

/// Whether the container holds a target-language subtitle stream.
///
/// Returns the best embedded format (ASS over SRT) or `None`.
pub fn has_target_language_stream(
    probe: &ProbeData,
    target_language: &str,
) -> Option<SubtitleFormat> {
    let tags = language_tags(target_language);
    let mut has_ass = false;
    let mut has_srt = false;
    for stream in probe.streams.iter().filter(|s| s.is_subtitle()) {
        if !tags.contains(&stream.tag("language")) {
            continue;
        }
        match stream.codec().as_str() {
            "ass" | "ssa" => has_ass = true,
            "subrip" | "srt" | "mov_text" | "webvtt" | "text" => has_srt = true,
            _ => {}
        }
    }
    if has_ass {
        Some(SubtitleFormat::Ass)
    } else if has_srt {
        Some(SubtitleFormat::Srt)
    } else {
        None
    }
}

/// Whether the container has an audio track in the target language.
pub fn has_target_language_audio(probe: &ProbeData, target_language: &str) -> bool {
    let tags = language_tags(target_language);
    probe
        .streams
        .iter()
        .filter(|s| s.is_audio())
        .any(|s| tags.contains(&s.tag("language")))
}

/// A chosen embedded subtitle stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChoice {
    /// Subtitle-relative index (for `-map 0:s:N`).
    pub sub_index: usize,
    /// Absolute stream index in the container.
    pub stream_index: i64,
    pub format: SubtitleFormat,
    pub language: String,
    pub title: String,
}

fn is_signsy(title: &str) -> bool {
    title.contains("sign") || title.contains("song")
}

/// Pick the best source-language subtitle stream.
///
/// ASS streams are preferred over SRT. Within ASS: a "full" titled stream,
/// then a source-language non-signs stream, then any source-language stream,
/// then any non-signs stream that is not target-language. SRT falls back the
/// same way; a target-language SRT is the last resort.
pub fn select_best_subtitle_stream(
    probe: &ProbeData,
    source_language: &str,
    target_language: &str,
    format_filter: Option<SubtitleFormat>,
) -> Option<StreamChoice> {
    let source_tags = language_tags(source_language);
    let target_tags = language_tags(target_language);

    let mut ass_streams = Vec::new();
    let mut srt_streams = Vec::new();
    let mut sub_index = 0usize;

    for stream in probe.streams.iter().filter(|s| s.is_subtitle()) {
        let codec = stream.codec();
        let choice = StreamChoice {
            sub_index,
            stream_index: stream.index,
            format: SubtitleFormat::Unknown,
            language: stream.tag("language"),
            title: stream.tag("title"),
        };
        match codec.as_str() {
            "ass" | "ssa" if format_filter != Some(SubtitleFormat::Srt) => {
                ass_streams.push(StreamChoice {
                    format: SubtitleFormat::Ass,
                    ..choice
                });
            }
            "subrip" | "srt" | "mov_text" | "webvtt" | "text" | "microdvd"
                if format_filter != Some(SubtitleFormat::Ass) =>
            {
                srt_streams.push(StreamChoice {
                    format: SubtitleFormat::Srt,
                    ..choice
                });
            }
            _ => {}
        }
        sub_index += 1;
    }

    // ASS priority ladder.
    if let Some(s) = ass_streams
        .iter()
        .find(|s| s.title.contains("full") && !is_signsy(&s.title))
    {
        debug!("Selected stream {}: '{}' (full ASS)", s.sub_index, s.title);
        return Some(s.clone());
    }
    let src_ass: Vec<&StreamChoice> = ass_streams
        .iter()
        .filter(|s| source_tags.contains(&s.language))
        .collect();
    if let Some(s) = src_ass.iter().find(|s| !is_signsy(&s.title)) {
        return Some((*s).clone());
    }
    if let Some(s) = src_ass.first() {
        return Some((*s).clone());
    }
    if let Some(s) = ass_streams
        .iter()
        .find(|s| !target_tags.contains(&s.language) && !is_signsy(&s.title))
    {
        return Some(s.clone());
    }

    // SRT fallback.
    if let Some(s) = srt_streams
        .iter()
        .find(|s| source_tags.contains(&s.language))
    {
        return Some(s.clone());
    }
    if let Some(s) = srt_streams
        .iter()
        .find(|s| !target_tags.contains(&s.language))
    {
        return Some(s.clone());
    }
    if let Some(s) = srt_streams
        .iter()
        .find(|s| target_tags.contains(&s.language))
    {
        return Some(s.clone());
    }

    // Last resort: any ASS at all.
    ass_streams.first().cloned()
}

/// Extract an embedded subtitle stream to `output_path`.
///
/// The output extension selects the written format; callers pass a tempfile
/// path and own its cleanup.
pub async fn extract_subtitle_stream(
    video: &Path,
    choice: &StreamChoice,
    output_path: &Path,
) -> Result<(), SubtitleError> {
    info!(
        "Extracting subtitle stream {} ({:?}) from {:?}",
        choice.sub_index, choice.format, video
    );
    let output = Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-i"])
        .arg(video)
        .args(["-map", &format!("0:s:{}", choice.sub_index)])
        .arg(output_path)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| SubtitleError::Tool(format!("failed to run ffmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SubtitleError::Tool(format!(
            "ffmpeg extraction failed: {}",
            stderr.trim()
        )));
    }
    Ok(())
}
