//! Sidecar naming conventions and on-disk target detection.
//!
//! Sidecars follow `<base>.<lang>.<ext>` for full subtitles and
//! `<base>.<lang>.forced.<ext>` for forced ones.

use std::path::{Path, PathBuf};

use super::SubtitleFormat;

/// All filename tags accepted for a language: the two-letter code, the
/// ISO 639-3 code, the bibliographic variant where it differs, and the
/// lowercase English name.
pub fn language_tags(code: &str) -> Vec<String> {
    let code = code.to_ascii_lowercase();
    let mut tags = vec![code.clone()];

    if let Some(lang) = isolang::Language::from_639_1(&code) {
        let three = lang.to_639_3().to_string();
        if !tags.contains(&three) {
            tags.push(three);
        }
        let name = lang.to_name().to_ascii_lowercase();
        if !tags.contains(&name) {
            tags.push(name);
        }
    }

    // ISO 639-2/B bibliographic codes that differ from the 639-3 code.
    let biblio = match code.as_str() {
        "de" => Some("ger"),
        "fr" => Some("fre"),
        "nl" => Some("dut"),
        "cs" => Some("cze"),
        "el" => Some("gre"),
        "zh" => Some("chi"),
        "fa" => Some("per"),
        "ro" => Some("rum"),
        "sk" => Some("slo"),
        _ => None,
    };
    if let Some(b) = biblio {
        let b = b.to_string();
        if !tags.contains(&b) {
            tags.push(b);
        }
    }
    tags
}

/// Base path of a video file with its extension removed.
fn base_path(video: &Path) -> PathBuf {
    video.with_extension("")
}

/// Sidecar path for `(video, language, forced, format)`.
pub fn sidecar_path(
    video: &Path,
    language: &str,
    forced: bool,
    format: SubtitleFormat,
) -> PathBuf {
    let base = base_path(video);
    let name = if forced {
        format!(
            "{}.{}.forced.{}",
            base.display(),
            language,
            format.extension()
        )
    } else {
        format!("{}.{}.{}", base.display(), language, format.extension())
    };
    PathBuf::from(name)
}

/// A target-language subtitle found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingTarget {
    pub path: PathBuf,
    pub format: SubtitleFormat,
}

/// Look for an existing target-language sidecar next to the video.
///
/// Checks every alias tag of the language, preferring `.ass` over `.srt`.
/// For forced subtitles only `.<lang>.forced.<ext>` names are checked.
pub fn detect_existing_target(
    video: &Path,
    target_language: &str,
    forced: bool,
) -> Option<ExistingTarget> {
    let tags = language_tags(target_language);
    for format in [SubtitleFormat::Ass, SubtitleFormat::Srt] {
        for tag in &tags {
            let candidate = sidecar_path(video, tag, forced, format);
            if candidate.is_file() {
                return Some(ExistingTarget {
                    path: candidate,
                    format,
                });
            }
        }
    }
    None
}

/// A subtitle sidecar discovered next to a video.
#[derive(Debug, Clone, PartialEq)]
pub struct SidecarSubtitle {
    pub path: PathBuf,
    /// Language tag as written in the filename (not normalized).
    pub language: String,
    pub format: SubtitleFormat,
    pub forced: bool,
}

/// Enumerate every subtitle sidecar belonging to a video:
/// `<stem>.<lang>[.forced].<ext>` plus the bare `<stem>.<ext>`.
pub fn detect_subtitles_for(video: &Path) -> Vec<SidecarSubtitle> {
    let Some(dir) = video.parent() else {
        return Vec::new();
    };
    let Some(stem) = video.file_stem().and_then(|s| s.to_str()) else {
        return Vec::new();
    };
    let prefix = format!("{stem}.");
    let mut found = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if !name.starts_with(&prefix) {
            continue;
        }
        let format = SubtitleFormat::from_path(&path);
        if format == SubtitleFormat::Unknown {
            continue;
        }
        // Middle parts between the stem and the extension: language tag and
        // optional `forced` marker.
        let middle = &name[prefix.len()..name.len() - format.extension().len() - 1];
        let mut parts: Vec<&str> = middle.split('.').filter(|p| !p.is_empty()).collect();
        let forced = parts.last() == Some(&"forced");
        if forced {
            parts.pop();
        }
        let language = parts.join(".");
        found.push(SidecarSubtitle {
            path,
            language,
            format,
            forced,
        });
    }
    found.sort_by(|a, b| a.path.cmp(&b.path));
    found
}

/// Look for an external source-language SRT next to the video.
///
/// Accepts `<base>.<srctag>.srt` for any alias tag and the bare
/// `<base>.srt`.
pub fn find_external_source_sub(video: &Path, source_language: &str) -> Option<PathBuf> {
    for tag in language_tags(source_language) {
        let candidate = sidecar_path(video, &tag, false, SubtitleFormat::Srt);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    let bare = base_path(video).with_extension("srt");
    if bare.is_file() {
        return Some(bare);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_language_tags_german() {
        let tags = language_tags("de");
        assert!(tags.contains(&"de".to_string()));
        assert!(tags.contains(&"deu".to_string()));
        assert!(tags.contains(&"ger".to_string()));
        assert!(tags.contains(&"german".to_string()));
    }

    #[test]
    fn test_language_tags_unknown_code_is_itself() {
        assert_eq!(language_tags("xx"), vec!["xx".to_string()]);
    }

    #[test]
    fn test_sidecar_path_full_and_forced() {
        let video = Path::new("/m/Show/S01/E01.mkv");
        assert_eq!(
            sidecar_path(video, "de", false, SubtitleFormat::Ass),
            PathBuf::from("/m/Show/S01/E01.de.ass")
        );
        assert_eq!(
            sidecar_path(video, "de", true, SubtitleFormat::Srt),
            PathBuf::from("/m/Show/S01/E01.de.forced.srt")
        );
    }

    #[test]
    fn test_detect_prefers_ass_over_srt() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("ep.mkv");
        std::fs::write(dir.path().join("ep.de.srt"), "x").unwrap();
        std::fs::write(dir.path().join("ep.de.ass"), "x").unwrap();

        let found = detect_existing_target(&video, "de", false).unwrap();
        assert_eq!(found.format, SubtitleFormat::Ass);
    }

    #[test]
    fn test_detect_matches_alias_tag() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("ep.mkv");
        std::fs::write(dir.path().join("ep.ger.srt"), "x").unwrap();

        let found = detect_existing_target(&video, "de", false).unwrap();
        assert_eq!(found.format, SubtitleFormat::Srt);
        assert!(found.path.to_string_lossy().ends_with("ep.ger.srt"));
    }

    #[test]
    fn test_forced_detection_ignores_full_sidecars() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("ep.mkv");
        std::fs::write(dir.path().join("ep.de.ass"), "x").unwrap();
        assert!(detect_existing_target(&video, "de", true).is_none());

        std::fs::write(dir.path().join("ep.de.forced.srt"), "x").unwrap();
        let found = detect_existing_target(&video, "de", true).unwrap();
        assert!(found.path.to_string_lossy().contains(".forced."));
    }

    #[test]
    fn test_detect_subtitles_for_enumerates_sidecars() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("ep.mkv");
        std::fs::write(&video, "x").unwrap();
        std::fs::write(dir.path().join("ep.de.ass"), "x").unwrap();
        std::fs::write(dir.path().join("ep.de.forced.srt"), "x").unwrap();
        std::fs::write(dir.path().join("ep.en.srt"), "x").unwrap();
        std::fs::write(dir.path().join("ep.nfo"), "x").unwrap();
        std::fs::write(dir.path().join("other.de.srt"), "x").unwrap();

        let found = detect_subtitles_for(&video);
        assert_eq!(found.len(), 3);
        let forced = found.iter().find(|s| s.forced).unwrap();
        assert_eq!(forced.language, "de");
        assert_eq!(forced.format, SubtitleFormat::Srt);
        assert!(found.iter().any(|s| s.language == "en" && !s.forced));
    }

    #[test]
    fn test_find_external_source_sub() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("ep.mkv");
        assert!(find_external_source_sub(&video, "en").is_none());

        std::fs::write(dir.path().join("ep.srt"), "x").unwrap();
        assert!(find_external_source_sub(&video, "en").is_some());

        std::fs::write(dir.path().join("ep.en.srt"), "x").unwrap();
        let found = find_external_source_sub(&video, "en").unwrap();
        assert!(found.to_string_lossy().ends_with("ep.en.srt"));
    }
}
