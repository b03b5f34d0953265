//! Plex/Kodi subtitle compatibility checking.
//!
//! Media servers only pick up sidecars that follow their naming and format
//! rules. The checker grades one (subtitle, video) pair against a target
//! player and reports hard issues (the server will not load the file) and
//! warnings (it loads, but degraded).

use std::path::Path;

use serde::Serialize;

use crate::subtitles::{language_tags, SubtitleFormat};

/// Media server the check targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatTarget {
    Plex,
    Kodi,
}

impl CompatTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompatTarget::Plex => "plex",
            CompatTarget::Kodi => "kodi",
        }
    }
}

/// Outcome of a compatibility check for one subtitle file.
#[derive(Debug, Clone, Serialize)]
pub struct CompatReport {
    pub subtitle_path: String,
    pub target: &'static str,
    pub compatible: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

/// Check one subtitle against one video for a target player.
pub fn check_compatibility(subtitle: &Path, video: &Path, target: CompatTarget) -> CompatReport {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    if !subtitle.is_file() {
        issues.push(format!("subtitle file not found: {}", subtitle.display()));
    }

    // Sidecars must live next to the video.
    if subtitle.parent() != video.parent() {
        issues.push("subtitle is not in the video's directory".to_string());
    }

    // Naming: <video stem>.<lang>[.forced].<ext>.
    let video_stem = video
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let subtitle_name = subtitle
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let format = SubtitleFormat::from_path(subtitle);

    if !subtitle_name.starts_with(&format!("{video_stem}.")) {
        issues.push(format!(
            "filename does not start with the video name ({video_stem})"
        ));
    } else {
        let middle = subtitle_name
            .strip_prefix(&format!("{video_stem}."))
            .unwrap_or_default()
            .strip_suffix(&format!(".{}", format.extension()))
            .unwrap_or_default();
        let mut parts: Vec<&str> = middle.split('.').filter(|p| !p.is_empty()).collect();
        if parts.last() == Some(&"forced") {
            parts.pop();
        }
        match parts.last() {
            Some(tag) if known_language_tag(tag) => {}
            Some(tag) => warnings.push(format!(
                "language tag '{tag}' is not a recognized ISO code; the server may mislabel the track"
            )),
            None => warnings.push(
                "no language tag in the filename; the track will show as Unknown".to_string(),
            ),
        }
    }

    // Format support per player.
    match (target, format) {
        (_, SubtitleFormat::Srt) => {}
        (_, SubtitleFormat::Ass) | (_, SubtitleFormat::Ssa) => {
            if target == CompatTarget::Plex {
                warnings.push(
                    "ASS/SSA is supported but some Plex clients burn in styling".to_string(),
                );
            }
        }
        (CompatTarget::Plex, SubtitleFormat::Vtt) => {}
        (CompatTarget::Kodi, SubtitleFormat::Vtt) => {
            issues.push("Kodi does not load external VTT sidecars".to_string());
        }
        (_, SubtitleFormat::Unknown) => {
            issues.push(format!("unsupported subtitle extension on {subtitle_name}"));
        }
    }

    // Encoding: both players want UTF-8.
    if subtitle.is_file() {
        match std::fs::read(subtitle) {
            Ok(bytes) if std::str::from_utf8(&bytes).is_err() => {
                warnings.push("file is not valid UTF-8; the player may show mojibake".to_string());
            }
            Err(e) => issues.push(format!("cannot read subtitle: {e}")),
            _ => {}
        }
    }

    CompatReport {
        subtitle_path: subtitle.display().to_string(),
        target: target.as_str(),
        compatible: issues.is_empty(),
        issues,
        warnings,
    }
}

/// Batch check: every subtitle against one video.
pub fn batch_check_compatibility(
    subtitles: &[std::path::PathBuf],
    video: &Path,
    target: CompatTarget,
) -> Vec<CompatReport> {
    subtitles
        .iter()
        .map(|s| check_compatibility(s, video, target))
        .collect()
}

/// Whether a filename tag is a recognizable language alias (two/three
/// letter codes and their bibliographic variants).
fn known_language_tag(tag: &str) -> bool {
    let tag = tag.to_ascii_lowercase();
    if tag.len() == 2 && isolang::Language::from_639_1(&tag).is_some() {
        return true;
    }
    if tag.len() == 3 && isolang::Language::from_639_3(&tag).is_some() {
        return true;
    }
    // Bibliographic variants (ger, fre, ...) expand from their 639-1 code.
    ["de", "fr", "nl", "cs", "el", "zh", "fa", "ro", "sk"]
        .iter()
        .any(|code| language_tags(code).contains(&tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path, content: &[u8]) {
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_well_named_srt_is_compatible() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("ep.mkv");
        let sub = dir.path().join("ep.de.srt");
        touch(&video, b"v");
        touch(&sub, b"1\n00:00:01,000 --> 00:00:02,000\nhi\n");

        for target in [CompatTarget::Plex, CompatTarget::Kodi] {
            let report = check_compatibility(&sub, &video, target);
            assert!(report.compatible, "{:?}: {:?}", target, report.issues);
            assert!(report.warnings.is_empty());
        }
    }

    #[test]
    fn test_wrong_stem_is_an_issue() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("ep.mkv");
        let sub = dir.path().join("other.de.srt");
        touch(&video, b"v");
        touch(&sub, b"x");

        let report = check_compatibility(&sub, &video, CompatTarget::Plex);
        assert!(!report.compatible);
    }

    #[test]
    fn test_missing_language_tag_warns() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("ep.mkv");
        let sub = dir.path().join("ep.srt");
        touch(&video, b"v");
        touch(&sub, b"x");

        let report = check_compatibility(&sub, &video, CompatTarget::Plex);
        assert!(report.compatible);
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn test_biblio_tag_recognized() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("ep.mkv");
        let sub = dir.path().join("ep.ger.srt");
        touch(&video, b"v");
        touch(&sub, b"x");

        let report = check_compatibility(&sub, &video, CompatTarget::Kodi);
        assert!(report.compatible);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_vtt_rejected_on_kodi_only() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("ep.mkv");
        let sub = dir.path().join("ep.de.vtt");
        touch(&video, b"v");
        touch(&sub, b"WEBVTT\n");

        assert!(check_compatibility(&sub, &video, CompatTarget::Plex).compatible);
        assert!(!check_compatibility(&sub, &video, CompatTarget::Kodi).compatible);
    }

    #[test]
    fn test_ass_warns_on_plex() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("ep.mkv");
        let sub = dir.path().join("ep.de.ass");
        touch(&video, b"v");
        touch(&sub, b"[Script Info]\n");

        let plex = check_compatibility(&sub, &video, CompatTarget::Plex);
        assert!(plex.compatible);
        assert!(!plex.warnings.is_empty());
        let kodi = check_compatibility(&sub, &video, CompatTarget::Kodi);
        assert!(kodi.compatible);
        assert!(kodi.warnings.is_empty());
    }

    #[test]
    fn test_non_utf8_warns() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("ep.mkv");
        let sub = dir.path().join("ep.de.srt");
        touch(&video, b"v");
        touch(&sub, &[0xff, 0xfe, 0x41, 0x00]);

        let report = check_compatibility(&sub, &video, CompatTarget::Plex);
        assert!(report.compatible);
        assert!(report.warnings.iter().any(|w| w.contains("UTF-8")));
    }

    #[test]
    fn test_batch_check() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("ep.mkv");
        let good = dir.path().join("ep.de.srt");
        let bad = dir.path().join("wrong.srt");
        touch(&video, b"v");
        touch(&good, b"x");
        touch(&bad, b"x");

        let reports =
            batch_check_compatibility(&[good, bad], &video, CompatTarget::Plex);
        assert_eq!(reports.len(), 2);
        assert!(reports[0].compatible);
        assert!(!reports[1].compatible);
    }
}
