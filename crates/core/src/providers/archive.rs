//! Archive handling for provider downloads.
//!
//! Providers frequently serve `.zip`/`.rar` payloads. Extraction shells out
//! to `unzip`/`unrar` inside a temp directory and picks the best inner
//! subtitle file (ASS over SRT, then size).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;
use walkdir::WalkDir;

use crate::subtitles::SubtitleFormat;

use super::types::ProviderError;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const RAR_MAGIC: &[u8] = b"Rar!";

/// Archive kind sniffed from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Rar,
}

/// Sniff whether a payload is an archive.
pub fn detect_archive(bytes: &[u8]) -> Option<ArchiveKind> {
    if bytes.starts_with(ZIP_MAGIC) {
        Some(ArchiveKind::Zip)
    } else if bytes.starts_with(RAR_MAGIC) {
        Some(ArchiveKind::Rar)
    } else {
        None
    }
}

/// A subtitle file pulled out of an archive.
#[derive(Debug, Clone)]
pub struct ExtractedSubtitle {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub format: SubtitleFormat,
}

/// Extract the best subtitle file from an archive payload.
pub async fn extract_subtitle_from_archive(
    bytes: &[u8],
    kind: ArchiveKind,
) -> Result<ExtractedSubtitle, ProviderError> {
    let dir = tempfile::tempdir().map_err(|e| ProviderError::Other(e.to_string()))?;
    let archive_path = dir.path().join(match kind {
        ArchiveKind::Zip => "payload.zip",
        ArchiveKind::Rar => "payload.rar",
    });
    tokio::fs::write(&archive_path, bytes)
        .await
        .map_err(|e| ProviderError::Other(e.to_string()))?;

    let extract_dir = dir.path().join("out");
    tokio::fs::create_dir_all(&extract_dir)
        .await
        .map_err(|e| ProviderError::Other(e.to_string()))?;

    match kind {
        ArchiveKind::Zip => extract_zip(&archive_path, &extract_dir).await?,
        ArchiveKind::Rar => extract_rar(&archive_path, &extract_dir).await?,
    }

    let best = pick_best_subtitle(&extract_dir).ok_or_else(|| {
        ProviderError::NotFound("archive contained no subtitle file".to_string())
    })?;
    let payload = std::fs::read(&best)
        .map_err(|e| ProviderError::Other(format!("reading extracted file: {e}")))?;
    let filename = best
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "subtitle".to_string());
    let format = SubtitleFormat::from_path(&best);
    debug!("Extracted {} ({:?}) from archive", filename, format);
    Ok(ExtractedSubtitle {
        bytes: payload,
        filename,
        format,
    })
}

async fn extract_zip(archive: &Path, dest: &Path) -> Result<(), ProviderError> {
    let output = Command::new("unzip")
        .arg("-o")
        .arg(archive)
        .arg("-d")
        .arg(dest)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ProviderError::Other(format!("failed to run unzip: {e}")))?;
    if !output.status.success() {
        return Err(ProviderError::Other(format!(
            "unzip failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

async fn extract_rar(archive: &Path, dest: &Path) -> Result<(), ProviderError> {
    let output = Command::new("unrar")
        .arg("x")
        .arg("-y")
        .arg(archive)
        .arg(dest)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ProviderError::Other(format!("failed to run unrar: {e}")))?;
    if !output.status.success() {
        return Err(ProviderError::Other(format!(
            "unrar failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Best subtitle in an extraction dir: ASS before SRT before the rest,
/// larger files first within a format.
fn pick_best_subtitle(dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<(u8, u64, PathBuf)> = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let format = SubtitleFormat::from_path(entry.path());
        if format == SubtitleFormat::Unknown {
            continue;
        }
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        candidates.push((format.rank(), size, entry.path().to_path_buf()));
    }
    candidates.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
    candidates.into_iter().next().map(|(_, _, p)| p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_archive_magic() {
        assert_eq!(detect_archive(b"PK\x03\x04rest"), Some(ArchiveKind::Zip));
        assert_eq!(detect_archive(b"Rar!\x1a\x07"), Some(ArchiveKind::Rar));
        assert_eq!(detect_archive(b"1\n00:00:01,000"), None);
        assert_eq!(detect_archive(b""), None);
    }

    #[test]
    fn test_pick_best_prefers_ass() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.srt"), vec![0u8; 4096]).unwrap();
        std::fs::write(dir.path().join("b.ass"), vec![0u8; 128]).unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"x").unwrap();
        let best = pick_best_subtitle(dir.path()).unwrap();
        assert!(best.to_string_lossy().ends_with("b.ass"));
    }

    #[test]
    fn test_pick_best_larger_within_format() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("small.srt"), vec![0u8; 10]).unwrap();
        std::fs::write(dir.path().join("big.srt"), vec![0u8; 1000]).unwrap();
        let best = pick_best_subtitle(dir.path()).unwrap();
        assert!(best.to_string_lossy().ends_with("big.srt"));
    }

    #[test]
    fn test_pick_best_none_for_empty_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(pick_best_subtitle(dir.path()).is_none());
    }
}
