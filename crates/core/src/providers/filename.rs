//! Release-name parsing for query building.
//!
//! Library metadata is preferred; this fills the gaps for watched-folder
//! items and files the arr instance no longer knows.

use std::path::Path;

use once_cell::sync::Lazy;
use regex_lite::Regex;

static SEASON_EPISODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[Ss](\d{1,2})[Ee](\d{1,3})").unwrap());

static X_EPISODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,2})x(\d{2,3})\b").unwrap());

static ABSOLUTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"- ?(\d{2,4})\b").unwrap());

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").unwrap());

static RESOLUTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(2160p|1080p|720p|480p)\b").unwrap());

static GROUP_BRACKET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[([^\]]+)\]").unwrap());

static GROUP_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-([A-Za-z0-9]+)$").unwrap());

static NOISE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+p|x264|x265|h264|h265|hevc|web-?dl|webrip|bluray|bdrip|hdtv|aac|flac|dts|remux|10bit|8bit)\b")
        .unwrap()
});

/// Metadata recovered from a release filename.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFilename {
    /// Series title for episodes, empty for movies.
    pub series_title: String,
    /// Movie title when no season/episode markers are present.
    pub title: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub absolute_episode: Option<u32>,
    pub year: Option<u32>,
    pub resolution: Option<String>,
    pub release_group: Option<String>,
}

/// Parse a video filename into query metadata.
pub fn parse_filename(file_path: &Path) -> ParsedFilename {
    let stem = file_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let mut result = ParsedFilename::default();

    let mut cut_at = stem.len();
    if let Some(caps) = SEASON_EPISODE_RE.captures(stem) {
        result.season = caps[1].parse().ok();
        result.episode = caps[2].parse().ok();
        cut_at = cut_at.min(caps.get(0).unwrap().start());
    } else if let Some(caps) = X_EPISODE_RE.captures(stem) {
        result.season = caps[1].parse().ok();
        result.episode = caps[2].parse().ok();
        cut_at = cut_at.min(caps.get(0).unwrap().start());
    } else if let Some(caps) = ABSOLUTE_RE.captures(stem) {
        result.absolute_episode = caps[1].parse().ok();
        cut_at = cut_at.min(caps.get(0).unwrap().start());
    }

    if let Some(caps) = YEAR_RE.captures(stem) {
        result.year = caps[1].parse().ok();
        // A year usually terminates a movie title.
        if result.season.is_none() && result.absolute_episode.is_none() {
            cut_at = cut_at.min(caps.get(0).unwrap().start());
        }
    }

    if let Some(caps) = RESOLUTION_RE.captures(stem) {
        result.resolution = Some(caps[1].to_lowercase());
        cut_at = cut_at.min(caps.get(0).unwrap().start());
    }

    if let Some(caps) = GROUP_BRACKET_RE.captures(stem) {
        result.release_group = Some(caps[1].to_string());
    } else if let Some(caps) = GROUP_SUFFIX_RE.captures(stem) {
        result.release_group = Some(caps[1].to_string());
    }

    let mut raw_title = stem[..cut_at].to_string();
    if let Some(m) = GROUP_BRACKET_RE.find(&raw_title) {
        raw_title = raw_title[m.end()..].to_string();
    }
    let cleaned = NOISE_RE.replace_all(&raw_title, "");
    let title = cleaned
        .replace(['.', '_'], " ")
        .trim_matches([' ', '-'])
        .to_string();
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");

    if result.season.is_some() || result.absolute_episode.is_some() {
        result.series_title = title;
    } else {
        result.title = title;
    }
    result
}
