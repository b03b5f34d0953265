//! Titrari (titrari.ro) provider.
//!
//! Romanian subtitles scraped from HTML result tables. No authentication;
//! a browser-like User-Agent and a polite rate budget keep the site happy.
//! Payloads usually arrive as ZIP/RAR archives (unwrapped by the manager).

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use tracing::debug;

use crate::subtitles::SubtitleFormat;

use super::types::{
    MatchSignal, ProviderError, RateBudget, SubtitleCandidate, SubtitleProvider, VideoQuery,
};

const BASE_URL: &str = "https://www.titrari.ro";

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

static ROW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").unwrap());

static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<a[^>]+href="([^"]+)"[^>]*>(.*?)</a>"#).unwrap());

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

static DOWNLOAD_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"get\.php\?id=(\d+)").unwrap());

/// Titrari.ro subtitle provider.
pub struct TitrariProvider {
    client: reqwest::Client,
    base_url: String,
    languages: HashSet<String>,
}

impl TitrariProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: BASE_URL.to_string(),
            languages: std::iter::once("ro".to_string()).collect(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_search_term(query: &VideoQuery) -> Option<String> {
        match (&query.series, query.season, query.episode) {
            (Some(series), Some(season), Some(episode)) => {
                Some(format!("{series} S{season:02}E{episode:02}"))
            }
            _ => {
                let title = query.title.clone().or_else(|| query.series.clone())?;
                Some(match query.year {
                    Some(year) => format!("{title} {year}"),
                    None => title,
                })
            }
        }
    }

    /// Parse the HTML result table into candidates.
    fn parse_search_results(&self, html: &str, query: &VideoQuery) -> Vec<SubtitleCandidate> {
        let mut candidates = Vec::new();
        let mut seen_ids = HashSet::new();

        for row in ROW_RE.captures_iter(html) {
            let row_html = &row[1];
            let Some(id_caps) = DOWNLOAD_ID_RE.captures(row_html) else {
                continue;
            };
            let subtitle_id = id_caps[1].to_string();
            if !seen_ids.insert(subtitle_id.clone()) {
                continue;
            }

            // The longest non-download link text is the release title.
            let mut release_name = String::new();
            for link in LINK_RE.captures_iter(row_html) {
                let href = &link[1];
                if DOWNLOAD_ID_RE.is_match(href) {
                    continue;
                }
                let text = TAG_RE.replace_all(&link[2], "").trim().to_string();
                if text.len() > release_name.len() {
                    release_name = text;
                }
            }
            if release_name.len() < 3 {
                // Header/navigation rows carry no usable title.
                let row_text = TAG_RE.replace_all(row_html, " ");
                release_name = row_text.split_whitespace().take(12).collect::<Vec<_>>().join(" ");
            }
            if release_name.len() < 3 {
                continue;
            }

            let release_lower = release_name.to_lowercase();
            let mut matches = HashSet::new();
            if let Some(series) = query.series.as_deref().or(query.title.as_deref()) {
                if release_lower.contains(&series.to_lowercase()) {
                    matches.insert(MatchSignal::Series);
                }
            }
            if let (Some(season), Some(episode)) = (query.season, query.episode) {
                if release_lower.contains(&format!("s{season:02}e{episode:02}")) {
                    matches.insert(MatchSignal::Season);
                    matches.insert(MatchSignal::Episode);
                }
            }
            if let Some(year) = query.year {
                if release_lower.contains(&year.to_string()) {
                    matches.insert(MatchSignal::Year);
                }
            }
            if let Some(group) = &query.release_group {
                if release_lower.contains(&group.to_lowercase()) {
                    matches.insert(MatchSignal::ReleaseGroup);
                }
            }
            if let Some(resolution) = &query.resolution {
                if release_lower.contains(&resolution.to_lowercase()) {
                    matches.insert(MatchSignal::Resolution);
                }
            }

            candidates.push(SubtitleCandidate {
                provider: "titrari".to_string(),
                subtitle_id,
                filename: release_name.clone(),
                language: "ro".to_string(),
                // Archives dominate; the true format surfaces on extraction.
                format: SubtitleFormat::Srt,
                score: 0,
                release_info: release_name,
                hearing_impaired: false,
                forced: false,
                matches,
                machine_translated: false,
                mt_confidence: 0.0,
                uploader_trust: 0.0,
                provider_data: None,
            });
        }
        candidates
    }
}

impl Default for TitrariProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubtitleProvider for TitrariProvider {
    fn name(&self) -> &str {
        "titrari"
    }

    fn languages(&self) -> &HashSet<String> {
        &self.languages
    }

    fn rate_budget(&self) -> RateBudget {
        // Polite scraping.
        RateBudget::new(10, 60)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(20)
    }

    async fn initialize(&self, _config: &BTreeMap<String, String>) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let response = self
            .client
            .get(&self.base_url)
            .header("user-agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        match response.status().as_u16() {
            200 => Ok(()),
            403 => Err(ProviderError::Auth("access blocked (HTTP 403)".to_string())),
            s => Err(ProviderError::Transient(format!("HTTP {s}"))),
        }
    }

    async fn search(&self, query: &VideoQuery) -> Result<Vec<SubtitleCandidate>, ProviderError> {
        // Romanian only.
        if !query.languages.is_empty()
            && !query.languages.iter().any(|l| l.eq_ignore_ascii_case("ro"))
        {
            return Ok(Vec::new());
        }
        let Some(search_term) = Self::build_search_term(query) else {
            return Ok(Vec::new());
        };

        let response = self
            .client
            .get(format!("{}/index.php", self.base_url))
            .header("user-agent", USER_AGENT)
            .query(&[("page", "cautare"), ("titlufilm", search_term.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        match response.status().as_u16() {
            200 => {}
            // The site bans scrapers by IP; retrying would make it worse.
            403 => return Err(ProviderError::Auth("access blocked (HTTP 403)".to_string())),
            429 => {
                return Err(ProviderError::RateLimited {
                    retry_after_ms: None,
                })
            }
            s if s >= 500 => return Err(ProviderError::Transient(format!("HTTP {s}"))),
            s => return Err(ProviderError::Other(format!("HTTP {s}"))),
        }

        let html = response
            .text()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        let candidates = self.parse_search_results(&html, query);
        debug!("titrari returned {} parsed result(s)", candidates.len());
        Ok(candidates)
    }

    async fn download(&self, candidate: &SubtitleCandidate) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(format!(
                "{}/get.php?id={}",
                self.base_url, candidate.subtitle_id
            ))
            .header("user-agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        match response.status().as_u16() {
            200 => {}
            403 => return Err(ProviderError::Auth("access blocked (HTTP 403)".to_string())),
            404 => {
                return Err(ProviderError::NotFound(format!(
                    "subtitle {} gone",
                    candidate.subtitle_id
                )))
            }
            s if s >= 500 => return Err(ProviderError::Transient(format!("HTTP {s}"))),
            s => return Err(ProviderError::Other(format!("HTTP {s}"))),
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        if bytes.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "empty payload for subtitle {}",
                candidate.subtitle_id
            )));
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"
        <table>
        <tr><td>Titlu</td><td>Descarca</td></tr>
        <tr>
          <td><a href="index.php?page=detalii&z=9">Breaking Bad S05E14 1080p WEB-DL NTb</a></td>
          <td><a href="get.php?id=4711"><img src="dl.png"></a></td>
        </tr>
        <tr>
          <td><a href="index.php?page=detalii&z=10">Alt ceva complet diferit</a></td>
          <td><a href="get.php?id=4712">download</a></td>
        </tr>
        </table>
    "#;

    fn query() -> VideoQuery {
        VideoQuery {
            file_path: "/m/bb.mkv".to_string(),
            series: Some("Breaking Bad".to_string()),
            season: Some(5),
            episode: Some(14),
            resolution: Some("1080p".to_string()),
            languages: vec!["ro".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_rows_and_ids() {
        let provider = TitrariProvider::new();
        let candidates = provider.parse_search_results(SAMPLE_HTML, &query());
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].subtitle_id, "4711");
        assert_eq!(candidates[0].language, "ro");
        assert!(candidates[0].matches.contains(&MatchSignal::Series));
        assert!(candidates[0].matches.contains(&MatchSignal::Season));
        assert!(candidates[0].matches.contains(&MatchSignal::Episode));
        assert!(candidates[0].matches.contains(&MatchSignal::Resolution));
        // The unrelated release matches nothing.
        assert!(candidates[1].matches.is_empty());
    }

    #[test]
    fn test_rows_without_download_link_skipped() {
        let provider = TitrariProvider::new();
        let html = "<tr><td><a href=\"index.php?page=x\">Header only</a></td></tr>";
        assert!(provider.parse_search_results(html, &query()).is_empty());
    }

    #[test]
    fn test_duplicate_ids_deduplicated() {
        let provider = TitrariProvider::new();
        let html = r#"
            <tr><td><a href="a">Breaking Bad S05E14</a><a href="get.php?id=1">dl</a></td></tr>
            <tr><td><a href="b">Breaking Bad S05E14 again</a><a href="get.php?id=1">dl</a></td></tr>
        "#;
        assert_eq!(provider.parse_search_results(html, &query()).len(), 1);
    }

    #[test]
    fn test_search_term_building() {
        assert_eq!(
            TitrariProvider::build_search_term(&query()).as_deref(),
            Some("Breaking Bad S05E14")
        );
        let movie = VideoQuery {
            file_path: "/m/i.mkv".to_string(),
            title: Some("Inception".to_string()),
            year: Some(2010),
            languages: vec!["ro".to_string()],
            ..Default::default()
        };
        assert_eq!(
            TitrariProvider::build_search_term(&movie).as_deref(),
            Some("Inception 2010")
        );
        let empty = VideoQuery {
            file_path: "/m/x.mkv".to_string(),
            languages: vec!["ro".to_string()],
            ..Default::default()
        };
        assert_eq!(TitrariProvider::build_search_term(&empty), None);
    }

    #[tokio::test]
    async fn test_non_romanian_query_short_circuits() {
        let provider = TitrariProvider::new();
        let mut q = query();
        q.languages = vec!["de".to_string()];
        let results = provider.search(&q).await.unwrap();
        assert!(results.is_empty());
    }
}
