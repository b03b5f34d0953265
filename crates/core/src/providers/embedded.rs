//! Embedded-stream pseudo-provider.
//!
//! Candidates name subtitle streams muxed into the video container itself.
//! `download` returns an empty payload by contract; the translator extracts
//! the stream with ffmpeg when it processes the candidate.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::subtitles::{has_target_language_stream, run_ffprobe, select_best_subtitle_stream};

use super::manager::EMBEDDED_PROVIDER;
use super::types::{
    MatchSignal, ProviderError, RateBudget, SubtitleCandidate, SubtitleProvider, VideoQuery,
};

/// Pseudo-provider surfacing embedded subtitle streams as candidates.
pub struct EmbeddedProvider {
    languages: HashSet<String>,
}

impl EmbeddedProvider {
    pub fn new() -> Self {
        // Serves whatever the container carries; the language set is open.
        Self {
            languages: HashSet::new(),
        }
    }
}

impl Default for EmbeddedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubtitleProvider for EmbeddedProvider {
    fn name(&self) -> &str {
        EMBEDDED_PROVIDER
    }

    fn languages(&self) -> &HashSet<String> {
        &self.languages
    }

    fn rate_budget(&self) -> RateBudget {
        // Local ffprobe calls; generous budget.
        RateBudget::new(120, 60)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        // ffprobe availability is checked by actually probing at search time.
        Ok(())
    }

    async fn search(&self, query: &VideoQuery) -> Result<Vec<SubtitleCandidate>, ProviderError> {
        let video = std::path::Path::new(&query.file_path);
        if !video.exists() {
            return Ok(Vec::new());
        }
        let probe = run_ffprobe(video)
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let mut candidates = Vec::new();
        for language in &query.languages {
            if has_target_language_stream(&probe, language).is_none() {
                continue;
            }
            if let Some(choice) = select_best_subtitle_stream(&probe, language, language, None) {
                let mut matches = HashSet::new();
                // The stream is muxed into the exact file: primary match.
                matches.insert(MatchSignal::Hash);
                candidates.push(SubtitleCandidate {
                    provider: EMBEDDED_PROVIDER.to_string(),
                    subtitle_id: format!("{}#s:{}", query.file_path, choice.sub_index),
                    filename: format!("embedded.{}", choice.format.extension()),
                    language: language.clone(),
                    format: choice.format,
                    score: 0,
                    release_info: choice.title.clone(),
                    hearing_impaired: false,
                    forced: false,
                    matches,
                    machine_translated: false,
                    mt_confidence: 0.0,
                    uploader_trust: 0.0,
                    provider_data: Some(serde_json::json!({
                        "sub_index": choice.sub_index,
                        "stream_index": choice.stream_index,
                    })),
                });
            }
        }
        Ok(candidates)
    }

    async fn download(&self, candidate: &SubtitleCandidate) -> Result<Vec<u8>, ProviderError> {
        // Sentinel contract: the translator extracts from the container.
        let _ = candidate;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitles::SubtitleFormat;

    #[tokio::test]
    async fn test_search_missing_file_returns_empty() {
        let provider = EmbeddedProvider::new();
        let query = VideoQuery {
            file_path: "/definitely/not/here.mkv".to_string(),
            languages: vec!["de".to_string()],
            ..Default::default()
        };
        let results = provider.search(&query).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_download_is_empty_sentinel() {
        let provider = EmbeddedProvider::new();
        let candidate = SubtitleCandidate {
            provider: EMBEDDED_PROVIDER.to_string(),
            subtitle_id: "/m/x.mkv#s:0".to_string(),
            filename: "embedded.ass".to_string(),
            language: "en".to_string(),
            format: SubtitleFormat::Ass,
            score: 0,
            release_info: String::new(),
            hearing_impaired: false,
            forced: false,
            matches: Default::default(),
            machine_translated: false,
            mt_confidence: 0.0,
            uploader_trust: 0.0,
            provider_data: None,
        };
        let bytes = provider.download(&candidate).await.unwrap();
        assert!(bytes.is_empty());
    }
}
