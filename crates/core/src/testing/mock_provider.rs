//! Configurable mock subtitle provider.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::providers::{
    MatchSignal, ProviderError, RateBudget, SubtitleCandidate, SubtitleProvider, VideoQuery,
};
use crate::subtitles::SubtitleFormat;

type ErrorFactory = Box<dyn Fn() -> ProviderError + Send + Sync>;

/// Mock provider with scripted candidates and failure modes.
pub struct MockProvider {
    name: String,
    languages: HashSet<String>,
    budget: RateBudget,
    candidates: Vec<SubtitleCandidate>,
    search_error: Option<ErrorFactory>,
    download_error: Option<ErrorFactory>,
    payload: Vec<u8>,
    search_calls: AtomicU32,
    download_calls: AtomicU32,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        let languages = ["en", "de", "fr", "ja", "pt"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self {
            name: name.into(),
            languages,
            budget: RateBudget::new(100, 60),
            candidates: Vec::new(),
            search_error: None,
            download_error: None,
            payload: b"1\n00:00:01,000 --> 00:00:02,000\nmock line\n".to_vec(),
            search_calls: AtomicU32::new(0),
            download_calls: AtomicU32::new(0),
        }
    }

    pub fn with_rate_budget(mut self, max_requests: u32, window_seconds: u64) -> Self {
        self.budget = RateBudget::new(max_requests, window_seconds);
        self
    }

    /// Add a candidate. `matches` uses the signal names:
    /// hash, imdb, tvdb, series, season, episode, year, release_group,
    /// resolution.
    pub fn with_candidate(
        mut self,
        subtitle_id: &str,
        language: &str,
        format: SubtitleFormat,
        matches: &[&str],
    ) -> Self {
        let signals: HashSet<MatchSignal> = matches
            .iter()
            .filter_map(|m| match *m {
                "hash" => Some(MatchSignal::Hash),
                "imdb" => Some(MatchSignal::ImdbId),
                "tvdb" => Some(MatchSignal::TvdbId),
                "anidb" => Some(MatchSignal::AnidbId),
                "series" => Some(MatchSignal::Series),
                "season" => Some(MatchSignal::Season),
                "episode" => Some(MatchSignal::Episode),
                "year" => Some(MatchSignal::Year),
                "release_group" => Some(MatchSignal::ReleaseGroup),
                "resolution" => Some(MatchSignal::Resolution),
                _ => None,
            })
            .collect();
        self.candidates.push(SubtitleCandidate {
            provider: self.name.clone(),
            subtitle_id: subtitle_id.to_string(),
            filename: format!("{subtitle_id}.{}", format.extension()),
            language: language.to_string(),
            format,
            score: 0,
            release_info: String::new(),
            hearing_impaired: false,
            forced: false,
            matches: signals,
            machine_translated: false,
            mt_confidence: 0.0,
            uploader_trust: 0.0,
            provider_data: None,
        });
        self
    }

    /// Modify the most recently added candidate.
    pub fn map_last_candidate(mut self, f: impl FnOnce(&mut SubtitleCandidate)) -> Self {
        if let Some(last) = self.candidates.last_mut() {
            f(last);
        }
        self
    }

    pub fn failing_with(
        mut self,
        factory: impl Fn() -> ProviderError + Send + Sync + 'static,
    ) -> Self {
        self.search_error = Some(Box::new(factory));
        self
    }

    pub fn with_download_error(
        mut self,
        factory: impl Fn() -> ProviderError + Send + Sync + 'static,
    ) -> Self {
        self.download_error = Some(Box::new(factory));
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn search_calls(&self) -> u32 {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> u32 {
        self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubtitleProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn languages(&self) -> &HashSet<String> {
        &self.languages
    }

    fn rate_budget(&self) -> RateBudget {
        self.budget
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn max_retries(&self) -> u32 {
        0
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn search(&self, _query: &VideoQuery) -> Result<Vec<SubtitleCandidate>, ProviderError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(factory) = &self.search_error {
            return Err(factory());
        }
        Ok(self.candidates.clone())
    }

    async fn download(&self, _candidate: &SubtitleCandidate) -> Result<Vec<u8>, ProviderError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(factory) = &self.download_error {
            return Err(factory());
        }
        Ok(self.payload.clone())
    }
}
