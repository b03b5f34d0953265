//! Configurable mock translation backend.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::store::GlossaryEntry;
use crate::translation::{BackendError, TranslationBackend};

type ErrorFactory = Box<dyn Fn() -> BackendError + Send + Sync>;

/// Mock backend that "translates" by tagging lines with the target
/// language, or fails with a scripted error.
pub struct MockBackend {
    name: String,
    error: Option<ErrorFactory>,
    generative: bool,
    completion: String,
    calls: AtomicU32,
}

impl MockBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: None,
            generative: true,
            completion: "75".to_string(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing_with(
        mut self,
        factory: impl Fn() -> BackendError + Send + Sync + 'static,
    ) -> Self {
        self.error = Some(Box::new(factory));
        self
    }

    pub fn rule_based(mut self) -> Self {
        self.generative = false;
        self
    }

    pub fn with_completion(mut self, completion: impl Into<String>) -> Self {
        self.completion = completion.into();
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        "Mock backend"
    }

    fn supports_glossary(&self) -> bool {
        true
    }

    fn is_generative(&self) -> bool {
        self.generative
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        match &self.error {
            Some(factory) => Err(factory()),
            None => Ok(()),
        }
    }

    async fn translate_batch(
        &self,
        lines: &[String],
        _source_lang: &str,
        target_lang: &str,
        _glossary: &[GlossaryEntry],
    ) -> Result<Vec<String>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(factory) = &self.error {
            return Err(factory());
        }
        Ok(lines
            .iter()
            .map(|line| format!("[{target_lang}] {line}"))
            .collect())
    }

    async fn complete(&self, _prompt: &str) -> Result<String, BackendError> {
        if let Some(factory) = &self.error {
            return Err(factory());
        }
        if !self.generative {
            return Err(BackendError::Unsupported("rule-based".to_string()));
        }
        Ok(self.completion.clone())
    }
}
