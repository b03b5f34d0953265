//! Translation backend abstraction.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::store::GlossaryEntry;

/// Errors from translation backend calls, by recovery class.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Timeout, connection trouble, 5xx. The chain moves to the next
    /// backend; the breaker ticks once.
    #[error("Transient backend error: {0}")]
    Transient(String),

    /// Quota exhausted, account suspended. The breaker trips open so every
    /// subsequent call skips this backend until the cooldown passes.
    #[error("Fatal backend error: {0}")]
    Fatal(String),

    /// Credentials rejected. Treated as fatal.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Backend is missing required configuration.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Response could not be parsed.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Operation the backend cannot perform (e.g. quality evaluation on a
    /// rule-based engine).
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl BackendError {
    /// Whether the breaker should trip open instead of tick.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BackendError::Fatal(_) | BackendError::Auth(_) | BackendError::NotConfigured(_)
        )
    }
}

/// A config field a backend needs wired from settings.
#[derive(Debug, Clone, Serialize)]
pub struct BackendConfigField {
    pub key: &'static str,
    pub label: &'static str,
    pub secret: bool,
    pub required: bool,
}

/// Outcome of a fallback-chain translation. The manager never raises;
/// callers read `success`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TranslationResult {
    pub success: bool,
    pub lines: Vec<String>,
    pub backend_used: Option<String>,
    pub elapsed_ms: u64,
    pub characters: u64,
    /// How many lines were served from translation memory.
    pub memory_hits: usize,
    pub error: Option<String>,
}

impl TranslationResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Capability set of a translation backend.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    /// Stable backend name used in fallback chains and settings keys.
    fn name(&self) -> &str;

    /// Human-readable name for the API.
    fn display_name(&self) -> &str;

    /// Whether glossary terms can be passed through.
    fn supports_glossary(&self) -> bool {
        false
    }

    /// Whether multiple lines translate in one call.
    fn supports_batch(&self) -> bool {
        true
    }

    /// Largest line batch per call.
    fn max_batch_size(&self) -> usize {
        50
    }

    /// Generative backends can also answer free-form prompts (used for the
    /// advisory quality evaluation). Rule-based engines cannot.
    fn is_generative(&self) -> bool {
        false
    }

    fn config_fields(&self) -> Vec<BackendConfigField> {
        Vec::new()
    }

    /// Per-call timeout.
    fn timeout(&self) -> Duration {
        Duration::from_secs(120)
    }

    async fn health_check(&self) -> Result<(), BackendError>;

    /// Translate a batch of lines, one output per input line.
    async fn translate_batch(
        &self,
        lines: &[String],
        source_lang: &str,
        target_lang: &str,
        glossary: &[GlossaryEntry],
    ) -> Result<Vec<String>, BackendError>;

    /// Free-form completion for generative backends.
    async fn complete(&self, _prompt: &str) -> Result<String, BackendError> {
        Err(BackendError::Unsupported(format!(
            "{} cannot answer prompts",
            self.name()
        )))
    }
}

/// Factory context handed to backend constructors: the settings under
/// `backend.<name>.` with the prefix stripped.
pub type BackendConfig = BTreeMap<String, String>;
