//! Translation system: backend registry with fallback chain, per-backend
//! circuit breakers, translation memory and quality evaluation.

mod backends;
mod manager;
mod memory;
mod types;

pub use backends::{
    DeepLBackend, GoogleTranslateBackend, LibreTranslateBackend, OllamaBackend, OpenAiBackend,
};
pub use manager::{TranslationManager, KNOWN_BACKENDS};
pub use memory::{normalize_text, text_hash, TranslationMemory};
pub use types::{
    BackendConfig, BackendConfigField, BackendError, TranslationBackend, TranslationResult,
};
