//! Ollama backend for local LLM inference.
//!
//! Connects to a local Ollama server (default: http://localhost:11434).
//! No API key required.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::GlossaryEntry;

use super::super::types::{
    BackendConfig, BackendConfigField, BackendError, TranslationBackend,
};
use super::{build_llm_prompt, parse_numbered_lines};

const DEFAULT_API_BASE: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "qwen2.5:14b";

/// Local-LLM translation backend via Ollama.
pub struct OllamaBackend {
    client: reqwest::Client,
    api_base: String,
    model: String,
}

impl OllamaBackend {
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config
                .get("endpoint")
                .cloned()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: config
                .get("model")
                .cloned()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: OllamaOptions { temperature: 0.0 },
        };
        let response = self
            .client
            .post(format!("{}/api/generate", self.api_base))
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OllamaErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(match status {
                404 => BackendError::NotConfigured(format!("model {} missing: {message}", self.model)),
                500..=599 => BackendError::Transient(format!("HTTP {status}: {message}")),
                _ => BackendError::Transient(format!("HTTP {status}: {message}")),
            });
        }
        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        Ok(parsed.response)
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorResponse {
    error: String,
}

#[async_trait]
impl TranslationBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn display_name(&self) -> &str {
        "Ollama (local LLM)"
    }

    fn supports_glossary(&self) -> bool {
        true
    }

    fn max_batch_size(&self) -> usize {
        30
    }

    fn is_generative(&self) -> bool {
        true
    }

    fn config_fields(&self) -> Vec<BackendConfigField> {
        vec![
            BackendConfigField {
                key: "endpoint",
                label: "Server URL",
                secret: false,
                required: false,
            },
            BackendConfigField {
                key: "model",
                label: "Model",
                secret: false,
                required: false,
            },
        ]
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(180)
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.api_base))
            .send()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(BackendError::Transient(format!(
                "tags returned {}",
                response.status()
            )))
        }
    }

    async fn translate_batch(
        &self,
        lines: &[String],
        source_lang: &str,
        target_lang: &str,
        glossary: &[GlossaryEntry],
    ) -> Result<Vec<String>, BackendError> {
        if lines.is_empty() {
            return Ok(Vec::new());
        }
        let prompt = build_llm_prompt(lines, source_lang, target_lang, glossary);
        let text = self.generate(&prompt).await?;
        parse_numbered_lines(&text, lines.len())
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        self.generate(prompt).await
    }
}
