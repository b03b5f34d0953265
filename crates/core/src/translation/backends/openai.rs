//! OpenAI-compatible backend (chat completions).
//!
//! Works against the OpenAI API or any compatible endpoint (vLLM,
//! LM Studio, llama.cpp server) via a configurable base URL.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::GlossaryEntry;

use super::super::types::{
    BackendConfig, BackendConfigField, BackendError, TranslationBackend,
};
use super::{build_llm_prompt, parse_numbered_lines};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI-compatible generative backend.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiBackend {
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config
                .get("endpoint")
                .cloned()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_key: config.get("api_key").filter(|k| !k.is_empty()).cloned(),
            model: config
                .get("model")
                .cloned()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    async fn chat(&self, prompt: &str) -> Result<String, BackendError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| BackendError::NotConfigured("api_key missing".to_string()))?;
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: 0.0,
        };
        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(match status {
                401 | 403 => BackendError::Auth(message),
                429 if message.contains("quota") => BackendError::Fatal(message),
                429 => BackendError::Transient(message),
                500..=599 => BackendError::Transient(format!("HTTP {status}: {message}")),
                _ => BackendError::Transient(format!("HTTP {status}: {message}")),
            });
        }
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| BackendError::Malformed("no choices in response".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl TranslationBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn display_name(&self) -> &str {
        "OpenAI-compatible"
    }

    fn supports_glossary(&self) -> bool {
        true
    }

    fn max_batch_size(&self) -> usize {
        50
    }

    fn is_generative(&self) -> bool {
        true
    }

    fn config_fields(&self) -> Vec<BackendConfigField> {
        vec![
            BackendConfigField {
                key: "endpoint",
                label: "API base URL",
                secret: false,
                required: false,
            },
            BackendConfigField {
                key: "api_key",
                label: "API key",
                secret: true,
                required: true,
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
        Duration::from_secs(120)
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| BackendError::NotConfigured("api_key missing".to_string()))?;
        let response = self
            .client
            .get(format!("{}/models", self.api_base))
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        match response.status().as_u16() {
            200 => Ok(()),
            401 | 403 => Err(BackendError::Auth("key rejected".to_string())),
            s => Err(BackendError::Transient(format!("models returned {s}"))),
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
        let text = self.chat(&prompt).await?;
        parse_numbered_lines(&text, lines.len())
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        self.chat(prompt).await
    }
}
