//! LibreTranslate backend (self-hosted rule-based machine translation).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::GlossaryEntry;

use super::super::types::{
    BackendConfig, BackendConfigField, BackendError, TranslationBackend,
};

const DEFAULT_API_BASE: &str = "http://localhost:5000";

/// LibreTranslate backend.
pub struct LibreTranslateBackend {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
}

impl LibreTranslateBackend {
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config
                .get("endpoint")
                .cloned()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_key: config.get("api_key").filter(|k| !k.is_empty()).cloned(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TranslateRequest {
    q: Vec<String>,
    source: String,
    target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: Vec<String>,
}

#[async_trait]
impl TranslationBackend for LibreTranslateBackend {
    fn name(&self) -> &str {
        "libretranslate"
    }

    fn display_name(&self) -> &str {
        "LibreTranslate"
    }

    fn max_batch_size(&self) -> usize {
        25
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
                key: "api_key",
                label: "API key",
                secret: true,
                required: false,
            },
        ]
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(90)
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .get(format!("{}/languages", self.api_base))
            .send()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(BackendError::Transient(format!(
                "languages returned {}",
                response.status()
            )))
        }
    }

    async fn translate_batch(
        &self,
        lines: &[String],
        source_lang: &str,
        target_lang: &str,
        _glossary: &[GlossaryEntry],
    ) -> Result<Vec<String>, BackendError> {
        if lines.is_empty() {
            return Ok(Vec::new());
        }
        let request = TranslateRequest {
            q: lines.to_vec(),
            source: source_lang.to_string(),
            target: target_lang.to_string(),
            api_key: self.api_key.clone(),
        };
        let response = self
            .client
            .post(format!("{}/translate", self.api_base))
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        let status = response.status().as_u16();
        match status {
            200 => {}
            403 => return Err(BackendError::Auth("api key rejected".to_string())),
            429 => return Err(BackendError::Transient("rate limited".to_string())),
            s if s >= 500 => return Err(BackendError::Transient(format!("HTTP {s}"))),
            s => return Err(BackendError::Transient(format!("HTTP {s}"))),
        }
        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        if parsed.translated_text.len() != lines.len() {
            return Err(BackendError::Malformed(format!(
                "{} translations for {} inputs",
                parsed.translated_text.len(),
                lines.len()
            )));
        }
        Ok(parsed.translated_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let backend = LibreTranslateBackend::from_config(&BackendConfig::new());
        assert_eq!(backend.api_base, DEFAULT_API_BASE);
        assert!(backend.api_key.is_none());
        assert!(!backend.is_generative());
    }

    #[test]
    fn test_request_omits_missing_key() {
        let request = TranslateRequest {
            q: vec!["hi".to_string()],
            source: "en".to_string(),
            target: "de".to_string(),
            api_key: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("api_key"));
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{"translatedText":["Hallo","Welt"]}"#;
        let parsed: TranslateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.translated_text.len(), 2);
    }
}
