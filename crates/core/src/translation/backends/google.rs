//! Google Cloud Translate backend (rule-based machine translation).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::GlossaryEntry;

use super::super::types::{
    BackendConfig, BackendConfigField, BackendError, TranslationBackend,
};

const API_BASE: &str = "https://translation.googleapis.com";

/// Google Cloud Translate v2 backend.
pub struct GoogleTranslateBackend {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
}

impl GoogleTranslateBackend {
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config
                .get("endpoint")
                .cloned()
                .unwrap_or_else(|| API_BASE.to_string()),
            api_key: config.get("api_key").filter(|k| !k.is_empty()).cloned(),
        }
    }

    fn key(&self) -> Result<&str, BackendError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| BackendError::NotConfigured("api_key missing".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct TranslateRequest {
    q: Vec<String>,
    source: String,
    target: String,
    format: String,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[async_trait]
impl TranslationBackend for GoogleTranslateBackend {
    fn name(&self) -> &str {
        "google"
    }

    fn display_name(&self) -> &str {
        "Google Cloud Translate"
    }

    fn max_batch_size(&self) -> usize {
        100
    }

    fn config_fields(&self) -> Vec<BackendConfigField> {
        vec![BackendConfigField {
            key: "api_key",
            label: "API key",
            secret: true,
            required: true,
        }]
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let key = self.key()?;
        let response = self
            .client
            .get(format!("{}/language/translate/v2/languages", self.api_base))
            .query(&[("key", key)])
            .send()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        match response.status().as_u16() {
            200 => Ok(()),
            401 | 403 => Err(BackendError::Auth("key rejected".to_string())),
            s => Err(BackendError::Transient(format!("languages returned {s}"))),
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
        let key = self.key()?;
        let request = TranslateRequest {
            q: lines.to_vec(),
            source: source_lang.to_string(),
            target: target_lang.to_string(),
            format: "text".to_string(),
        };
        let response = self
            .client
            .post(format!("{}/language/translate/v2", self.api_base))
            .query(&[("key", key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        let status = response.status().as_u16();
        match status {
            200 => {}
            401 | 403 => return Err(BackendError::Auth("key rejected".to_string())),
            429 => {
                let body = response.text().await.unwrap_or_default();
                return Err(if body.contains("dailyLimitExceeded") {
                    BackendError::Fatal("daily quota exceeded".to_string())
                } else {
                    BackendError::Transient("rate limited".to_string())
                });
            }
            s if s >= 500 => return Err(BackendError::Transient(format!("HTTP {s}"))),
            s => return Err(BackendError::Transient(format!("HTTP {s}"))),
        }
        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        let translations = parsed.data.translations;
        if translations.len() != lines.len() {
            return Err(BackendError::Malformed(format!(
                "{} translations for {} inputs",
                translations.len(),
                lines.len()
            )));
        }
        Ok(translations.into_iter().map(|t| t.translated_text).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let json = r#"{"data":{"translations":[{"translatedText":"Hallo"}]}}"#;
        let parsed: TranslateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.data.translations[0].translated_text, "Hallo");
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let backend = GoogleTranslateBackend::from_config(&BackendConfig::new());
        let err = backend
            .translate_batch(&["hi".to_string()], "en", "de", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotConfigured(_)));
    }
}
