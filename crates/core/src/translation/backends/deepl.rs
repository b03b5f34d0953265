//! DeepL backend (rule-based machine translation).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::GlossaryEntry;

use super::super::types::{
    BackendConfig, BackendConfigField, BackendError, TranslationBackend,
};

const FREE_API_BASE: &str = "https://api-free.deepl.com";
const PRO_API_BASE: &str = "https://api.deepl.com";

/// DeepL translation backend.
pub struct DeepLBackend {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
}

impl DeepLBackend {
    pub fn from_config(config: &BackendConfig) -> Self {
        let api_key = config.get("api_key").filter(|k| !k.is_empty()).cloned();
        // Free-tier keys are suffixed ":fx" and use the free endpoint.
        let api_base = config.get("endpoint").cloned().unwrap_or_else(|| {
            match &api_key {
                Some(key) if key.ends_with(":fx") => FREE_API_BASE.to_string(),
                _ => PRO_API_BASE.to_string(),
            }
        });
        Self {
            client: reqwest::Client::new(),
            api_base,
            api_key,
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
    text: Vec<String>,
    source_lang: String,
    target_lang: String,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

#[async_trait]
impl TranslationBackend for DeepLBackend {
    fn name(&self) -> &str {
        "deepl"
    }

    fn display_name(&self) -> &str {
        "DeepL"
    }

    fn max_batch_size(&self) -> usize {
        50
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
            .get(format!("{}/v2/usage", self.api_base))
            .header("Authorization", format!("DeepL-Auth-Key {key}"))
            .send()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        match response.status().as_u16() {
            200 => Ok(()),
            401 | 403 => Err(BackendError::Auth("key rejected".to_string())),
            456 => Err(BackendError::Fatal("quota exceeded".to_string())),
            s => Err(BackendError::Transient(format!("usage returned {s}"))),
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
            text: lines.to_vec(),
            source_lang: source_lang.to_uppercase(),
            target_lang: target_lang.to_uppercase(),
        };
        let response = self
            .client
            .post(format!("{}/v2/translate", self.api_base))
            .header("Authorization", format!("DeepL-Auth-Key {key}"))
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        let status = response.status().as_u16();
        match status {
            200 => {}
            401 | 403 => return Err(BackendError::Auth("key rejected".to_string())),
            // DeepL's dedicated quota-exhausted status.
            456 => return Err(BackendError::Fatal("quota exceeded".to_string())),
            429 => return Err(BackendError::Transient("rate limited".to_string())),
            s if s >= 500 => return Err(BackendError::Transient(format!("HTTP {s}"))),
            s => return Err(BackendError::Transient(format!("HTTP {s}"))),
        }
        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        if parsed.translations.len() != lines.len() {
            return Err(BackendError::Malformed(format!(
                "{} translations for {} inputs",
                parsed.translations.len(),
                lines.len()
            )));
        }
        Ok(parsed.translations.into_iter().map(|t| t.text).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_key_selects_free_endpoint() {
        let mut config = BackendConfig::new();
        config.insert("api_key".to_string(), "abc123:fx".to_string());
        let backend = DeepLBackend::from_config(&config);
        assert_eq!(backend.api_base, FREE_API_BASE);
    }

    #[test]
    fn test_pro_key_selects_pro_endpoint() {
        let mut config = BackendConfig::new();
        config.insert("api_key".to_string(), "abc123".to_string());
        let backend = DeepLBackend::from_config(&config);
        assert_eq!(backend.api_base, PRO_API_BASE);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let backend = DeepLBackend::from_config(&BackendConfig::new());
        let err = backend
            .translate_batch(&["hi".to_string()], "en", "de", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotConfigured(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_not_generative() {
        let backend = DeepLBackend::from_config(&BackendConfig::new());
        assert!(!backend.is_generative());
        assert!(!backend.supports_glossary());
    }
}
