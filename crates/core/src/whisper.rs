//! Whisper ASR service client.
//!
//! Last-resort transcription: when no subtitle exists anywhere, the
//! pipeline submits the video's audio to a Whisper service and re-enters
//! the translator with the transcribed SRT once the job completes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors from the Whisper service.
#[derive(Debug, Error)]
pub enum WhisperError {
    #[error("Whisper service unreachable: {0}")]
    Connection(String),

    #[error("Whisper API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Transcription failed: {0}")]
    Failed(String),
}

/// Status of a transcription job on the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhisperJobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// A transcription job as reported by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct WhisperJob {
    pub id: String,
    pub status: WhisperJobStatus,
    /// SRT text, present when completed.
    #[serde(default)]
    pub srt: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    file_path: &'a str,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

/// HTTP client for a Whisper ASR sidecar service.
pub struct WhisperClient {
    client: reqwest::Client,
    base_url: String,
}

impl WhisperClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn health_check(&self) -> Result<(), WhisperError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| WhisperError::Connection(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(WhisperError::Api {
                status: response.status().as_u16(),
                message: "health failed".to_string(),
            })
        }
    }

    /// Submit a transcription job; returns the service-side job id.
    pub async fn submit(&self, file_path: &str, language: &str) -> Result<String, WhisperError> {
        debug!("Submitting Whisper job for {file_path} ({language})");
        let response = self
            .client
            .post(format!("{}/transcribe", self.base_url))
            .json(&SubmitRequest {
                file_path,
                language,
            })
            .send()
            .await
            .map_err(|e| WhisperError::Connection(e.to_string()))?;
        let status = response.status().as_u16();
        if status != 200 && status != 202 {
            return Err(WhisperError::Api {
                status,
                message: response.text().await.unwrap_or_default(),
            });
        }
        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| WhisperError::Malformed(e.to_string()))?;
        Ok(parsed.id)
    }

    /// Fetch the current state of a job.
    pub async fn get_job(&self, id: &str) -> Result<WhisperJob, WhisperError> {
        let response = self
            .client
            .get(format!("{}/jobs/{id}", self.base_url))
            .send()
            .await
            .map_err(|e| WhisperError::Connection(e.to_string()))?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(WhisperError::Api {
                status,
                message: response.text().await.unwrap_or_default(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| WhisperError::Malformed(e.to_string()))
    }

    /// Poll until the job leaves the queue, bounded by `deadline`.
    pub async fn wait_for_completion(
        &self,
        id: &str,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Result<WhisperJob, WhisperError> {
        let started = std::time::Instant::now();
        loop {
            let job = self.get_job(id).await?;
            match job.status {
                WhisperJobStatus::Completed => return Ok(job),
                WhisperJobStatus::Failed => {
                    return Err(WhisperError::Failed(
                        job.error.unwrap_or_else(|| "unknown".to_string()),
                    ))
                }
                _ => {}
            }
            if started.elapsed() >= deadline {
                return Err(WhisperError::Failed(format!(
                    "job {id} did not finish within {deadline:?}"
                )));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_parsing() {
        let json = r#"{"id": "w1", "status": "completed", "srt": "1\n00:00:01,000 --> 00:00:02,000\nhi\n"}"#;
        let job: WhisperJob = serde_json::from_str(json).unwrap();
        assert_eq!(job.status, WhisperJobStatus::Completed);
        assert!(job.srt.is_some());
    }

    #[test]
    fn test_failed_job_parsing() {
        let json = r#"{"id": "w1", "status": "failed", "error": "no audio"}"#;
        let job: WhisperJob = serde_json::from_str(json).unwrap();
        assert_eq!(job.status, WhisperJobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("no audio"));
    }

    #[test]
    fn test_base_url_trimmed() {
        let client = WhisperClient::new("http://whisper:9000/");
        assert_eq!(client.base_url, "http://whisper:9000");
    }
}
