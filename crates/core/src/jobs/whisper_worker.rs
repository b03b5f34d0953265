//! Whisper completion worker.
//!
//! Polls the ASR service for jobs the translator enqueued. When a
//! transcription lands, the SRT is written next to the video and the
//! translator re-enters at the external-SRT case; the owning wanted row
//! (stuck in `searching` since case D) moves to `found` or back to
//! `wanted`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::store::{
    JobStatus, SettingsStore, SqliteJobStore, SqliteWantedStore, SubtitleKind, WantedStatus,
};
use crate::subtitles::{sidecar_path, SubtitleFormat};
use crate::translator::{TranslateOutcome, Translator};
use crate::whisper::{WhisperClient, WhisperJobStatus};

/// Background poller that completes Whisper jobs.
pub struct WhisperWorker {
    jobs: Arc<SqliteJobStore>,
    wanted: Arc<SqliteWantedStore>,
    translator: Arc<Translator>,
    whisper: Arc<WhisperClient>,
    settings: Arc<dyn SettingsStore>,
    running: Arc<AtomicBool>,
}

impl WhisperWorker {
    pub fn new(
        jobs: Arc<SqliteJobStore>,
        wanted: Arc<SqliteWantedStore>,
        translator: Arc<Translator>,
        whisper: Arc<WhisperClient>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            jobs,
            wanted,
            translator,
            whisper,
            settings,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the poll loop.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Whisper worker already running");
            return;
        }
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            info!("Whisper worker started");
            let interval = Duration::from_secs(
                worker.settings.get_i64("whisper.poll_interval_seconds", 30) as u64,
            );
            while worker.running.load(Ordering::Relaxed) {
                worker.poll_once().await;
                tokio::time::sleep(interval).await;
            }
            info!("Whisper worker stopped");
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// One poll pass over pending whisper jobs.
    pub async fn poll_once(&self) {
        let pending = match self.jobs.list(Some(JobStatus::Queued), 50, 0) {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("Whisper worker cannot list jobs: {e}");
                return;
            }
        };
        for job in pending {
            let Some(stats) = job.stats.as_ref() else {
                continue;
            };
            let Some(service_id) = stats.get("whisper_job_id").and_then(|v| v.as_str()) else {
                continue;
            };
            let source_language = stats
                .get("source_language")
                .and_then(|v| v.as_str())
                .unwrap_or("en")
                .to_string();

            match self.whisper.get_job(service_id).await {
                Ok(remote) => match remote.status {
                    WhisperJobStatus::Completed => {
                        self.complete_job(&job.id, &job.file_path, &source_language, remote.srt)
                            .await;
                    }
                    WhisperJobStatus::Failed => {
                        let error = remote.error.unwrap_or_else(|| "unknown".to_string());
                        warn!("Whisper job {} failed: {error}", job.id);
                        let _ = self
                            .jobs
                            .mark_failed(&job.id, &format!("transcription failed: {error}"));
                        self.fail_wanted(&job.file_path, &error);
                    }
                    _ => debug!("Whisper job {} still {:?}", job.id, remote.status),
                },
                Err(e) => debug!("Whisper poll for {} failed: {e}", job.id),
            }
        }
    }

    /// Transcription landed: write the SRT, re-enter the translator.
    async fn complete_job(
        &self,
        job_id: &str,
        file_path: &str,
        source_language: &str,
        srt: Option<String>,
    ) {
        let Some(srt) = srt.filter(|s| !s.trim().is_empty()) else {
            let _ = self.jobs.mark_failed(job_id, "transcription returned no text");
            self.fail_wanted(file_path, "transcription returned no text");
            return;
        };
        let video = Path::new(file_path);
        let srt_path = sidecar_path(video, source_language, false, SubtitleFormat::Srt);
        if let Err(e) = crate::fsops::atomic_write(&srt_path, srt.as_bytes()) {
            warn!("Cannot write transcription for {file_path}: {e}");
            let _ = self.jobs.mark_failed(job_id, &e.to_string());
            return;
        }
        info!("Transcription for {file_path} written to {:?}", srt_path);

        // Re-enter case C2b for every pending target language of this file.
        let targets = self.pending_targets(file_path);
        for target in targets {
            let outcome = self
                .translator
                .translate_srt_file(video, &srt_path, &target, None)
                .await;
            match &outcome {
                TranslateOutcome::Success { output_path, .. } => {
                    info!("Whisper re-entry produced {output_path}");
                    self.resolve_wanted(file_path, &target, true);
                }
                other => {
                    warn!("Whisper re-entry for {file_path} ({target}) did not succeed: {other:?}");
                    self.resolve_wanted(file_path, &target, false);
                }
            }
        }
        // The job row is completed by the translator's own job bookkeeping;
        // mark the whisper job itself done.
        let _ = self.jobs.mark_completed(
            job_id,
            &srt_path.to_string_lossy(),
            None,
            "whisper",
        );
    }

    fn pending_targets(&self, file_path: &str) -> Vec<String> {
        // Wanted rows in `searching` for this file are waiting on us.
        let mut targets = Vec::new();
        if let Ok(items) = self.wanted.list(&crate::store::WantedFilter {
            status: Some(WantedStatus::Searching),
            limit: 100,
            ..Default::default()
        }) {
            for item in items {
                if item.file_path == file_path && item.subtitle_kind == SubtitleKind::Full {
                    targets.push(item.target_language);
                }
            }
        }
        if targets.is_empty() {
            targets.push(
                self.settings
                    .get_string("translation.target_language", "de"),
            );
        }
        targets
    }

    fn resolve_wanted(&self, file_path: &str, target: &str, success: bool) {
        if let Ok(Some(item)) =
            self.wanted
                .get_by_tuple(file_path, target, SubtitleKind::Full)
        {
            let status = if success {
                WantedStatus::Found
            } else {
                WantedStatus::Wanted
            };
            let _ = self.wanted.update_status(item.id, status, None);
        }
    }

    fn fail_wanted(&self, file_path: &str, error: &str) {
        if let Ok(items) = self.wanted.list(&crate::store::WantedFilter {
            status: Some(WantedStatus::Searching),
            limit: 100,
            ..Default::default()
        }) {
            for item in items {
                if item.file_path == file_path {
                    let _ = self
                        .wanted
                        .update_status(item.id, WantedStatus::Wanted, Some(error));
                }
            }
        }
    }
}
