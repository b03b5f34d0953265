//! Soft-delete with batch manifests.
//!
//! Deleted subtitles move into `<media_root>/.sublarr_trash/<batch_id>/`
//! with a `manifest.json` recording (original, trashed) pairs. The manifest
//! is the source of truth for restore; batches are purged by age.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::paths::{ensure_within, quality_sidecar_path, PathSafetyError};

/// Hidden directory under the media root that holds trash batches.
pub const TRASH_DIR_NAME: &str = ".sublarr_trash";

const MANIFEST_NAME: &str = "manifest.json";

/// Errors raised by trash operations.
#[derive(Debug, Error)]
pub enum TrashError {
    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    #[error(transparent)]
    PathSafety(#[from] PathSafetyError),

    #[error("Manifest error in batch {batch_id}: {message}")]
    Manifest { batch_id: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One (original, trashed) pair inside a batch manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrashEntry {
    pub original_path: PathBuf,
    pub trashed_path: PathBuf,
}

/// A trash batch manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrashBatch {
    pub batch_id: String,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<TrashEntry>,
}

/// Soft-delete manager rooted at the media library.
pub struct TrashManager {
    media_root: PathBuf,
}

impl TrashManager {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
        }
    }

    fn trash_root(&self) -> PathBuf {
        self.media_root.join(TRASH_DIR_NAME)
    }

    fn batch_dir(&self, batch_id: &str) -> PathBuf {
        self.trash_root().join(batch_id)
    }

    /// Move `paths` into a new trash batch and return its manifest.
    ///
    /// Every path must resolve under the media root. Quality sidecars move
    /// alongside their subtitle. Paths that do not exist are skipped.
    pub fn soft_delete(&self, paths: &[PathBuf]) -> Result<TrashBatch, TrashError> {
        let batch_id = uuid::Uuid::new_v4().to_string();
        let batch_dir = self.batch_dir(&batch_id);
        fs::create_dir_all(&batch_dir)?;

        let mut entries = Vec::new();
        for path in paths {
            let resolved = ensure_within(path, &self.media_root)?;
            if !resolved.exists() {
                debug!("Skipping missing file in soft-delete: {:?}", resolved);
                continue;
            }
            let file_name = resolved
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "file".into());
            let mut trashed = batch_dir.join(&file_name);
            // Disambiguate same-named files from different directories.
            let mut suffix = 1;
            while trashed.exists() {
                trashed = batch_dir.join(format!("{}.{}", file_name.to_string_lossy(), suffix));
                suffix += 1;
            }
            fs::rename(&resolved, &trashed)?;
            entries.push(TrashEntry {
                original_path: resolved.clone(),
                trashed_path: trashed.clone(),
            });

            let sidecar = quality_sidecar_path(&resolved);
            if sidecar.exists() {
                let trashed_sidecar = quality_sidecar_path(&trashed);
                if fs::rename(&sidecar, &trashed_sidecar).is_ok() {
                    entries.push(TrashEntry {
                        original_path: sidecar,
                        trashed_path: trashed_sidecar,
                    });
                }
            }
        }

        let batch = TrashBatch {
            batch_id: batch_id.clone(),
            created_at: Utc::now(),
            entries,
        };
        let manifest = serde_json::to_vec_pretty(&batch).map_err(|e| TrashError::Manifest {
            batch_id: batch_id.clone(),
            message: e.to_string(),
        })?;
        fs::write(batch_dir.join(MANIFEST_NAME), manifest)?;
        info!(
            "Soft-deleted {} file(s) into trash batch {}",
            batch.entries.len(),
            batch_id
        );
        Ok(batch)
    }

    /// Load one batch manifest.
    pub fn get_batch(&self, batch_id: &str) -> Result<TrashBatch, TrashError> {
        let manifest_path = self.batch_dir(batch_id).join(MANIFEST_NAME);
        if !manifest_path.exists() {
            return Err(TrashError::BatchNotFound(batch_id.to_string()));
        }
        let raw = fs::read_to_string(&manifest_path)?;
        serde_json::from_str(&raw).map_err(|e| TrashError::Manifest {
            batch_id: batch_id.to_string(),
            message: e.to_string(),
        })
    }

    /// List all batches, newest first.
    pub fn list_batches(&self) -> Result<Vec<TrashBatch>, TrashError> {
        let trash_root = self.trash_root();
        if !trash_root.exists() {
            return Ok(Vec::new());
        }
        let mut batches = Vec::new();
        for entry in fs::read_dir(&trash_root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let batch_id = entry.file_name().to_string_lossy().to_string();
            match self.get_batch(&batch_id) {
                Ok(batch) => batches.push(batch),
                Err(e) => warn!("Unreadable trash batch {}: {}", batch_id, e),
            }
        }
        batches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(batches)
    }

    /// Restore every entry of a batch to its original path, then remove the
    /// batch directory and manifest.
    pub fn restore(&self, batch_id: &str) -> Result<Vec<PathBuf>, TrashError> {
        let batch = self.get_batch(batch_id)?;
        let mut restored = Vec::new();
        for entry in &batch.entries {
            ensure_within(&entry.original_path, &self.media_root)?;
            if let Some(parent) = entry.original_path.parent() {
                fs::create_dir_all(parent)?;
            }
            if entry.trashed_path.exists() {
                fs::rename(&entry.trashed_path, &entry.original_path)?;
                restored.push(entry.original_path.clone());
            } else {
                warn!(
                    "Trash entry missing on restore of batch {}: {:?}",
                    batch_id, entry.trashed_path
                );
            }
        }
        fs::remove_dir_all(self.batch_dir(batch_id))?;
        info!("Restored {} file(s) from batch {}", restored.len(), batch_id);
        Ok(restored)
    }

    /// Permanently delete a batch.
    pub fn delete_batch(&self, batch_id: &str) -> Result<(), TrashError> {
        let dir = self.batch_dir(batch_id);
        if !dir.exists() {
            return Err(TrashError::BatchNotFound(batch_id.to_string()));
        }
        ensure_within(&dir, &self.trash_root())?;
        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    /// Delete batches older than `retention_days`. Returns how many were purged.
    pub fn purge_expired(&self, retention_days: i64) -> Result<usize, TrashError> {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let mut purged = 0;
        for batch in self.list_batches()? {
            if batch.created_at < cutoff {
                self.delete_batch(&batch.batch_id)?;
                purged += 1;
            }
        }
        if purged > 0 {
            info!("Purged {} expired trash batch(es)", purged);
        }
        Ok(purged)
    }
}
