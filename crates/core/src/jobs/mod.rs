//! Background work dispatch.
//!
//! Two queue backends share one interface: an in-process worker pool
//! (FIFO, best-effort, lost across restarts) and a durable SQLite-backed
//! queue whose jobs survive restarts and can be queried. The pipeline is
//! agnostic to which backend is wired; with no queue registered callers
//! may execute work synchronously.

mod batch;
mod durable;
mod memory;
mod whisper_worker;

pub use batch::{BatchProgress, BatchTracker};
pub use durable::SqliteWorkQueue;
pub use memory::InMemoryJobQueue;
pub use whisper_worker::WhisperWorker;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors from queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue full")]
    Full,

    #[error("Queue stopped")]
    Stopped,

    #[error("Database error: {0}")]
    Database(String),
}

/// A unit of background work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkItem {
    /// Run the wanted pipeline for one item.
    WantedSearch { item_id: i64, force: bool },
    /// Run the wanted pipeline over a batch, reporting progress under
    /// `batch_id`.
    WantedBatch { item_ids: Vec<i64>, batch_id: String },
    /// Run the translator waterfall for one file.
    TranslateFile {
        file_path: String,
        target_language: String,
    },
    /// Webhook-driven processing of one library entity after the
    /// configured delay.
    WebhookScan {
        manager: String,
        series_id: Option<i64>,
        movie_id: Option<i64>,
    },
}

/// Status of a durable work row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Queued => "queued",
            WorkStatus::Running => "running",
            WorkStatus::Completed => "completed",
            WorkStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(WorkStatus::Queued),
            "running" => Some(WorkStatus::Running),
            "completed" => Some(WorkStatus::Completed),
            "failed" => Some(WorkStatus::Failed),
            _ => None,
        }
    }
}

/// Executor invoked by queue workers for each item.
pub type WorkExecutor =
    Arc<dyn Fn(WorkItem) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Background work dispatch interface.
#[async_trait]
pub trait JobQueue: Send + Sync {
    fn name(&self) -> &str;

    /// Enqueue an item; returns a work id (durable) or a synthetic id.
    async fn enqueue(&self, item: WorkItem) -> Result<String, QueueError>;

    /// Status lookup. In-memory queues return `None` (best effort).
    async fn status(&self, work_id: &str) -> Option<WorkStatus>;

    /// Stop accepting work and let workers drain.
    async fn shutdown(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_item_serialization() {
        let item = WorkItem::WantedSearch {
            item_id: 7,
            force: true,
        };
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"kind\":\"wanted_search\""));
        let parsed: WorkItem = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, item);
    }

    #[test]
    fn test_work_status_round_trip() {
        for status in [
            WorkStatus::Queued,
            WorkStatus::Running,
            WorkStatus::Completed,
            WorkStatus::Failed,
        ] {
            assert_eq!(WorkStatus::parse(status.as_str()), Some(status));
        }
    }
}
