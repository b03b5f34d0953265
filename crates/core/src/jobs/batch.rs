//! In-flight batch progress tracking.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

/// Progress snapshot of one batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub batch_id: String,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// What the batch is working on right now.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    pub done: bool,
}

impl BatchProgress {
    fn new(batch_id: String, total: usize) -> Self {
        Self {
            batch_id,
            total,
            completed: 0,
            failed: 0,
            current: None,
            done: total == 0,
        }
    }
}

/// Registry of in-flight batches, guarded by its own mutex.
#[derive(Default)]
pub struct BatchTracker {
    batches: Mutex<HashMap<String, BatchProgress>>,
}

impl BatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, batch_id: &str, total: usize) -> BatchProgress {
        let progress = BatchProgress::new(batch_id.to_string(), total);
        self.batches
            .lock()
            .unwrap()
            .insert(batch_id.to_string(), progress.clone());
        progress
    }

    pub fn set_current(&self, batch_id: &str, current: &str) {
        if let Some(progress) = self.batches.lock().unwrap().get_mut(batch_id) {
            progress.current = Some(current.to_string());
        }
    }

    /// Record one finished item; returns the updated snapshot.
    pub fn record(&self, batch_id: &str, success: bool) -> Option<BatchProgress> {
        let mut batches = self.batches.lock().unwrap();
        let progress = batches.get_mut(batch_id)?;
        if success {
            progress.completed += 1;
        } else {
            progress.failed += 1;
        }
        if progress.completed + progress.failed >= progress.total {
            progress.done = true;
            progress.current = None;
        }
        Some(progress.clone())
    }

    pub fn get(&self, batch_id: &str) -> Option<BatchProgress> {
        self.batches.lock().unwrap().get(batch_id).cloned()
    }

    pub fn all(&self) -> Vec<BatchProgress> {
        self.batches.lock().unwrap().values().cloned().collect()
    }

    /// Drop finished batches, keeping active ones.
    pub fn prune_done(&self) {
        self.batches.lock().unwrap().retain(|_, p| !p.done);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_lifecycle() {
        let tracker = BatchTracker::new();
        tracker.start("b1", 2);
        tracker.set_current("b1", "/m/e1.mkv");

        let p = tracker.record("b1", true).unwrap();
        assert_eq!(p.completed, 1);
        assert!(!p.done);

        let p = tracker.record("b1", false).unwrap();
        assert_eq!(p.failed, 1);
        assert!(p.done);
        assert!(p.current.is_none());
    }

    #[test]
    fn test_empty_batch_immediately_done() {
        let tracker = BatchTracker::new();
        let p = tracker.start("b1", 0);
        assert!(p.done);
    }

    #[test]
    fn test_unknown_batch_record_is_none() {
        let tracker = BatchTracker::new();
        assert!(tracker.record("nope", true).is_none());
    }

    #[test]
    fn test_prune_done() {
        let tracker = BatchTracker::new();
        tracker.start("done", 0);
        tracker.start("active", 3);
        tracker.prune_done();
        assert!(tracker.get("done").is_none());
        assert!(tracker.get("active").is_some());
    }
}
