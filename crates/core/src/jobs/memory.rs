//! In-process worker-pool queue.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::{JobQueue, QueueError, WorkExecutor, WorkItem, WorkStatus};

/// Bounded in-memory FIFO queue with a fixed worker pool.
///
/// Best-effort delivery: items are lost across restarts and have no
/// queryable status.
pub struct InMemoryJobQueue {
    tx: Mutex<Option<mpsc::Sender<WorkItem>>>,
    workers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl InMemoryJobQueue {
    pub fn new(worker_count: usize, capacity: usize, executor: WorkExecutor) -> Self {
        let (tx, rx) = mpsc::channel::<WorkItem>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let mut workers = Vec::new();
        for worker_id in 0..worker_count.max(1) {
            let rx = Arc::clone(&rx);
            let executor = Arc::clone(&executor);
            workers.push(tokio::spawn(async move {
                loop {
                    let item = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(item) = item else {
                        debug!("Queue worker {worker_id} draining out");
                        break;
                    };
                    debug!("Queue worker {worker_id} picked up {item:?}");
                    if let Err(e) = executor(item).await {
                        warn!("Queue worker {worker_id} item failed: {e}");
                    }
                }
            }));
        }
        info!("In-memory job queue started with {} worker(s)", worker_count.max(1));
        Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    fn name(&self) -> &str {
        "memory"
    }

    async fn enqueue(&self, item: WorkItem) -> Result<String, QueueError> {
        let tx = self.tx.lock().await;
        let Some(tx) = tx.as_ref() else {
            return Err(QueueError::Stopped);
        };
        tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Stopped,
        })?;
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn status(&self, _work_id: &str) -> Option<WorkStatus> {
        None
    }

    async fn shutdown(&self) {
        // Dropping the sender lets workers drain the channel and exit.
        self.tx.lock().await.take();
        let mut workers = self.workers.lock().await;
        for worker in workers.drain(..) {
            let _ = worker.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_executor(counter: Arc<AtomicU32>) -> WorkExecutor {
        Arc::new(move |_item| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_items_executed() {
        let counter = Arc::new(AtomicU32::new(0));
        let queue = InMemoryJobQueue::new(2, 16, counting_executor(Arc::clone(&counter)));
        for i in 0..5 {
            queue
                .enqueue(WorkItem::WantedSearch {
                    item_id: i,
                    force: false,
                })
                .await
                .unwrap();
        }
        queue.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_full_queue_refuses() {
        // One slow worker, capacity 1.
        let executor: WorkExecutor = Arc::new(|_| {
            Box::pin(async {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                Ok(())
            })
        });
        let queue = InMemoryJobQueue::new(1, 1, executor);
        // First fills the worker, second fills the channel; the next is
        // refused.
        let mut refused = false;
        for i in 0..4 {
            if matches!(
                queue
                    .enqueue(WorkItem::WantedSearch {
                        item_id: i,
                        force: false
                    })
                    .await,
                Err(QueueError::Full)
            ) {
                refused = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(refused);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_refuses() {
        let counter = Arc::new(AtomicU32::new(0));
        let queue = InMemoryJobQueue::new(1, 4, counting_executor(counter));
        queue.shutdown().await;
        let result = queue
            .enqueue(WorkItem::WantedSearch {
                item_id: 1,
                force: false,
            })
            .await;
        assert!(matches!(result, Err(QueueError::Stopped)));
    }

    #[tokio::test]
    async fn test_status_is_best_effort_none() {
        let counter = Arc::new(AtomicU32::new(0));
        let queue = InMemoryJobQueue::new(1, 4, counting_executor(counter));
        let id = queue
            .enqueue(WorkItem::WantedSearch {
                item_id: 1,
                force: false,
            })
            .await
            .unwrap();
        assert!(queue.status(&id).await.is_none());
        queue.shutdown().await;
    }
}
