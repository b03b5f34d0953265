//! Durable SQLite-backed work queue.
//!
//! Rows survive restarts; a poller claims queued rows in FIFO order and
//! hands them to the executor. Rows that were `running` at startup are
//! re-queued (the process died mid-item).

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use super::{JobQueue, QueueError, WorkExecutor, WorkItem, WorkStatus};

/// Durable work queue.
pub struct SqliteWorkQueue {
    conn: Arc<Mutex<Connection>>,
    running: Arc<AtomicBool>,
    poller: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SqliteWorkQueue {
    pub fn new(path: &Path) -> Result<Self, QueueError> {
        let conn = Connection::open(path).map_err(|e| QueueError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Self::requeue_stale(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            running: Arc::new(AtomicBool::new(false)),
            poller: Mutex::new(None),
        })
    }

    pub fn in_memory() -> Result<Self, QueueError> {
        let conn =
            Connection::open_in_memory().map_err(|e| QueueError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            running: Arc::new(AtomicBool::new(false)),
            poller: Mutex::new(None),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), QueueError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS work_queue (
                id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'queued',
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_work_status ON work_queue(status);
            "#,
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;
        Ok(())
    }

    fn requeue_stale(conn: &Connection) -> Result<(), QueueError> {
        let n = conn
            .execute(
                "UPDATE work_queue SET status = 'queued', updated_at = ? WHERE status = 'running'",
                params![Utc::now().to_rfc3339()],
            )
            .map_err(|e| QueueError::Database(e.to_string()))?;
        if n > 0 {
            info!("Re-queued {n} interrupted work item(s)");
        }
        Ok(())
    }

    /// Claim the oldest queued item, marking it running.
    fn claim_next(conn: &Arc<Mutex<Connection>>) -> Option<(String, WorkItem)> {
        let conn = conn.lock().unwrap();
        let row: (String, String) = conn
            .query_row(
                "SELECT id, payload FROM work_queue WHERE status = 'queued' \
                 ORDER BY created_at ASC, id ASC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .ok()
            .flatten()?;
        let (id, payload) = row;
        let claimed = conn
            .execute(
                "UPDATE work_queue SET status = 'running', updated_at = ? \
                 WHERE id = ? AND status = 'queued'",
                params![Utc::now().to_rfc3339(), id],
            )
            .unwrap_or(0);
        if claimed == 0 {
            return None;
        }
        match serde_json::from_str::<WorkItem>(&payload) {
            Ok(item) => Some((id, item)),
            Err(e) => {
                warn!("Dropping undecodable work item {id}: {e}");
                let _ = conn.execute(
                    "UPDATE work_queue SET status = 'failed', error = ?, updated_at = ? WHERE id = ?",
                    params![e.to_string(), Utc::now().to_rfc3339(), id],
                );
                None
            }
        }
    }

    fn finish(conn: &Arc<Mutex<Connection>>, id: &str, result: &Result<(), String>) {
        let conn = conn.lock().unwrap();
        let (status, error) = match result {
            Ok(()) => ("completed", None),
            Err(e) => ("failed", Some(e.clone())),
        };
        let _ = conn.execute(
            "UPDATE work_queue SET status = ?, error = ?, updated_at = ? WHERE id = ?",
            params![status, error, Utc::now().to_rfc3339(), id],
        );
    }

    /// Start the polling worker.
    pub fn start(&self, executor: WorkExecutor, poll_interval: Duration) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Durable queue poller already running");
            return;
        }
        let conn = Arc::clone(&self.conn);
        let running = Arc::clone(&self.running);
        let handle = tokio::spawn(async move {
            info!("Durable work queue poller started");
            while running.load(Ordering::Relaxed) {
                match Self::claim_next(&conn) {
                    Some((id, item)) => {
                        debug!("Durable queue executing {id}: {item:?}");
                        let result = executor(item).await;
                        Self::finish(&conn, &id, &result);
                    }
                    None => {
                        tokio::time::sleep(poll_interval).await;
                    }
                }
            }
            info!("Durable work queue poller stopped");
        });
        *self.poller.lock().unwrap() = Some(handle);
    }

    pub fn count(&self, status: WorkStatus) -> Result<i64, QueueError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM work_queue WHERE status = ?",
            params![status.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| QueueError::Database(e.to_string()))
    }
}

#[async_trait]
impl JobQueue for SqliteWorkQueue {
    fn name(&self) -> &str {
        "durable"
    }

    async fn enqueue(&self, item: WorkItem) -> Result<String, QueueError> {
        let payload =
            serde_json::to_string(&item).map_err(|e| QueueError::Database(e.to_string()))?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO work_queue (id, payload, status, created_at, updated_at) \
             VALUES (?, ?, 'queued', ?, ?)",
            params![id, payload, now, now],
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;
        Ok(id)
    }

    async fn status(&self, work_id: &str) -> Option<WorkStatus> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT status FROM work_queue WHERE id = ?",
            params![work_id],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .ok()
        .flatten()
        .and_then(|s| WorkStatus::parse(&s))
    }

    async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.poller.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
