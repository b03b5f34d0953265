//! WebSocket support for real-time dashboard updates.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use sublarr_core::{BatchProgress, ScanSummary, ScannerEvent};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_MESSAGES_SENT};
use crate::state::AppState;

/// WebSocket message sent to clients for real-time updates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// A translation job changed state.
    JobUpdate {
        job_id: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        output_path: Option<String>,
    },
    BatchProgress {
        batch: BatchProgress,
    },
    BatchCompleted {
        batch_id: String,
        completed: usize,
        failed: usize,
    },
    WantedScanCompleted {
        summary: ScanSummary,
    },
    WantedSearchProgress {
        item_id: i64,
        status: String,
    },
    WantedBatchProgress {
        batch: BatchProgress,
    },
    WantedBatchCompleted {
        batch_id: String,
        completed: usize,
        failed: usize,
    },
    RetranslationProgress {
        batch: BatchProgress,
    },
    RetranslationCompleted {
        batch_id: String,
        completed: usize,
        failed: usize,
    },
    WebhookReceived {
        manager: String,
    },
    WebhookCompleted {
        manager: String,
        new_items: usize,
    },
    ConfigUpdated {
        keys: Vec<String>,
    },
    ScanComplete {
        items_seen: usize,
    },
}

impl WsMessage {
    fn kind(&self) -> &'static str {
        match self {
            WsMessage::JobUpdate { .. } => "job_update",
            WsMessage::BatchProgress { .. } => "batch_progress",
            WsMessage::BatchCompleted { .. } => "batch_completed",
            WsMessage::WantedScanCompleted { .. } => "wanted_scan_completed",
            WsMessage::WantedSearchProgress { .. } => "wanted_search_progress",
            WsMessage::WantedBatchProgress { .. } => "wanted_batch_progress",
            WsMessage::WantedBatchCompleted { .. } => "wanted_batch_completed",
            WsMessage::RetranslationProgress { .. } => "retranslation_progress",
            WsMessage::RetranslationCompleted { .. } => "retranslation_completed",
            WsMessage::WebhookReceived { .. } => "webhook_received",
            WsMessage::WebhookCompleted { .. } => "webhook_completed",
            WsMessage::ConfigUpdated { .. } => "config_updated",
            WsMessage::ScanComplete { .. } => "scan_complete",
        }
    }
}

/// Broadcaster for WebSocket messages using a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct WsBroadcaster {
    sender: broadcast::Sender<WsMessage>,
}

impl WsBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast a message to all connected clients. Send errors just mean
    /// no one is listening.
    pub fn broadcast(&self, msg: WsMessage) {
        let _ = self.sender.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.sender.subscribe()
    }

    /// Forward a scanner event as the matching WS message.
    pub fn forward_scanner_event(&self, event: ScannerEvent) {
        let message = match event {
            ScannerEvent::WantedScanCompleted { summary } => {
                WsMessage::WantedScanCompleted { summary }
            }
            ScannerEvent::WantedSearchProgress { item_id, status } => {
                WsMessage::WantedSearchProgress { item_id, status }
            }
            ScannerEvent::ScanComplete { items_seen } => WsMessage::ScanComplete { items_seen },
            ScannerEvent::WebhookReceived { manager } => WsMessage::WebhookReceived { manager },
            ScannerEvent::WebhookCompleted { manager, new_items } => {
                WsMessage::WebhookCompleted { manager, new_items }
            }
        };
        self.broadcast(message);
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ws_broadcaster().subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!("WebSocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    WS_MESSAGES_SENT.with_label_values(&[msg.kind()]).inc();
                    match serde_json::to_string(&msg) {
                        Ok(json) => {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                debug!("WebSocket send failed, client disconnected");
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to serialize WsMessage: {e}"),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged, skipped {n} messages");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => {
                debug!("Received client message: {text}");
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {e}");
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}
