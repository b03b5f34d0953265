//! Webhook-driven processing.
//!
//! A "download complete" webhook from an arr instance runs: optional
//! delay, targeted scan of the affected entity, the wanted pipeline over
//! any new rows, and a final notification event. Every phase is
//! independently toggleable in settings.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::integrations::WebhookPayload;
use crate::pipeline::PipelineOutcome;
use crate::store::{WantedFilter, WantedStatus};

use super::{Scanner, ScannerEvent};

/// Outcome reported to the webhook caller (the HTTP handler responds
/// immediately; the work itself runs in the background).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// A `Test` event: acknowledged, no work.
    TestOk,
    /// A non-download event: acknowledged and ignored.
    Ignored,
    /// A download event: processing scheduled.
    Accepted,
}

impl Scanner {
    /// Classify a webhook and, for download events, run the phased
    /// processing in the background.
    pub fn handle_webhook(self: &Arc<Self>, manager: &str, payload: WebhookPayload) -> WebhookOutcome {
        if payload.is_test() {
            debug!("Webhook test event from {manager}");
            return WebhookOutcome::TestOk;
        }
        if !payload.is_download() {
            debug!(
                "Ignoring webhook event {} from {manager}",
                payload.event_type
            );
            return WebhookOutcome::Ignored;
        }

        self.emit(ScannerEvent::WebhookReceived {
            manager: manager.to_string(),
        });

        let scanner = Arc::clone(self);
        let manager = manager.to_string();
        tokio::spawn(async move {
            scanner.process_webhook(&manager, payload).await;
        });
        WebhookOutcome::Accepted
    }

    async fn process_webhook(self: &Arc<Self>, manager: &str, payload: WebhookPayload) {
        // Phase 1: configurable delay so the arr import settles.
        let delay_secs = self.settings.get_i64("webhook.delay_seconds", 10) as u64;
        if delay_secs > 0 {
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
        }

        // Phase 2: targeted scan of the affected entity.
        let mut new_item_ids = Vec::new();
        if self.settings.get_bool("webhook.scan_enabled", true) {
            new_item_ids = self.targeted_scan(manager, &payload).await;
        }

        // Phase 3: pipeline over the new rows.
        if self.settings.get_bool("webhook.search_enabled", true) {
            for item_id in &new_item_ids {
                match self.pipeline.process_item(*item_id, false).await {
                    PipelineOutcome::Found { output_path, .. } => {
                        info!("Webhook item {item_id} resolved to {output_path}");
                    }
                    outcome => debug!("Webhook item {item_id}: {outcome:?}"),
                }
            }
        }

        // Phase 4: completion notification.
        self.emit(ScannerEvent::WebhookCompleted {
            manager: manager.to_string(),
            new_items: new_item_ids.len(),
        });
        info!(
            "Webhook from {manager} processed ({} new item(s))",
            new_item_ids.len()
        );
    }

    /// Scan just the webhook's series/movie; returns newly created wanted
    /// row ids.
    async fn targeted_scan(self: &Arc<Self>, manager: &str, payload: &WebhookPayload) -> Vec<i64> {
        let before: std::collections::HashSet<i64> = self
            .wanted
            .list(&WantedFilter::new().with_limit(10_000))
            .map(|items| items.iter().map(|i| i.id).collect())
            .unwrap_or_default();

        let library = self.libraries.iter().find(|l| l.name() == manager);
        let mut summary = super::ScanSummary::default();

        match (&payload.series, library) {
            (Some(series), Some(library)) => {
                match library.list_series_items(series.id).await {
                    Ok(items) => {
                        for item in items {
                            self.reconcile_item(&item, &mut summary);
                        }
                    }
                    Err(e) => warn!("Targeted scan of series {} failed: {e}", series.id),
                }
            }
            _ => {
                // Movie webhook or unknown manager: reconcile everything the
                // manager lists (movies are cheap to enumerate).
                if let Some(library) = library {
                    match library.list_items().await {
                        Ok(items) => {
                            let movie_id = payload.movie.as_ref().map(|m| m.id);
                            for item in items {
                                if movie_id.is_none() || movie_id == Some(item.id) {
                                    self.reconcile_item(&item, &mut summary);
                                }
                            }
                        }
                        Err(e) => warn!("Targeted movie scan failed: {e}"),
                    }
                }
            }
        }

        self.wanted
            .list(&WantedFilter::new().with_limit(10_000))
            .map(|items| {
                items
                    .iter()
                    .filter(|i| i.status == WantedStatus::Wanted && !before.contains(&i.id))
                    .map(|i| i.id)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::WebhookPayload;

    fn payload(event_type: &str) -> WebhookPayload {
        serde_json::from_str(&format!(r#"{{"eventType": "{event_type}"}}"#)).unwrap()
    }

    #[test]
    fn test_outcome_classification() {
        assert!(payload("Test").is_test());
        assert!(payload("Download").is_download());
        assert!(!payload("Rename").is_download());
        assert!(!payload("Rename").is_test());
    }

    #[test]
    fn test_outcome_serialization() {
        assert_eq!(
            serde_json::to_string(&WebhookOutcome::Accepted).unwrap(),
            "\"accepted\""
        );
    }
}
