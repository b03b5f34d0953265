//! Mock library manager serving a scripted item list.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::integrations::{IntegrationError, LibraryItem, LibraryManager};
use crate::store::ItemKind;

/// Mock library manager.
pub struct MockLibraryManager {
    name: String,
    items: Mutex<Vec<LibraryItem>>,
    rescan_calls: AtomicU32,
    healthy: bool,
}

impl MockLibraryManager {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Mutex::new(Vec::new()),
            rescan_calls: AtomicU32::new(0),
            healthy: true,
        }
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn with_episode(
        self,
        id: i64,
        series_id: i64,
        title: &str,
        season: u32,
        episode: u32,
        file_path: &str,
    ) -> Self {
        self.items.lock().unwrap().push(LibraryItem {
            kind: ItemKind::Episode,
            id,
            series_id: Some(series_id),
            title: title.to_string(),
            season: Some(season),
            episode: Some(episode),
            year: None,
            file_path: file_path.to_string(),
            imdb_id: None,
            tvdb_id: None,
            tmdb_id: None,
        });
        self
    }

    pub fn with_movie(self, id: i64, title: &str, year: u32, file_path: &str) -> Self {
        self.items.lock().unwrap().push(LibraryItem {
            kind: ItemKind::Movie,
            id,
            series_id: None,
            title: title.to_string(),
            season: None,
            episode: None,
            year: Some(year),
            file_path: file_path.to_string(),
            imdb_id: None,
            tvdb_id: None,
            tmdb_id: None,
        });
        self
    }

    /// Replace the item list mid-test (e.g. simulate a deleted episode).
    pub fn set_items(&self, items: Vec<LibraryItem>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn rescan_calls(&self) -> u32 {
        self.rescan_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LibraryManager for MockLibraryManager {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> Result<(), IntegrationError> {
        if self.healthy {
            Ok(())
        } else {
            Err(IntegrationError::Connection("mock is down".to_string()))
        }
    }

    async fn list_items(&self) -> Result<Vec<LibraryItem>, IntegrationError> {
        Ok(self.items.lock().unwrap().clone())
    }

    async fn list_series_items(&self, series_id: i64) -> Result<Vec<LibraryItem>, IntegrationError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.series_id == Some(series_id))
            .cloned()
            .collect())
    }

    async fn notify_rescan(&self, _item: &LibraryItem) -> Result<(), IntegrationError> {
        self.rescan_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
