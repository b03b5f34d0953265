//! Provider registry: lifecycle, admission gate and stats recording.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::store::{ProviderStats, SettingsStore, SqliteProviderStore, StoreError};

use super::rate_limiter::RateLimiterPool;
use super::types::{ProviderError, SubtitleProvider};

/// Default consecutive-failure threshold before auto-disable.
pub const DEFAULT_AUTO_DISABLE_THRESHOLD: u32 = 5;

/// Default auto-disable cooldown in minutes.
pub const DEFAULT_AUTO_DISABLE_COOLDOWN_MIN: i64 = 30;

/// Registry of subtitle providers.
///
/// Implementations are registered explicitly at startup. The registry owns
/// the per-provider rate-limit windows and the admission gate; durable
/// circuit state (auto-disable) lives in the provider store.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn SubtitleProvider>>,
    limiter: RateLimiterPool,
    store: Arc<SqliteProviderStore>,
    settings: Arc<dyn SettingsStore>,
}

impl ProviderRegistry {
    pub fn new(store: Arc<SqliteProviderStore>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            providers: HashMap::new(),
            limiter: RateLimiterPool::new(),
            store,
            settings,
        }
    }

    /// Register a provider implementation. Called once per provider at
    /// composition time.
    pub fn register(&mut self, provider: Arc<dyn SubtitleProvider>) {
        let name = provider.name().to_string();
        self.limiter.register(&name, provider.rate_budget());
        self.providers.insert(name, provider);
    }

    /// Wire credentials from settings and run provider initialization.
    pub async fn initialize_all(&self) {
        for (name, provider) in &self.providers {
            if !self.is_enabled(name) {
                continue;
            }
            let config = self
                .settings
                .get_prefixed(&format!("provider.{name}."))
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| {
                    let key = k
                        .strip_prefix(&format!("provider.{name}."))
                        .unwrap_or(&k)
                        .to_string();
                    (key, v)
                })
                .collect();
            match provider.initialize(&config).await {
                Ok(()) => info!("Provider {} initialized", name),
                Err(e) => warn!("Provider {} failed to initialize: {}", name, e),
            }
        }
    }

    pub async fn terminate_all(&self) {
        for provider in self.providers.values() {
            provider.terminate().await;
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn SubtitleProvider>> {
        self.providers.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether the provider is enabled in settings (default: enabled).
    pub fn is_enabled(&self, name: &str) -> bool {
        self.settings
            .get_bool(&format!("provider.{name}.enabled"), true)
    }

    /// Manual priority from settings; lower sorts first.
    pub fn manual_priority(&self, name: &str) -> i64 {
        self.settings
            .get_i64(&format!("provider.{name}.priority"), 100)
    }

    fn auto_disable_threshold(&self) -> u32 {
        self.settings.get_i64(
            "providers.auto_disable_threshold",
            DEFAULT_AUTO_DISABLE_THRESHOLD as i64,
        ) as u32
    }

    fn auto_disable_cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.settings.get_i64(
            "providers.auto_disable_cooldown_minutes",
            DEFAULT_AUTO_DISABLE_COOLDOWN_MIN,
        ))
    }

    /// Admission gate: refuse before any network contact when the provider
    /// is disabled, auto-disabled, or over its rate budget.
    pub fn admit(&self, name: &str) -> Result<(), ProviderError> {
        if !self.providers.contains_key(name) {
            return Err(ProviderError::Skipped(format!("unknown provider {name}")));
        }
        if !self.is_enabled(name) {
            return Err(ProviderError::Skipped(format!("{name} is disabled")));
        }
        match self.store.get_stats(name) {
            Ok(stats) if stats.auto_disabled => {
                // get_stats already cleared expired disables, so any
                // remaining disable is active.
                let until = stats
                    .disabled_until
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string());
                return Err(ProviderError::Skipped(format!(
                    "{name} auto-disabled until {until}"
                )));
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Provider stats unavailable for {}: {}", name, e);
            }
        }
        self.limiter
            .try_acquire(name)
            .map_err(|wait| ProviderError::RateLimited {
                retry_after_ms: Some(wait.as_millis() as u64),
            })
    }

    /// Record a completed search call.
    pub fn record_search(&self, name: &str, elapsed_ms: u64) {
        if let Err(e) = self.store.record_search(name, elapsed_ms) {
            warn!("Failed to record search stats for {}: {}", name, e);
        }
    }

    /// Record a successful download with the winning score.
    pub fn record_success(&self, name: &str, score: i32) {
        if let Err(e) = self.store.record_success(name, score) {
            warn!("Failed to record success stats for {}: {}", name, e);
        }
    }

    /// Record a failed call; transient failures tick the auto-disable
    /// counter, auth/rate-limit failures only count as failures.
    pub fn record_failure(&self, name: &str, error: &ProviderError) {
        let result = self.store.record_failure(
            name,
            error.counts_toward_disable(),
            self.auto_disable_threshold(),
            self.auto_disable_cooldown(),
        );
        match result {
            Ok(stats) if stats.auto_disabled => {
                warn!(
                    "Provider {} auto-disabled after {} consecutive failures",
                    name, stats.consecutive_failures
                );
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to record failure stats for {}: {}", name, e),
        }
    }

    /// Clear an auto-disable manually (API re-enable).
    pub fn re_enable(&self, name: &str) -> Result<(), StoreError> {
        self.store.clear_auto_disable(name)
    }

    pub fn stats(&self, name: &str) -> Result<ProviderStats, StoreError> {
        self.store.get_stats(name)
    }

    /// Providers that may participate in a search right now, with their
    /// manual priority. Disabled and actively auto-disabled providers are
    /// excluded; rate limiting is checked per call, not here.
    pub fn active_providers(&self) -> Vec<(Arc<dyn SubtitleProvider>, i64)> {
        let now = Utc::now();
        self.providers
            .iter()
            .filter(|(name, _)| self.is_enabled(name))
            .filter(|(name, _)| match self.store.get_stats(name) {
                Ok(stats) => {
                    !stats.auto_disabled || stats.disabled_until.map(|t| t <= now).unwrap_or(true)
                }
                Err(_) => true,
            })
            .map(|(name, provider)| (Arc::clone(provider), self.manual_priority(name)))
            .collect()
    }

    pub fn store(&self) -> &Arc<SqliteProviderStore> {
        &self.store
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteSettingsStore;
    use crate::testing::MockProvider;

    fn registry_with(provider: MockProvider) -> ProviderRegistry {
        let store = Arc::new(SqliteProviderStore::in_memory().unwrap());
        let settings: Arc<dyn SettingsStore> = Arc::new(SqliteSettingsStore::in_memory().unwrap());
        let mut registry = ProviderRegistry::new(store, settings);
        registry.register(Arc::new(provider));
        registry
    }

    #[test]
    fn test_admit_unknown_provider_skipped() {
        let registry = registry_with(MockProvider::new("mock"));
        let err = registry.admit("nope").unwrap_err();
        assert!(matches!(err, ProviderError::Skipped(_)));
    }

    #[test]
    fn test_admit_disabled_provider_skipped() {
        let registry = registry_with(MockProvider::new("mock"));
        registry
            .settings
            .set("provider.mock.enabled", "false")
            .unwrap();
        let err = registry.admit("mock").unwrap_err();
        assert!(matches!(err, ProviderError::Skipped(_)));
    }

    #[test]
    fn test_admit_rate_limited_without_contact() {
        let registry = registry_with(MockProvider::new("mock").with_rate_budget(2, 60));
        assert!(registry.admit("mock").is_ok());
        assert!(registry.admit("mock").is_ok());
        let err = registry.admit("mock").unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { .. }));
    }

    #[test]
    fn test_auto_disable_refuses_admission() {
        let registry = registry_with(MockProvider::new("mock"));
        registry
            .settings
            .set("providers.auto_disable_threshold", "2")
            .unwrap();
        let transient = ProviderError::Transient("boom".into());
        registry.record_failure("mock", &transient);
        registry.record_failure("mock", &transient);

        let err = registry.admit("mock").unwrap_err();
        assert!(matches!(err, ProviderError::Skipped(_)));

        registry.re_enable("mock").unwrap();
        assert!(registry.admit("mock").is_ok());
    }

    #[test]
    fn test_auth_failures_do_not_auto_disable() {
        let registry = registry_with(MockProvider::new("mock"));
        registry
            .settings
            .set("providers.auto_disable_threshold", "1")
            .unwrap();
        registry.record_failure("mock", &ProviderError::Auth("bad key".into()));
        assert!(registry.admit("mock").is_ok());
    }

    #[test]
    fn test_active_providers_excludes_disabled() {
        let store = Arc::new(SqliteProviderStore::in_memory().unwrap());
        let settings: Arc<dyn SettingsStore> = Arc::new(SqliteSettingsStore::in_memory().unwrap());
        let mut registry = ProviderRegistry::new(store, settings);
        registry.register(Arc::new(MockProvider::new("a")));
        registry.register(Arc::new(MockProvider::new("b")));
        registry.settings.set("provider.b.enabled", "false").unwrap();

        let active = registry.active_providers();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].0.name(), "a");
    }
}
