//! Per-key circuit breaker for external call sites.
//!
//! Used by the translation manager (one breaker per backend) and by the
//! provider registry's auto-disable logic. State is in-memory only and is
//! rebuilt on restart and on configuration reload.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// A single circuit breaker.
///
/// Closed admits every request. Open refuses until the cooldown elapses, at
/// which point exactly one probing request is admitted (half-open). Success
/// in any state closes the breaker and zeroes the failure counter; failure
/// in half-open reopens with a fresh cooldown.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }

    /// Whether a request should be admitted right now.
    ///
    /// Transitions Open -> HalfOpen when the cooldown has elapsed; the call
    /// that observes the transition is the probing call.
    pub fn allow_request(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|t| t.elapsed() >= self.cooldown)
                    .unwrap_or(true);
                if elapsed {
                    self.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call. Closes the breaker from any state.
    pub fn record_success(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    /// Record a failed call.
    pub fn record_failure(&mut self) {
        match self.state {
            CircuitState::HalfOpen => {
                // Probe failed, reopen with a fresh cooldown.
                self.state = CircuitState::Open;
                self.opened_at = Some(Instant::now());
            }
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(Instant::now());
                }
            }
            CircuitState::Open => {
                self.consecutive_failures += 1;
            }
        }
    }

    /// Open immediately with a fresh cooldown (fatal errors such as quota
    /// exhaustion).
    pub fn trip(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.consecutive_failures = self.consecutive_failures.max(self.failure_threshold);
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Registry of breakers keyed by name (backend or provider).
pub struct CircuitBreakerRegistry {
    failure_threshold: u32,
    cooldown: Duration,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Admission check for `key`, creating the breaker on first use.
    pub fn allow_request(&self, key: &str) -> bool {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry(key.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.failure_threshold, self.cooldown))
            .allow_request()
    }

    pub fn record_success(&self, key: &str) {
        let mut breakers = self.breakers.lock().unwrap();
        if let Some(b) = breakers.get_mut(key) {
            b.record_success();
        }
    }

    pub fn record_failure(&self, key: &str) {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry(key.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.failure_threshold, self.cooldown))
            .record_failure();
    }

    /// Open the breaker for `key` immediately.
    pub fn trip(&self, key: &str) {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry(key.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.failure_threshold, self.cooldown))
            .trip();
    }

    pub fn state(&self, key: &str) -> Option<CircuitState> {
        let breakers = self.breakers.lock().unwrap();
        breakers.get(key).map(|b| b.state())
    }

    /// Drop the breaker for `key` (configuration reload).
    pub fn invalidate(&self, key: &str) {
        let mut breakers = self.breakers.lock().unwrap();
        breakers.remove(key);
    }

    /// Drop all breakers.
    pub fn clear(&self) {
        let mut breakers = self.breakers.lock().unwrap();
        breakers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_allows_requests() {
        let mut b = CircuitBreaker::new(3, Duration::from_secs(60));
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.allow_request());
    }

    #[test]
    fn test_opens_on_threshold() {
        let mut b = CircuitBreaker::new(3, Duration::from_secs(60));
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.allow_request());
    }

    #[test]
    fn test_success_closes_and_zeroes() {
        let mut b = CircuitBreaker::new(2, Duration::from_secs(60));
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        b.record_success();
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.consecutive_failures(), 0);
        assert!(b.allow_request());
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let mut b = CircuitBreaker::new(1, Duration::from_millis(0));
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        // Zero cooldown: the next check admits a probe.
        assert!(b.allow_request());
        assert_eq!(b.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let mut b = CircuitBreaker::new(1, Duration::from_millis(0));
        b.record_failure();
        assert!(b.allow_request());
        assert_eq!(b.state(), CircuitState::HalfOpen);
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[test]
    fn test_half_open_success_closes() {
        let mut b = CircuitBreaker::new(1, Duration::from_millis(0));
        b.record_failure();
        assert!(b.allow_request());
        b.record_success();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn test_registry_per_key_isolation() {
        let registry = CircuitBreakerRegistry::new(1, Duration::from_secs(60));
        registry.record_failure("a");
        assert!(!registry.allow_request("a"));
        assert!(registry.allow_request("b"));
    }

    #[test]
    fn test_registry_invalidate_resets() {
        let registry = CircuitBreakerRegistry::new(1, Duration::from_secs(60));
        registry.record_failure("a");
        assert!(!registry.allow_request("a"));
        registry.invalidate("a");
        assert!(registry.allow_request("a"));
    }
}
