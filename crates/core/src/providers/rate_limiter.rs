//! Sliding-window rate limiter, one window per provider.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::types::RateBudget;

/// Rate-limit status for one provider.
#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    pub max_requests: u32,
    pub window: Duration,
    pub used: u32,
    pub next_available_in_ms: Option<u64>,
}

/// Sliding window over call timestamps.
///
/// A call is admitted while fewer than `max_requests` calls happened within
/// the trailing window. Timestamps age out as the window slides, so a burst
/// that exhausts the budget frees up exactly one window after it started.
#[derive(Debug)]
pub struct SlidingWindow {
    budget: RateBudget,
    calls: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new(budget: RateBudget) -> Self {
        Self {
            budget,
            calls: VecDeque::with_capacity(budget.max_requests as usize),
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&front) = self.calls.front() {
            if now.duration_since(front) >= self.budget.window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Try to admit a call now. On refusal returns the wait until the oldest
    /// in-window call expires.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        let now = Instant::now();
        self.evict(now);
        if (self.calls.len() as u32) < self.budget.max_requests {
            self.calls.push_back(now);
            Ok(())
        } else {
            let oldest = *self.calls.front().expect("non-empty when at capacity");
            let wait = self.budget.window - now.duration_since(oldest);
            Err(wait)
        }
    }

    pub fn status(&mut self) -> RateLimitStatus {
        let now = Instant::now();
        self.evict(now);
        let used = self.calls.len() as u32;
        let next_available_in_ms = if used < self.budget.max_requests {
            None
        } else {
            self.calls
                .front()
                .map(|oldest| {
                    (self.budget.window - now.duration_since(*oldest)).as_millis() as u64
                })
        };
        RateLimitStatus {
            max_requests: self.budget.max_requests,
            window: self.budget.window,
            used,
            next_available_in_ms,
        }
    }
}

/// Pool of sliding windows keyed by provider name.
pub struct RateLimiterPool {
    windows: Mutex<HashMap<String, SlidingWindow>>,
}

impl RateLimiterPool {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, provider: &str, budget: RateBudget) {
        let mut windows = self.windows.lock().unwrap();
        windows.insert(provider.to_string(), SlidingWindow::new(budget));
    }

    pub fn remove(&self, provider: &str) -> bool {
        let mut windows = self.windows.lock().unwrap();
        windows.remove(provider).is_some()
    }

    /// Try to admit a call for `provider`.
    ///
    /// Unknown providers are admitted (no budget registered yet).
    pub fn try_acquire(&self, provider: &str) -> Result<(), Duration> {
        let mut windows = self.windows.lock().unwrap();
        match windows.get_mut(provider) {
            Some(window) => window.try_acquire(),
            None => Ok(()),
        }
    }

    pub fn status(&self, provider: &str) -> Option<RateLimitStatus> {
        let mut windows = self.windows.lock().unwrap();
        windows.get_mut(provider).map(|w| w.status())
    }
}

impl Default for RateLimiterPool {
    fn default() -> Self {
        Self::new()
    }
}
