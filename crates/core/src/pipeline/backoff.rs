//! Adaptive retry backoff for wanted items.

use chrono::{DateTime, Duration, Utc};

/// Default backoff base (hours).
pub const DEFAULT_BASE_HOURS: i64 = 1;

/// Default backoff cap (hours) - one week.
pub const DEFAULT_CAP_HOURS: i64 = 168;

/// Compute the next retry time after a non-fatal miss.
///
/// `retry_after = now + min(base * 2^(search_count - 1), cap)`. The first
/// miss waits one base interval; each further miss doubles until the cap.
pub fn next_retry_after(search_count: u32, base_hours: i64, cap_hours: i64) -> DateTime<Utc> {
    let exponent = search_count.saturating_sub(1).min(31);
    let hours = base_hours
        .saturating_mul(1i64 << exponent)
        .clamp(base_hours, cap_hours);
    Utc::now() + Duration::hours(hours)
}

/// The raw backoff interval in hours (for summaries and tests).
pub fn backoff_hours(search_count: u32, base_hours: i64, cap_hours: i64) -> i64 {
    let exponent = search_count.saturating_sub(1).min(31);
    base_hours
        .saturating_mul(1i64 << exponent)
        .clamp(base_hours, cap_hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_miss_waits_base() {
        assert_eq!(backoff_hours(1, 1, 168), 1);
    }

    #[test]
    fn test_doubles_per_miss() {
        assert_eq!(backoff_hours(2, 1, 168), 2);
        assert_eq!(backoff_hours(3, 1, 168), 4);
        assert_eq!(backoff_hours(4, 1, 168), 8);
    }

    #[test]
    fn test_saturates_at_cap() {
        // Eight further failures after the first saturate at the cap.
        assert_eq!(backoff_hours(8, 1, 168), 128);
        assert_eq!(backoff_hours(9, 1, 168), 168);
        assert_eq!(backoff_hours(30, 1, 168), 168);
    }

    #[test]
    fn test_zero_count_treated_as_first() {
        assert_eq!(backoff_hours(0, 1, 168), 1);
    }

    #[test]
    fn test_next_retry_after_in_future() {
        let at = next_retry_after(1, 1, 168);
        let delta = at - Utc::now();
        assert!(delta > Duration::minutes(59));
        assert!(delta <= Duration::minutes(61));
    }

    #[test]
    fn test_large_count_does_not_overflow() {
        assert_eq!(backoff_hours(u32::MAX, 2, 168), 168);
    }
}
