//! Per-IP fixed-window rate limiting.
//!
//! State is a concurrent map from client IP to its current window; entries
//! are never evicted, so memory is bounded by active-IP cardinality.

use dashmap::DashMap;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: i64,
}

pub struct RateLimiter {
    max: u32,
    window_ms: i64,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(max: u32, window_ms: i64) -> Self {
        Self {
            max,
            window_ms,
            windows: DashMap::new(),
        }
    }

    /// Count a request from `ip` at time `now_ms`. Returns Ok when the
    /// request is admitted, or Err with the Retry-After value in whole
    /// seconds when the window cap is hit. The dashmap entry guard holds
    /// the per-IP lock across the read-modify-write.
    pub fn check(&self, ip: &str, now_ms: i64) -> Result<(), u64> {
        let mut entry = self.windows.entry(ip.to_string()).or_insert(Window {
            count: 0,
            reset_at: now_ms + self.window_ms,
        });

        if now_ms > entry.reset_at {
            entry.count = 1;
            entry.reset_at = now_ms + self.window_ms;
            return Ok(());
        }

        if entry.count >= self.max {
            let remaining_ms = (entry.reset_at - now_ms).max(0);
            return Err(((remaining_ms + 999) / 1000) as u64);
        }

        entry.count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_the_cap_then_blocks() {
        let limiter = RateLimiter::new(2, 1000);
        assert!(limiter.check("1.2.3.4", 0).is_ok());
        assert!(limiter.check("1.2.3.4", 10).is_ok());
        assert_eq!(limiter.check("1.2.3.4", 20), Err(1));
    }

    #[test]
    fn retry_after_rounds_up_to_whole_seconds() {
        let limiter = RateLimiter::new(1, 60_000);
        assert!(limiter.check("a", 0).is_ok());
        // 59_500ms remaining in the window rounds up to 60s
        assert_eq!(limiter.check("a", 500), Err(60));
        // 1ms remaining still reports at least a second
        assert_eq!(limiter.check("a", 59_999), Err(1));
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = RateLimiter::new(1, 1000);
        assert!(limiter.check("a", 0).is_ok());
        assert!(limiter.check("a", 100).is_err());
        assert!(limiter.check("a", 1001).is_ok());
    }

    #[test]
    fn ips_are_tracked_independently() {
        let limiter = RateLimiter::new(1, 1000);
        assert!(limiter.check("a", 0).is_ok());
        assert!(limiter.check("b", 0).is_ok());
        assert!(limiter.check("a", 1).is_err());
        assert!(limiter.check("b", 1).is_err());
    }
}
