use std::time::{Duration, Instant};

use dashmap::DashMap;

use retro_core::UserHash;

/// Fixed-window rate limiter keyed by caller identity.
pub struct RateLimiter {
    /// Map from identity to (window_start, request_count)
    requests: DashMap<UserHash, (Instant, u32)>,
    /// Maximum requests per window; `0` disables limiting
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: DashMap::new(),
            max_requests,
            window,
        }
    }

    /// Check if a request from this caller is allowed.
    /// Returns Ok(()) if allowed, Err(remaining_wait_time) if rate limited.
    pub fn check(&self, user: &UserHash) -> Result<(), Duration> {
        if self.max_requests == 0 {
            return Ok(());
        }

        let now = Instant::now();

        let mut entry = self.requests.entry(user.clone()).or_insert((now, 0));
        let (window_start, count) = entry.value_mut();

        if now.duration_since(*window_start) >= self.window {
            *window_start = now;
            *count = 1;
            return Ok(());
        }

        if *count >= self.max_requests {
            let wait_time = self.window - now.duration_since(*window_start);
            return Err(wait_time);
        }

        *count += 1;
        Ok(())
    }

    /// Clean up old entries (call periodically).
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.requests
            .retain(|_, (window_start, _)| now.duration_since(*window_start) < self.window * 2);
    }
}

/// Rate limiter for mutating requests.
pub fn write_limiter(per_second: u32) -> RateLimiter {
    RateLimiter::new(per_second, Duration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_under_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));
        let user = UserHash::new("alice");

        assert!(limiter.check(&user).is_ok());
        assert!(limiter.check(&user).is_ok());
        assert!(limiter.check(&user).is_ok());
    }

    #[test]
    fn test_blocks_over_limit() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));
        let user = UserHash::new("alice");

        assert!(limiter.check(&user).is_ok());
        assert!(limiter.check(&user).is_ok());
        assert!(limiter.check(&user).is_err());
    }

    #[test]
    fn test_different_users_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(1));
        let alice = UserHash::new("alice");
        let bob = UserHash::new("bob");

        assert!(limiter.check(&alice).is_ok());
        assert!(limiter.check(&bob).is_ok());
        assert!(limiter.check(&alice).is_err());
        assert!(limiter.check(&bob).is_err());
    }

    #[test]
    fn test_zero_disables_limit() {
        let limiter = write_limiter(0);
        let user = UserHash::new("alice");
        for _ in 0..100 {
            assert!(limiter.check(&user).is_ok());
        }
    }
}
