//! Per-client rate limiting for mutating requests.
//!
//! Each client gets a fixed window: the first request opens it, later
//! requests count against it, and once the window has elapsed the next
//! request replaces it with a fresh one. Windows are never merged or decayed.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Configuration for rate limiting.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in one window.
    pub max_requests: u32,
    /// Length of a window.
    pub window: Duration,
}

impl RateLimitConfig {
    /// Create a new rate limit configuration.
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

impl From<&crate::config::RateLimitSettings> for RateLimitConfig {
    fn from(settings: &crate::config::RateLimitSettings) -> Self {
        Self {
            max_requests: settings.max_requests,
            window: settings.window(),
        }
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request is allowed.
    Allowed,
    /// Request is denied due to rate limit.
    Denied {
        /// Time until the current window expires.
        retry_after: Duration,
    },
}

impl RateLimitResult {
    /// Check if the request is allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed)
    }
}

/// The live window for one client.
#[derive(Debug, Clone, Copy)]
struct ClientWindow {
    /// Requests counted in this window.
    count: u32,
    /// When the window was opened.
    start: Instant,
}

impl ClientWindow {
    fn open(now: Instant) -> Self {
        Self {
            count: 1,
            start: now,
        }
    }

    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.start) > window
    }
}

/// Fixed-window rate limiter keyed by client identifier.
///
/// # Example
///
/// ```
/// use filedrop::rate_limit::{RateLimitConfig, RateLimiter};
///
/// let limiter = RateLimiter::new(RateLimitConfig::new(2, 60)); // 2 requests per minute
///
/// assert!(limiter.check("10.0.0.1").is_allowed());
/// assert!(limiter.check("10.0.0.1").is_allowed());
/// assert!(!limiter.check("10.0.0.1").is_allowed());
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    /// Rate limit configuration.
    config: RateLimitConfig,
    /// Per-client windows.
    clients: Mutex<HashMap<String, ClientWindow>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// The limiter's configuration.
    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Count a request from `client` and decide whether it may proceed.
    pub fn check(&self, client: &str) -> RateLimitResult {
        self.check_at(client, Instant::now())
    }

    /// [`check`](Self::check) evaluated at an explicit instant.
    pub fn check_at(&self, client: &str, now: Instant) -> RateLimitResult {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        let window = match clients.entry(client.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(ClientWindow::open(now));
                return RateLimitResult::Allowed;
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        if window.is_expired(now, self.config.window) {
            *window = ClientWindow::open(now);
            return RateLimitResult::Allowed;
        }

        if window.count < self.config.max_requests {
            window.count += 1;
            return RateLimitResult::Allowed;
        }

        let elapsed = now.saturating_duration_since(window.start);
        RateLimitResult::Denied {
            retry_after: self.config.window.saturating_sub(elapsed),
        }
    }

    /// Requests left for `client` in its current window.
    pub fn remaining(&self, client: &str) -> u32 {
        self.remaining_at(client, Instant::now())
    }

    /// [`remaining`](Self::remaining) evaluated at an explicit instant.
    pub fn remaining_at(&self, client: &str, now: Instant) -> u32 {
        let clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        match clients.get(client) {
            Some(window) if !window.is_expired(now, self.config.window) => {
                self.config.max_requests.saturating_sub(window.count)
            }
            _ => self.config.max_requests,
        }
    }

    /// Drop every expired window.
    ///
    /// Call this periodically to keep memory bounded. Returns the number of
    /// windows removed.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    /// [`cleanup`](Self::cleanup) evaluated at an explicit instant.
    pub fn cleanup_at(&self, now: Instant) -> usize {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let before = clients.len();
        clients.retain(|_, window| !window.is_expired(now, self.config.window));
        before - clients.len()
    }

    /// Number of clients with a window currently held in memory.
    pub fn tracked_clients(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_rate_limit_config() {
        let config = RateLimitConfig::new(5, 60);
        assert_eq!(config.max_requests, 5);
        assert_eq!(config.window, MINUTE);
    }

    #[test]
    fn test_first_request_opens_window() {
        let limiter = RateLimiter::new(RateLimitConfig::new(3, 60));
        let now = Instant::now();

        assert!(limiter.check_at("a", now).is_allowed());
        assert_eq!(limiter.remaining_at("a", now), 2);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_denies_request_over_limit() {
        let limiter = RateLimiter::new(RateLimitConfig::new(2, 60));
        let start = Instant::now();

        assert!(limiter.check_at("a", start).is_allowed());
        assert!(limiter.check_at("a", start + Duration::from_secs(1)).is_allowed());

        let result = limiter.check_at("a", start + Duration::from_secs(10));
        assert_eq!(
            result,
            RateLimitResult::Denied {
                retry_after: Duration::from_secs(50)
            }
        );
    }

    #[test]
    fn test_denial_leaves_window_unchanged() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, 60));
        let start = Instant::now();

        assert!(limiter.check_at("a", start).is_allowed());
        for i in 1..5 {
            assert!(!limiter
                .check_at("a", start + Duration::from_secs(i))
                .is_allowed());
        }

        // The window still started at `start`, so it expires on schedule.
        assert!(limiter
            .check_at("a", start + MINUTE + Duration::from_millis(1))
            .is_allowed());
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let limiter = RateLimiter::new(RateLimitConfig::new(3, 60));
        let start = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at("a", start).is_allowed());
        }
        assert!(!limiter.check_at("a", start).is_allowed());

        let later = start + MINUTE + Duration::from_secs(1);
        assert!(limiter.check_at("a", later).is_allowed());
        // Fresh window with count = 1
        assert_eq!(limiter.remaining_at("a", later), 2);
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, 60));
        let start = Instant::now();

        assert!(limiter.check_at("a", start).is_allowed());
        // Exactly one window later has not yet *exceeded* the window.
        assert!(!limiter.check_at("a", start + MINUTE).is_allowed());
    }

    #[test]
    fn test_separate_clients() {
        let limiter = RateLimiter::new(RateLimitConfig::new(2, 60));
        let now = Instant::now();

        assert!(limiter.check_at("10.0.0.1", now).is_allowed());
        assert!(limiter.check_at("10.0.0.1", now).is_allowed());
        assert!(!limiter.check_at("10.0.0.1", now).is_allowed());

        assert!(limiter.check_at("10.0.0.2", now).is_allowed());
        assert!(limiter.check_at("10.0.0.2", now).is_allowed());
    }

    #[test]
    fn test_remaining_unknown_client() {
        let limiter = RateLimiter::new(RateLimitConfig::new(5, 60));
        assert_eq!(limiter.remaining("nobody"), 5);
    }

    #[test]
    fn test_cleanup_removes_only_expired_windows() {
        let limiter = RateLimiter::new(RateLimitConfig::new(5, 60));
        let start = Instant::now();

        limiter.check_at("old", start);
        limiter.check_at("fresh", start + Duration::from_secs(30));
        assert_eq!(limiter.tracked_clients(), 2);

        let removed = limiter.cleanup_at(start + Duration::from_secs(61));
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_clients(), 1);
        assert_eq!(limiter.remaining_at("fresh", start + Duration::from_secs(61)), 4);
    }

    #[test]
    fn test_from_settings() {
        let settings = crate::config::RateLimitSettings {
            max_requests: 7,
            window_secs: 30,
            ..Default::default()
        };
        let config = RateLimitConfig::from(&settings);
        assert_eq!(config.max_requests, 7);
        assert_eq!(config.window, Duration::from_secs(30));
    }
}
