//! The per-key sliding-window rate limiter (spec §4.C).

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct WindowState {
    count: u32,
    window_start_ms: i64,
    window_ms: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at_ms: i64,
}

/// Shared across every request; `check` never holds its lock across an
/// await — the DashMap shard lock is acquired and released synchronously
/// inside the closure.
pub struct RateLimiter {
    windows: DashMap<String, WindowState>,
}

impl RateLimiter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            windows: DashMap::new(),
        })
    }

    pub fn check(&self, key_id: &str, limit: u32, window_ms: i64, now_ms: i64) -> RateLimitResult {
        let mut entry = self.windows.entry(key_id.to_string()).or_insert(WindowState {
            count: 0,
            window_start_ms: now_ms,
            window_ms,
        });

        if now_ms - entry.window_start_ms >= window_ms {
            entry.count = 1;
            entry.window_start_ms = now_ms;
            entry.window_ms = window_ms;
            return RateLimitResult {
                allowed: true,
                remaining: limit.saturating_sub(1),
                reset_at_ms: now_ms + window_ms,
            };
        }

        let reset_at_ms = entry.window_start_ms + window_ms;

        if entry.count >= limit {
            return RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_at_ms,
            };
        }

        entry.count += 1;
        RateLimitResult {
            allowed: true,
            remaining: limit.saturating_sub(entry.count),
            reset_at_ms,
        }
    }

    fn prune(&self, now_ms: i64) {
        let before = self.windows.len();
        self.windows
            .retain(|_, state| now_ms - state.window_start_ms < state.window_ms);
        let pruned = before - self.windows.len();
        if pruned > 0 {
            debug!(pruned, "rate limiter pruned idle windows");
        }
    }

    /// Spawns the background task that evicts windows idle beyond their
    /// own duration, every sixty seconds.
    pub fn spawn_pruner(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                let now_ms = chrono::Utc::now().timestamp_millis();
                limiter.prune(now_ms);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_is_allowed_and_creates_window() {
        let limiter = RateLimiter::new();
        let result = limiter.check("key1", 3, 60_000, 1_000);
        assert!(result.allowed);
        assert_eq!(result.remaining, 2);
    }

    #[test]
    fn denies_once_limit_reached_within_window() {
        let limiter = RateLimiter::new();
        limiter.check("key1", 2, 60_000, 1_000);
        limiter.check("key1", 2, 60_000, 1_500);
        let third = limiter.check("key1", 2, 60_000, 2_000);
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
    }

    #[test]
    fn resets_after_window_elapses() {
        let limiter = RateLimiter::new();
        limiter.check("key1", 1, 1_000, 0);
        let denied = limiter.check("key1", 1, 1_000, 500);
        assert!(!denied.allowed);
        let allowed = limiter.check("key1", 1, 1_000, 1_500);
        assert!(allowed.allowed);
    }

    #[test]
    fn prune_evicts_only_idle_windows() {
        let limiter = RateLimiter::new();
        limiter.check("stale", 5, 1_000, 0);
        limiter.check("fresh", 5, 1_000, 10_000);
        limiter.prune(11_500);
        assert!(limiter.windows.get("stale").is_none());
        assert!(limiter.windows.get("fresh").is_some());
    }
}
