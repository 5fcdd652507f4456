use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const DEFAULT_MAX_MESSAGES: u32 = 10;
pub const DEFAULT_WINDOW_SECS: u64 = 60;

/// Sends are limited per (user, session), never globally per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub user_id: Uuid,
    pub session_id: Uuid,
}

impl RateLimitKey {
    pub fn new(user_id: Uuid, session_id: Uuid) -> Self {
        Self { user_id, session_id }
    }
}

/// Gate for message sends. A shared-cache implementation can replace the
/// process-local one as long as it keeps the same window semantics.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Returns true and consumes one slot when the key is under its limit.
    async fn check_and_consume(&self, key: &RateLimitKey) -> bool;
    /// Forgets every counter.
    async fn reset(&self);
    /// Number of keys currently holding a window.
    fn tracked_keys(&self) -> usize;
}

/// Fixed-window counter per key. Every allowed call counts, including the
/// one that opens a window, so exactly `max_requests` pass per window.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    // key -> (request_count, window_start)
    clients: DashMap<RateLimitKey, (u32, Instant)>,
    max_requests: u32,
    window_duration: Duration,
}

impl InMemoryRateLimiter {
    pub fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            clients: DashMap::new(),
            max_requests,
            window_duration: Duration::from_secs(window_seconds),
        }
    }

    pub fn check_at(&self, key: &RateLimitKey, now: Instant) -> bool {
        // The entry guard locks the key's shard, so increments on the same
        // key are serialized.
        let mut entry = self.clients.entry(*key).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        if now.saturating_duration_since(*window_start) > self.window_duration {
            *count = 1;
            *window_start = now;
            true
        } else if *count >= self.max_requests {
            false
        } else {
            *count += 1;
            true
        }
    }

    pub fn cleanup_expired(&self, now: Instant) {
        self.clients.retain(|_, (_, window_start)| {
            now.saturating_duration_since(*window_start) <= self.window_duration
        });
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES, DEFAULT_WINDOW_SECS)
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check_and_consume(&self, key: &RateLimitKey) -> bool {
        let now = Instant::now();
        let allowed = self.check_at(key, now);

        // Occasionally clean up expired entries
        if rand::random::<u8>() < 10 {
            self.cleanup_expired(now);
        }

        allowed
    }

    async fn reset(&self) {
        self.clients.clear();
    }

    fn tracked_keys(&self) -> usize {
        self.clients.len()
    }
}
