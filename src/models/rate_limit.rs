use serde::{Deserialize, Serialize};

/// Fixed-window counter for one rate-limit identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    /// Requests counted in the current window
    pub count: u64,
    /// Unix timestamp when the current window ends
    pub reset_at: i64,
}

impl RateLimitRecord {
    /// Start a new, empty window
    pub fn new(now: i64, window_secs: u64) -> Self {
        Self {
            count: 0,
            reset_at: now + window_secs as i64,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.reset_at
    }

    /// Count one request, opening a fresh window if the current one has ended
    pub fn register_hit(&mut self, now: i64, window_secs: u64) {
        if self.is_expired(now) {
            *self = Self::new(now, window_secs);
        }
        self.count += 1;
    }
}
