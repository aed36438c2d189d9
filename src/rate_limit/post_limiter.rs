//! Multi-tier sliding window limiter for entry creation cadence

use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;

use crate::constants::{POST_LOG_HORIZON_SECS, POST_LOG_PRUNE_PROBABILITY};

/// Per-user creation limits, checked finest window first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostLimitConfig {
    pub max_per_minute: usize,
    /// Maximum creations in any 5 minute span
    pub burst_allowance: usize,
    pub max_per_hour: usize,
    pub max_per_day: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostTier {
    Minute,
    Burst,
    Hour,
    Day,
}

impl PostTier {
    pub fn window_secs(&self) -> i64 {
        match self {
            PostTier::Minute => 60,
            PostTier::Burst => 5 * 60,
            PostTier::Hour => 3600,
            PostTier::Day => 86_400,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            PostTier::Minute => "in the last minute",
            PostTier::Burst => "in the last 5 minutes",
            PostTier::Hour => "in the last hour",
            PostTier::Day => "in the last 24 hours",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostCheck {
    Accepted,
    Rejected {
        tier: PostTier,
        reason: String,
        /// Earliest instant at which the violated window has room again
        retry_at: i64,
    },
}

/// Sliding multi-window limiter over a per-user log of creation instants
///
/// Check and append happen under one lock per call, but a caller that checks
/// and then fails later in the pipeline still counts. Two processes keep
/// separate logs; this is a soft limit.
pub struct PostLimiter {
    config: PostLimitConfig,
    log: Mutex<HashMap<String, Vec<i64>>>,
}

impl PostLimiter {
    pub fn new(config: PostLimitConfig) -> Self {
        Self {
            config,
            log: Mutex::new(HashMap::new()),
        }
    }

    fn tiers(&self) -> [(PostTier, usize); 4] {
        [
            (PostTier::Minute, self.config.max_per_minute),
            (PostTier::Burst, self.config.burst_allowance),
            (PostTier::Hour, self.config.max_per_hour),
            (PostTier::Day, self.config.max_per_day),
        ]
    }

    /// Evaluate every tier for `user_id` at `now`, recording the creation if accepted
    pub fn check(&self, user_id: &str, now: i64) -> PostCheck {
        if rand::thread_rng().gen_bool(POST_LOG_PRUNE_PROBABILITY) {
            self.prune_all(now);
        }

        let mut log = self.log.lock();
        let timestamps = log.entry(user_id.to_string()).or_default();
        timestamps.retain(|&t| t > now - POST_LOG_HORIZON_SECS);

        for (tier, limit) in self.tiers() {
            let window_start = now - tier.window_secs();
            let in_window = timestamps.iter().filter(|&&t| t > window_start);
            let count = in_window.clone().count();

            if count >= limit {
                let oldest = in_window.min().copied().unwrap_or(now);
                let retry_at = oldest + tier.window_secs();
                let reason = format!(
                    "You've created {} entries {} (limit {}). Try again in {} seconds.",
                    count,
                    tier.describe(),
                    limit,
                    (retry_at - now).max(0)
                );
                tracing::debug!("Post limit hit for {}: {:?}", user_id, tier);
                return PostCheck::Rejected {
                    tier,
                    reason,
                    retry_at,
                };
            }
        }

        timestamps.push(now);
        PostCheck::Accepted
    }

    /// Remove timestamps older than 24h for every user, returning users dropped
    pub fn prune_all(&self, now: i64) -> usize {
        let mut log = self.log.lock();
        let before = log.len();
        log.retain(|_, timestamps| {
            timestamps.retain(|&t| t > now - POST_LOG_HORIZON_SECS);
            !timestamps.is_empty()
        });
        before - log.len()
    }

    pub fn tracked_users(&self) -> usize {
        self.log.lock().len()
    }
}
