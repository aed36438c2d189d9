//! Fixed-window rate limiter, durable-backend-first with an in-memory fallback

use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;

use super::store::CounterStore;
use crate::config::Config;
use crate::constants::RATE_LIMIT_SWEEP_PROBABILITY;
use crate::error::{AppError, Result};
use crate::models::RateLimitRecord;

/// `max` requests per `window_secs`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max: u64,
    pub window_secs: u64,
}

/// Where a limiter currently keeps its counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Durable,
    InMemory,
}

/// Outcome of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub success: bool,
    pub remaining: u64,
    pub reset_at: i64,
}

impl RateLimitDecision {
    fn from_record(record: &RateLimitRecord, rule: &RateLimitRule) -> Self {
        Self {
            success: record.count <= rule.max,
            remaining: rule.max.saturating_sub(record.count),
            reset_at: record.reset_at,
        }
    }
}

/// Fixed-window limiter for one logical operation
///
/// The backend is probed once at construction. A failing durable call is
/// answered from memory and flips the limiter to `InMemory` until
/// [`RateLimiter::reevaluate`] finds the store reachable again.
///
/// The in-memory path is approximate: counts are per process and a restart
/// forgets them.
pub struct RateLimiter {
    rule: RateLimitRule,
    durable: Option<Arc<dyn CounterStore>>,
    backend: Mutex<Backend>,
    memory: Mutex<HashMap<String, RateLimitRecord>>,
}

impl RateLimiter {
    /// Build a limiter, probing `durable` once to pick the backend
    pub async fn new(rule: RateLimitRule, durable: Option<Arc<dyn CounterStore>>) -> Self {
        let backend = match &durable {
            Some(store) => probe(store.as_ref()).await,
            None => Backend::InMemory,
        };

        Self {
            rule,
            durable,
            backend: Mutex::new(backend),
            memory: Mutex::new(HashMap::new()),
        }
    }

    pub fn in_memory(rule: RateLimitRule) -> Self {
        Self {
            rule,
            durable: None,
            backend: Mutex::new(Backend::InMemory),
            memory: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> Backend {
        *self.backend.lock()
    }

    /// Probe the durable store again and switch back to it if it answers
    pub async fn reevaluate(&self) -> Backend {
        let Some(store) = &self.durable else {
            return Backend::InMemory;
        };

        let backend = probe(store.as_ref()).await;
        let previous = std::mem::replace(&mut *self.backend.lock(), backend);
        if previous != backend {
            tracing::info!(
                "Rate limiter backend changed from {:?} to {:?} ({})",
                previous,
                backend,
                store.name()
            );
        }
        backend
    }

    pub async fn check(&self, identifier: &str) -> RateLimitDecision {
        self.check_at(identifier, Utc::now().timestamp()).await
    }

    /// Count one request for `identifier` at `now`
    pub async fn check_at(&self, identifier: &str, now: i64) -> RateLimitDecision {
        if self.backend() == Backend::Durable
            && let Some(store) = &self.durable
        {
            match store.increment(identifier, self.rule.window_secs, now).await {
                Ok(record) => return RateLimitDecision::from_record(&record, &self.rule),
                Err(e) => {
                    tracing::warn!(
                        "Rate limit backend {} failed, using in-memory counters: {}",
                        store.name(),
                        e
                    );
                    *self.backend.lock() = Backend::InMemory;
                }
            }
        }

        self.check_memory(identifier, now)
    }

    fn check_memory(&self, identifier: &str, now: i64) -> RateLimitDecision {
        if rand::thread_rng().gen_bool(RATE_LIMIT_SWEEP_PROBABILITY) {
            self.sweep_memory(now);
        }

        let mut memory = self.memory.lock();
        let record = memory
            .entry(identifier.to_string())
            .or_insert_with(|| RateLimitRecord::new(now, self.rule.window_secs));
        record.register_hit(now, self.rule.window_secs);
        RateLimitDecision::from_record(record, &self.rule)
    }

    /// Drop in-memory windows that have ended, returning how many went
    pub fn sweep_memory(&self, now: i64) -> usize {
        let mut memory = self.memory.lock();
        let before = memory.len();
        memory.retain(|_, record| !record.is_expired(now));
        before - memory.len()
    }

    pub async fn prune_durable(&self, now: i64) -> Result<usize> {
        match &self.durable {
            Some(store) => store.prune_expired(now).await,
            None => Ok(0),
        }
    }
}

async fn probe(store: &dyn CounterStore) -> Backend {
    match store.ping().await {
        Ok(()) => Backend::Durable,
        Err(e) => {
            tracing::warn!(
                "Rate limit backend {} unreachable, using in-memory counters: {}",
                store.name(),
                e
            );
            Backend::InMemory
        }
    }
}

/// Logical operations that are rate limited independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Register,
    CreateEntry,
    PublishEntry,
    DeleteEntry,
    AccountDeletion,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Register,
        Operation::CreateEntry,
        Operation::PublishEntry,
        Operation::DeleteEntry,
        Operation::AccountDeletion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Register => "register",
            Operation::CreateEntry => "create_entry",
            Operation::PublishEntry => "publish_entry",
            Operation::DeleteEntry => "delete_entry",
            Operation::AccountDeletion => "account_deletion",
        }
    }
}

/// One limiter per [`Operation`], sharing a durable store
pub struct RateLimiters {
    limiters: HashMap<Operation, RateLimiter>,
}

impl RateLimiters {
    pub async fn new(config: &Config, durable: Option<Arc<dyn CounterStore>>) -> Self {
        let mut limiters = HashMap::new();
        for operation in Operation::ALL {
            let limiter = RateLimiter::new(config.rule_for(operation), durable.clone()).await;
            limiters.insert(operation, limiter);
        }
        Self { limiters }
    }

    pub fn get(&self, operation: Operation) -> Option<&RateLimiter> {
        self.limiters.get(&operation)
    }

    /// Check `identifier` against the operation's limit, failing with `RateLimited`
    pub async fn enforce(&self, operation: Operation, identifier: &str) -> Result<RateLimitDecision> {
        let now = Utc::now().timestamp();
        self.enforce_at(operation, identifier, now).await
    }

    pub async fn enforce_at(
        &self,
        operation: Operation,
        identifier: &str,
        now: i64,
    ) -> Result<RateLimitDecision> {
        let Some(limiter) = self.limiters.get(&operation) else {
            return Err(AppError::UpstreamUnavailable(format!(
                "No rate limiter configured for {}",
                operation.as_str()
            )));
        };

        let key = format!("{}:{}", operation.as_str(), identifier);
        let decision = limiter.check_at(&key, now).await;
        if !decision.success {
            tracing::warn!("Rate limit exceeded for {}", key);
            return Err(AppError::RateLimited {
                reason: format!(
                    "Too many {} requests - limit is {} per {} seconds",
                    operation.as_str().replace('_', " "),
                    limiter.rule.max,
                    limiter.rule.window_secs
                ),
                retry_after_secs: decision.reset_at - now,
            });
        }
        Ok(decision)
    }

    /// Re-probe durable backends and drop expired windows
    pub async fn maintain(&self, now: i64) {
        for (operation, limiter) in &self.limiters {
            limiter.reevaluate().await;
            let swept = limiter.sweep_memory(now);
            if swept > 0 {
                tracing::debug!("Swept {} in-memory windows for {}", swept, operation.as_str());
            }
        }

        // Every limiter shares the same durable store, so one prune covers all
        if let Some(limiter) = self.limiters.get(&Operation::Register)
            && let Err(e) = limiter.prune_durable(now).await
        {
            tracing::warn!("Failed to prune durable rate limit windows: {}", e);
        }
    }
}
