pub mod limiter;
pub mod post_limiter;
pub mod store;

pub use limiter::{Backend, Operation, RateLimitDecision, RateLimitRule, RateLimiter, RateLimiters};
pub use post_limiter::{PostCheck, PostLimitConfig, PostLimiter, PostTier};
pub use store::{CounterStore, RedbCounterStore, RedisCounterStore};
