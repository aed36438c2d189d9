//! Murmur Server Library
//!
//! Content lifecycle and quota engine for an anonymous journaling platform.
//! This module exports the core types and functions for testing and reuse.

pub mod account_deletion;
pub mod anonymize;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod safety;
pub mod security;

pub use config::Config;
pub use db::{Db, open_database};
pub use error::{AppError, Result};

use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;

use anonymize::{PlainTextTransform, TextTransform};
use identity::SignedTokenIdentity;
use rate_limit::{CounterStore, PostLimiter, RateLimiters};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Config,
    pub limiters: Arc<RateLimiters>,
    pub post_limiter: Arc<PostLimiter>,
    pub identity: Arc<SignedTokenIdentity>,
    pub transform: Arc<dyn TextTransform>,
}

impl AppState {
    /// Build the state, probing `durable` once for every rate limiter
    ///
    /// With no durable store the limiters count in memory.
    pub async fn new(db: Db, config: Config, durable: Option<Arc<dyn CounterStore>>) -> Self {
        let limiters = RateLimiters::new(&config, durable).await;
        let identity = SignedTokenIdentity::new(db.clone(), config.app_secret_key.clone());

        Self {
            post_limiter: Arc::new(PostLimiter::new(config.post_limits)),
            limiters: Arc::new(limiters),
            identity: Arc::new(identity),
            transform: Arc::new(PlainTextTransform),
            db,
            config,
        }
    }
}

/// All routes, without transport layers (CORS, tracing)
pub fn build_router(state: AppState) -> Router {
    use routes::*;

    Router::new()
        .route("/health", get(health_check))
        .route("/api/register", post(register_user))
        .route("/api/entries", post(create_entry).get(list_entries))
        .route("/api/entries/:id", delete(delete_entry))
        .route("/api/entries/:id/publish", post(publish_entry))
        .route("/api/entries/:id/permanent", delete(delete_entry_permanently))
        .route("/api/feed", get(public_feed))
        .route("/api/moods", post(record_mood))
        .route("/api/tags", post(create_tag))
        .route("/api/quota", get(quota_status))
        .route(
            "/api/account/deletion",
            post(request_account_deletion).delete(cancel_account_deletion),
        )
        .route("/internal/account-deletions/sweep", post(run_deletion_sweep))
        .with_state(state)
}
