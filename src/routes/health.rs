use axum::{Json, extract::State};
use redb::ReadableDatabase;
use serde_json::{Value, json};

use crate::AppState;
use crate::rate_limit::{Backend, Operation};

/// Health check endpoint
///
/// Reports database connectivity and where rate limit counters live.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    // Check database connectivity by attempting a read transaction
    let db = state.db.clone();
    let db_status = tokio::task::spawn_blocking(move || match db.begin_read() {
        Ok(_) => "connected",
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            "disconnected"
        }
    })
    .await
    .unwrap_or("error");

    let rate_limit_backend = match state.limiters.get(Operation::Register).map(|l| l.backend()) {
        Some(Backend::Durable) => "durable",
        Some(Backend::InMemory) | None => "in-memory",
    };

    Json(json!({
        "status": if db_status == "connected" { "healthy" } else { "unhealthy" },
        "database": db_status,
        "rateLimitBackend": rate_limit_backend,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
