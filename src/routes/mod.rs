pub mod account;
pub mod entries;
pub mod health;
pub mod internal;
pub mod journal;
pub mod register;

pub use account::{cancel_account_deletion, quota_status, request_account_deletion};
pub use entries::{
    create_entry, delete_entry, delete_entry_permanently, list_entries, public_feed,
    publish_entry,
};
pub use health::health_check;
pub use internal::run_deletion_sweep;
pub use journal::{create_tag, record_mood};
pub use register::register_user;

use axum::http::{HeaderMap, header};
use chrono::{DateTime, Utc};

use crate::AppState;
use crate::error::{AppError, Result};
use crate::identity::IdentityVerifier;

/// Resolve the bearer credential to a user id
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String> {
    let credential = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AppError::AuthenticationRequired)?;

    state.identity.verify(credential).await
}

/// Convert Unix timestamp to RFC3339 string, defaulting to now if invalid
pub fn timestamp_to_rfc3339(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .unwrap_or_else(Utc::now)
        .to_rfc3339()
}

pub fn now() -> i64 {
    Utc::now().timestamp()
}
