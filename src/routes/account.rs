use axum::{Json, extract::State, http::HeaderMap};
use serde::Serialize;

use crate::AppState;
use crate::account_deletion;
use crate::error::Result;
use crate::lifecycle::{self, QuotaStatus};
use crate::models::DeletionStatus;
use crate::rate_limit::Operation;
use crate::routes::{authenticate, now, timestamp_to_rfc3339};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDeletionResponse {
    pub success: bool,
    pub status: DeletionStatus,
    pub delete_after: Option<i64>,
    /// `delete_after` as RFC 3339, for display
    pub delete_after_iso: Option<String>,
}

/// Remaining deletion quota and account deletion status
pub async fn quota_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<QuotaStatus>> {
    let user_id = authenticate(&state, &headers).await?;
    let status = lifecycle::quota_status(&state.db, state.config.quota, &user_id).await?;
    Ok(Json(status))
}

/// Schedule account deletion after a 24 hour grace period
///
/// Repeating the request while it is pending returns the original deadline.
pub async fn request_account_deletion(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AccountDeletionResponse>> {
    let user_id = authenticate(&state, &headers).await?;
    state
        .limiters
        .enforce(Operation::AccountDeletion, &user_id)
        .await?;

    let deadline = account_deletion::request_deletion(&state.db, &user_id, now()).await?;

    Ok(Json(AccountDeletionResponse {
        success: true,
        status: DeletionStatus::Pending,
        delete_after: Some(deadline),
        delete_after_iso: Some(timestamp_to_rfc3339(deadline)),
    }))
}

pub async fn cancel_account_deletion(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AccountDeletionResponse>> {
    let user_id = authenticate(&state, &headers).await?;
    state
        .limiters
        .enforce(Operation::AccountDeletion, &user_id)
        .await?;

    account_deletion::cancel_deletion(&state.db, &user_id, now()).await?;

    Ok(Json(AccountDeletionResponse {
        success: true,
        status: DeletionStatus::None,
        delete_after: None,
        delete_after_iso: None,
    }))
}
