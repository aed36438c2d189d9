use axum::{
    Json,
    extract::{ConnectInfo, State},
};
use std::net::SocketAddr;
use redb::ReadableTable;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::constants::{ERR_USER_ID_MUST_BE_SHA256, MAX_LABEL_CHARS};
use crate::db::{get_record, put_record, tables};
use crate::error::{AppError, Result};
use crate::models::{DeletionStatus, IdentityRecord, User, UserProfile};
use crate::rate_limit::Operation;
use crate::routes::now;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub user_id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    pub user_id: String,
    /// Bearer credential for every authenticated endpoint
    pub token: String,
}

/// Register a new user
///
/// Creates the authentication identity and the quota record in one
/// transaction. The user ID is a client-derived SHA-256 hash, so the server
/// never learns a username.
///
/// Returns 409 Conflict if the ID is registered, or belonged to an account
/// that has since been purged. Attempts are throttled per client address.
pub async fn register_user(
    State(state): State<AppState>,
    client: Option<ConnectInfo<SocketAddr>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>> {
    if !User::validate_id(&payload.user_id) {
        tracing::warn!("Invalid user ID format: {}", payload.user_id);
        return Err(AppError::InvalidInput(ERR_USER_ID_MUST_BE_SHA256.to_string()));
    }

    let client_key = client
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    state
        .limiters
        .enforce(Operation::Register, &client_key)
        .await?;

    let display_name = match payload.display_name.as_deref().map(str::trim) {
        Some(name) if name.chars().count() > MAX_LABEL_CHARS => {
            return Err(AppError::InvalidInput(format!(
                "Display name must be at most {} characters",
                MAX_LABEL_CHARS
            )));
        }
        Some("") | None => None,
        Some(name) => Some(name.to_string()),
    };

    let db = state.db.clone();
    let user_id = payload.user_id.clone();
    let created_at = now();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let write_txn = db.begin_write()?;
        {
            let mut identities = write_txn.open_table(tables::IDENTITIES)?;
            if identities.get(user_id.as_str())?.is_some() {
                tracing::info!("User already exists: {}", user_id);
                return Err(AppError::Conflict("User already exists".to_string()));
            }

            let mut profiles = write_txn.open_table(tables::PROFILES)?;
            // Quota counters are never reset, so an existing profile is kept
            match get_record::<UserProfile, _>(&profiles, &user_id)? {
                Some(profile) if profile.deletion_status == DeletionStatus::Completed => {
                    tracing::info!("Registration attempt for purged account: {}", user_id);
                    return Err(AppError::Conflict("User ID is no longer available".to_string()));
                }
                Some(_) => tracing::warn!("Restoring identity for existing profile {}", user_id),
                None => {
                    let profile = UserProfile::new(display_name, created_at);
                    put_record(&mut profiles, &user_id, &profile)?;
                }
            }

            put_record(&mut identities, &user_id, &IdentityRecord { created_at })?;
        }
        write_txn.commit()?;

        tracing::info!("New user registered: {}", user_id);
        Ok(())
    })
    .await??;

    Ok(Json(RegisterResponse {
        success: true,
        token: state.identity.issue_token(&payload.user_id),
        user_id: payload.user_id,
    }))
}
