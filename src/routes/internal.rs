use axum::{Json, extract::State, http::HeaderMap};

use crate::AppState;
use crate::account_deletion::{self, SweepReport};
use crate::error::{AppError, Result};
use crate::routes::now;
use crate::security::secrets_match;

/// Header carrying the scheduler's pre-shared secret
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Account deletion completion sweep
///
/// Called by an external scheduler. Purges every account whose grace
/// period has elapsed and reports per-account outcomes.
///
/// POST /internal/account-deletions/sweep (header `x-cron-secret`)
pub async fn run_deletion_sweep(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepReport>> {
    let presented = headers
        .get(CRON_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if !secrets_match(presented, &state.config.cron_secret) {
        tracing::warn!("Invalid cron secret attempt");
        return Err(AppError::AuthenticationRequired);
    }

    let report =
        account_deletion::run_completion_sweep(&state.db, state.identity.as_ref(), now()).await?;
    Ok(Json(report))
}
