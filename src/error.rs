use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::models::QuotaKind;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] redb::Error),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::error::EncodeError),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] bincode::error::DecodeError),

    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Not authorized to modify this resource")]
    AuthorizationDenied,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{} quota exhausted: {used}/{limit} used", .kind.label())]
    QuotaExhausted {
        kind: QuotaKind,
        used: u32,
        limit: u32,
    },

    #[error("Rate limited: {reason}")]
    RateLimited { reason: String, retry_after_secs: i64 },

    #[error("Content rejected: {0}")]
    ContentRejected(String),

    #[error(
        "Published {hours_elapsed} hours ago; posts become permanent after 24 hours"
    )]
    TemporalWindowClosed { hours_elapsed: i64 },

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AppError {
    fn internal(&self) -> (StatusCode, String, Map<String, Value>) {
        tracing::error!("{}", self);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
            Map::new(),
        )
    }
}

/// Implement IntoResponse to convert AppError into HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retry_after = None;

        let (status, error_message, details) = match self {
            AppError::Database(_)
            | AppError::Transaction(_)
            | AppError::Table(_)
            | AppError::Storage(_)
            | AppError::Commit(_)
            | AppError::Serialization(_)
            | AppError::Deserialization(_)
            | AppError::TaskJoin(_) => self.internal(),
            AppError::AuthenticationRequired => (
                StatusCode::UNAUTHORIZED,
                "Authentication required".to_string(),
                Map::new(),
            ),
            // Requesting and owning ids are logged where the mismatch is detected
            AppError::AuthorizationDenied => (
                StatusCode::FORBIDDEN,
                "Not authorized".to_string(),
                Map::new(),
            ),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string(), Map::new()),
            AppError::QuotaExhausted { kind, used, limit } => {
                let mut details = Map::new();
                details.insert("quota".into(), json!(kind.label()));
                details.insert("used".into(), json!(used));
                details.insert("limit".into(), json!(limit));
                (StatusCode::TOO_MANY_REQUESTS, self.to_string(), details)
            }
            AppError::RateLimited {
                ref reason,
                retry_after_secs,
            } => {
                retry_after = Some(retry_after_secs.max(0));
                let mut details = Map::new();
                details.insert("retryAfter".into(), json!(retry_after_secs.max(0)));
                (StatusCode::TOO_MANY_REQUESTS, reason.clone(), details)
            }
            AppError::ContentRejected(ref reason) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                reason.clone(),
                Map::new(),
            ),
            AppError::TemporalWindowClosed { hours_elapsed } => {
                let mut details = Map::new();
                details.insert("hoursElapsed".into(), json!(hours_elapsed));
                details.insert("isPermanent".into(), json!(true));
                details.insert("canPermanentDelete".into(), json!(true));
                (StatusCode::CONFLICT, self.to_string(), details)
            }
            AppError::UpstreamUnavailable(ref e) => {
                tracing::error!("Upstream unavailable: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable".to_string(),
                    Map::new(),
                )
            }
            AppError::Conflict(ref msg) => (StatusCode::CONFLICT, msg.clone(), Map::new()),
            AppError::InvalidInput(ref msg) => (StatusCode::BAD_REQUEST, msg.clone(), Map::new()),
        };

        let mut body = details;
        body.insert("error".into(), Value::String(error_message));

        let mut response = (status, Json(Value::Object(body))).into_response();
        if let Some(secs) = retry_after
            && let Ok(value) = HeaderValue::from_str(&secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

/// Result type alias for application results
pub type Result<T> = std::result::Result<T, AppError>;
