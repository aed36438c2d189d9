use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::constants::{DEFAULT_FEED_LIMIT, ERR_EMPTY_ENTRY, MAX_ENTRY_CHARS};
use crate::error::{AppError, Result};
use crate::lifecycle::{self, DeleteOutcome, NewEntry};
use crate::models::{Entry, PublishedEntry};
use crate::rate_limit::{Operation, PostCheck};
use crate::routes::{authenticate, now, timestamp_to_rfc3339};
use crate::safety::analyze_content;

#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    pub content: String,
    pub mood: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EntriesResponse {
    pub entries: Vec<Entry>,
}

/// Public view of a published entry; never carries the owner
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: String,
    pub content: String,
    pub mood: Option<String>,
    pub tags: Vec<String>,
    pub published_at: String,
}

impl From<PublishedEntry> for FeedItem {
    fn from(entry: PublishedEntry) -> Self {
        Self {
            id: entry.id,
            content: entry.content,
            mood: entry.mood,
            tags: entry.tags,
            published_at: timestamp_to_rfc3339(entry.published_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub entries: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub permanent: bool,
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DeleteEntryResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: DeleteOutcome,
}

/// Create a private entry
///
/// Pipeline: rate limit, sanitize, content safety gate, label checks, post
/// limiter, store. A request rejected before the post limiter never consumes
/// a post slot.
pub async fn create_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateEntryRequest>,
) -> Result<(StatusCode, Json<Entry>)> {
    let user_id = authenticate(&state, &headers).await?;
    state
        .limiters
        .enforce(Operation::CreateEntry, &user_id)
        .await?;

    let content = state.transform.sanitize(&payload.content);
    if content.is_empty() {
        return Err(AppError::ContentRejected(ERR_EMPTY_ENTRY.to_string()));
    }
    if content.chars().count() > MAX_ENTRY_CHARS {
        return Err(AppError::ContentRejected(format!(
            "Entry exceeds {} characters",
            MAX_ENTRY_CHARS
        )));
    }

    let report = analyze_content(&payload.content);
    if report.should_reject(state.config.safety_score_ceiling) {
        tracing::warn!(
            "Entry from {} rejected: score {} signals {:?}",
            user_id,
            report.score,
            report.signals
        );
        return Err(AppError::ContentRejected(report.describe()));
    }

    let new_entry = NewEntry {
        content,
        mood: payload.mood,
        tags: payload.tags,
    }
    .validate()?;

    let now = now();
    if let PostCheck::Rejected {
        tier,
        reason,
        retry_at,
    } = state.post_limiter.check(&user_id, now)
    {
        tracing::warn!("Post limit ({:?}) reached for {}", tier, user_id);
        return Err(AppError::RateLimited {
            reason,
            retry_after_secs: retry_at - now,
        });
    }

    let entry = lifecycle::create_entry(&state.db, &user_id, new_entry, now).await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn list_entries(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<EntriesResponse>> {
    let user_id = authenticate(&state, &headers).await?;
    let entries = lifecycle::list_entries(&state.db, &user_id).await?;
    Ok(Json(EntriesResponse { entries }))
}

pub async fn publish_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(entry_id): Path<String>,
) -> Result<Json<FeedItem>> {
    let user_id = authenticate(&state, &headers).await?;
    state
        .limiters
        .enforce(Operation::PublishEntry, &user_id)
        .await?;

    let published = lifecycle::publish_entry(
        &state.db,
        state.transform.clone(),
        &user_id,
        &entry_id,
        now(),
    )
    .await?;

    Ok(Json(published.into()))
}

/// Delete an entry; `?permanent=true` overrides the closed 24 hour window
pub async fn delete_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(entry_id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<DeleteEntryResponse>> {
    remove_entry(&state, &headers, &entry_id, query.permanent).await
}

pub async fn delete_entry_permanently(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(entry_id): Path<String>,
) -> Result<Json<DeleteEntryResponse>> {
    remove_entry(&state, &headers, &entry_id, true).await
}

async fn remove_entry(
    state: &AppState,
    headers: &HeaderMap,
    entry_id: &str,
    permanent: bool,
) -> Result<Json<DeleteEntryResponse>> {
    let user_id = authenticate(state, headers).await?;
    state
        .limiters
        .enforce(Operation::DeleteEntry, &user_id)
        .await?;

    let outcome = lifecycle::delete_entry(
        &state.db,
        state.config.quota,
        &user_id,
        entry_id,
        permanent,
        now(),
    )
    .await?;

    Ok(Json(DeleteEntryResponse {
        success: true,
        outcome,
    }))
}

/// Anonymized public feed, newest first
pub async fn public_feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<FeedResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_FEED_LIMIT);
    let entries = lifecycle::public_feed(&state.db, limit).await?;
    Ok(Json(FeedResponse {
        entries: entries.into_iter().map(FeedItem::from).collect(),
    }))
}
