use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;

use crate::AppState;
use crate::error::Result;
use crate::lifecycle;
use crate::models::{MoodRecord, TagRecord};
use crate::rate_limit::Operation;
use crate::routes::{authenticate, now};

#[derive(Debug, Deserialize)]
pub struct MoodRequest {
    pub mood: String,
}

#[derive(Debug, Deserialize)]
pub struct TagRequest {
    pub name: String,
}

pub async fn record_mood(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<MoodRequest>,
) -> Result<(StatusCode, Json<MoodRecord>)> {
    let user_id = authenticate(&state, &headers).await?;
    state
        .limiters
        .enforce(Operation::CreateEntry, &user_id)
        .await?;

    let record = lifecycle::record_mood(&state.db, &user_id, &payload.mood, now()).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn create_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<TagRequest>,
) -> Result<(StatusCode, Json<TagRecord>)> {
    let user_id = authenticate(&state, &headers).await?;
    state
        .limiters
        .enforce(Operation::CreateEntry, &user_id)
        .await?;

    let record = lifecycle::create_tag(&state.db, &user_id, &payload.name, now()).await?;
    Ok((StatusCode::CREATED, Json(record)))
}
