//! Task lifecycle endpoints

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::Result;
use crate::models::{StartTaskResponse, SubmitAnswerRequest, SubmitAnswerResponse};
use crate::AppState;

/// POST /api/users/:id/task
pub async fn start(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<StartTaskResponse>> {
    let payload = state.tasks.start_task(user_id).await?;
    Ok(Json(payload.into()))
}

/// POST /api/users/:id/answer
pub async fn answer(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<SubmitAnswerResponse>> {
    let result = state.tasks.check_answer(user_id, &payload.text).await?;
    Ok(Json(result.into()))
}
