//! User endpoints

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::{ApiError, Result};
use crate::models::{SelectCategoryRequest, SyncUserRequest, UserResponse};
use crate::AppState;

/// POST /api/users/sync
pub async fn sync(
    State(state): State<AppState>,
    Json(payload): Json<SyncUserRequest>,
) -> Result<Json<UserResponse>> {
    let user = state
        .db
        .sync_user(
            payload.external_id,
            payload.username.as_deref(),
            &payload.full_name,
        )
        .await?;
    Ok(Json(user.into()))
}

/// PUT /api/users/:id/category
pub async fn select_category(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(payload): Json<SelectCategoryRequest>,
) -> Result<Json<UserResponse>> {
    state
        .db
        .get_category(payload.category_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("category {}", payload.category_id)))?;

    state
        .db
        .set_current_category(user_id, payload.category_id)
        .await?;

    let user = state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {user_id}")))?;
    Ok(Json(user.into()))
}
