//! Category navigation endpoints

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::Result;
use crate::models::{CategoryListResponse, CategoryResponse};
use crate::AppState;

/// GET /api/categories
pub async fn roots(State(state): State<AppState>) -> Result<Json<CategoryListResponse>> {
    let categories = state.db.list_categories(None).await?;
    Ok(Json(CategoryListResponse {
        categories: categories.into_iter().map(CategoryResponse::from).collect(),
    }))
}

/// GET /api/categories/:id/children
pub async fn children(
    State(state): State<AppState>,
    Path(category_id): Path<i64>,
) -> Result<Json<CategoryListResponse>> {
    let categories = state.db.list_categories(Some(category_id)).await?;
    Ok(Json(CategoryListResponse {
        categories: categories.into_iter().map(CategoryResponse::from).collect(),
    }))
}
