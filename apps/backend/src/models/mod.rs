//! Database models and API types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

// Re-export shared types from gramoteka-core
pub use gramoteka_core::types::{
    AnswerRecord, Category, Exercise, GradeResult, Session, TaskOption, TaskPayload,
};

// === Database Entity Types ===

/// Category tree node stored in PostgreSQL
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DbCategory {
    pub id: i64,
    pub name: String,
    pub handler_type: Option<String>,
    pub parent_id: Option<i64>,
}

impl DbCategory {
    /// Convert to the core category type
    pub fn to_core(&self) -> Category {
        Category {
            id: self.id,
            name: self.name.clone(),
            archetype: self.handler_type.clone(),
            parent_id: self.parent_id,
        }
    }
}

/// Exercise stored in PostgreSQL
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DbExercise {
    pub id: i64,
    pub category_id: i64,
    pub group_id: Option<Uuid>,
    pub content: Value,
    pub answer: String,
    pub explanation: String,
    pub is_active: bool,
}

impl DbExercise {
    /// Convert to the core exercise type
    pub fn to_core(&self) -> Exercise {
        Exercise {
            id: self.id,
            category_id: self.category_id,
            group_id: self.group_id,
            content: self.content.clone(),
            answer: self.answer.clone(),
            explanation: self.explanation.clone(),
            is_active: self.is_active,
        }
    }
}

/// User record with the session fields the task engine needs
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DbUser {
    pub id: i64,
    pub external_id: i64,
    pub username: Option<String>,
    pub full_name: String,
    pub exercise_started_at: Option<DateTime<Utc>>,
    pub current_task_config: Option<Value>,
    pub current_category_id: Option<i64>,
}

// === API Request/Response Types ===

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncUserRequest {
    pub external_id: i64,
    pub username: Option<String>,
    pub full_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub external_id: i64,
    pub username: Option<String>,
    pub full_name: String,
    pub current_category_id: Option<i64>,
}

impl From<DbUser> for UserResponse {
    fn from(user: DbUser) -> Self {
        Self {
            id: user.id,
            external_id: user.external_id,
            username: user.username,
            full_name: user.full_name,
            current_category_id: user.current_category_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryResponse {
    pub id: i64,
    pub name: String,
    pub selectable: bool,
    pub parent_id: Option<i64>,
}

impl From<DbCategory> for CategoryResponse {
    fn from(category: DbCategory) -> Self {
        Self {
            id: category.id,
            name: category.name,
            selectable: category.handler_type.is_some(),
            parent_id: category.parent_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryListResponse {
    pub categories: Vec<CategoryResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectCategoryRequest {
    pub category_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartTaskResponse {
    pub prompt: String,
    pub options: Option<Vec<TaskOption>>,
}

impl From<TaskPayload> for StartTaskResponse {
    fn from(payload: TaskPayload) -> Self {
        Self {
            prompt: payload.prompt,
            options: payload.options,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitAnswerRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitAnswerResponse {
    pub is_correct: bool,
    pub explanation: Option<String>,
}

impl From<GradeResult> for SubmitAnswerResponse {
    fn from(result: GradeResult) -> Self {
        Self {
            is_correct: result.is_correct,
            explanation: result.explanation,
        }
    }
}
