//! Task orchestration: glue between user session state and the task engine.

use std::sync::Arc;

use gramoteka_core::rng::OsSeeded;
use gramoteka_core::selection::{AnswerLog, ExerciseSelector};
use gramoteka_core::types::{GradeResult, Session, TaskPayload};
use gramoteka_core::{ProcessorRegistry, TaskContext};

use crate::db::Database;
use crate::error::{ApiError, Result};
use crate::models::{DbCategory, DbUser};

pub struct TaskService {
    db: Arc<Database>,
    registry: ProcessorRegistry,
}

impl TaskService {
    pub fn new(db: Arc<Database>) -> Self {
        let selector: Arc<dyn ExerciseSelector> = db.clone();
        let log: Arc<dyn AnswerLog> = db.clone();
        let registry = ProcessorRegistry::new(TaskContext::new(
            selector,
            log,
            Arc::new(OsSeeded),
        ));
        Self { db, registry }
    }

    async fn user_and_category(&self, user_id: i64) -> Result<(DbUser, DbCategory, String)> {
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("user {user_id}")))?;
        let category_id = user
            .current_category_id
            .ok_or_else(|| ApiError::BadRequest("no category selected".to_string()))?;
        let category = self
            .db
            .get_category(category_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("category {category_id}")))?;
        let tag = category
            .handler_type
            .clone()
            .ok_or_else(|| ApiError::BadRequest("category is not selectable".to_string()))?;
        Ok((user, category, tag))
    }

    /// Create a task for the user's current category and persist the session
    /// triple: displayed exercises, start timestamp, opaque config.
    pub async fn start_task(&self, user_id: i64) -> Result<TaskPayload> {
        let (user, category, tag) = self.user_and_category(user_id).await?;
        let processor = self.registry.resolve(&tag)?;

        let session = Session {
            user_id: user.id,
            category: category.to_core(),
            exercises: Vec::new(),
            started_at: None,
            task_config: None,
        };
        let payload = processor.create_task(&session).await?;

        self.db
            .set_current_task(user.id, &payload.exercise_ids, payload.task_config.clone())
            .await?;

        tracing::debug!(
            user_id,
            archetype = %tag,
            exercises = payload.exercise_ids.len(),
            "task created"
        );
        Ok(payload)
    }

    /// Grade a submission against the persisted session state.
    pub async fn check_answer(&self, user_id: i64, submission: &str) -> Result<GradeResult> {
        let (user, category, tag) = self.user_and_category(user_id).await?;
        let processor = self.registry.resolve(&tag)?;

        let exercises = self
            .db
            .get_current_exercises(user.id)
            .await?
            .iter()
            .map(|e| e.to_core())
            .collect();

        let session = Session {
            user_id: user.id,
            category: category.to_core(),
            exercises,
            started_at: user.exercise_started_at,
            task_config: user.current_task_config.clone(),
        };
        let result = processor.process_answer(&session, submission).await?;

        tracing::debug!(user_id, archetype = %tag, is_correct = result.is_correct, "answer graded");
        Ok(result)
    }
}
