//! Placeholder processors for categories without real content yet.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{GradeResult, Session, TaskPayload};

use super::TaskProcessor;

/// Category announced in the tree but not released yet.
pub struct ComingSoon;

#[async_trait]
impl TaskProcessor for ComingSoon {
    async fn create_task(&self, _session: &Session) -> Result<TaskPayload> {
        Ok(TaskPayload {
            prompt: "Этот раздел скоро появится".to_string(),
            options: None,
            exercise_ids: Vec::new(),
            task_config: None,
        })
    }

    async fn process_answer(&self, _session: &Session, _submission: &str) -> Result<GradeResult> {
        Ok(GradeResult {
            is_correct: true,
            explanation: Some("В разработке".to_string()),
        })
    }
}

/// Category intentionally left without exercises.
pub struct Skipped;

#[async_trait]
impl TaskProcessor for Skipped {
    async fn create_task(&self, _session: &Session) -> Result<TaskPayload> {
        Ok(TaskPayload {
            prompt: "Этот раздел пропускаем".to_string(),
            options: None,
            exercise_ids: Vec::new(),
            task_config: None,
        })
    }

    async fn process_answer(&self, _session: &Session, _submission: &str) -> Result<GradeResult> {
        Ok(GradeResult {
            is_correct: true,
            explanation: Some("Пропущено".to_string()),
        })
    }
}
