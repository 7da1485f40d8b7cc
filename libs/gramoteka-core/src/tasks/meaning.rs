//! Lexical-meaning check: does the quoted definition fit the highlighted
//! word in this context? Two-option choice graded by exact equality.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Result, TaskError};
use crate::types::{GradeResult, Session, TaskOption, TaskPayload};

use super::{current_exercise, decode_content, parent_category_id, TaskContext, TaskProcessor};

const PROMPT_HEADER: &str = "В предложении выделено слово. Определите, соответствует ли \
указанное лексическое значение его значению в данном контексте.";

#[derive(Debug, Deserialize)]
struct MeaningContent {
    text: String,
    word_with_definition: String,
}

pub struct MeaningDrill {
    ctx: TaskContext,
}

impl MeaningDrill {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskProcessor for MeaningDrill {
    async fn create_task(&self, session: &Session) -> Result<TaskPayload> {
        let pool_id = parent_category_id(session)?;
        let picked = self.ctx.exercises.random(pool_id, 1).await?;
        let exercise = picked
            .first()
            .ok_or(TaskError::NoContent { category_id: pool_id })?;

        let content: MeaningContent = decode_content(exercise)?;
        let prompt = format!(
            "{PROMPT_HEADER}\n\n{}\n\n{}",
            content.text, content.word_with_definition
        );
        let options = vec![
            TaskOption::new("Подходит", "true"),
            TaskOption::new("Не подходит", "false"),
        ];
        Ok(TaskPayload::single(prompt, Some(options), exercise.id))
    }

    async fn process_answer(&self, session: &Session, submission: &str) -> Result<GradeResult> {
        let base = self.ctx.grade_single_exact(session, submission).await?;
        let exercise = current_exercise(session)?;

        // The stored explanation describes the mismatch; when the definition
        // does fit there is nothing to add.
        let explanation = if exercise.answer == "false" {
            Some(exercise.explanation.clone())
        } else {
            None
        };
        Ok(GradeResult {
            is_correct: base.is_correct,
            explanation,
        })
    }
}
