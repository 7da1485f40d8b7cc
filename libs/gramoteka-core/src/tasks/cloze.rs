//! Connector-word cloze: an instruction plus a text fragment with a gap,
//! answered in free text. The canonical answer may list several accepted
//! alternatives joined by `;`.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Result, TaskError};
use crate::matching::{alternatives, matches_any, MatchOptions};
use crate::types::{GradeResult, Session, TaskPayload};

use super::{current_exercise, decode_content, escape_html, TaskContext, TaskProcessor};

#[derive(Debug, Deserialize)]
struct ClozeContent {
    text: String,
    instruction: String,
}

pub struct ClozeDrill {
    ctx: TaskContext,
}

impl ClozeDrill {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskProcessor for ClozeDrill {
    async fn create_task(&self, session: &Session) -> Result<TaskPayload> {
        let category_id = session.category.id;
        let picked = self.ctx.exercises.random(category_id, 1).await?;
        let exercise = picked
            .first()
            .ok_or(TaskError::NoContent { category_id })?;

        let content: ClozeContent = decode_content(exercise)?;
        let prompt = format!(
            "{}\n\n<i>{}</i>",
            content.instruction,
            escape_html(&content.text)
        );
        Ok(TaskPayload::single(prompt, None, exercise.id))
    }

    async fn process_answer(&self, session: &Session, submission: &str) -> Result<GradeResult> {
        let exercise = current_exercise(session)?;
        let accepted = alternatives(&exercise.answer);
        let is_correct = matches_any(submission, &exercise.answer, MatchOptions::default());

        self.ctx
            .log_answer(session, exercise.id, is_correct, submission, None)
            .await?;

        let content: ClozeContent = decode_content(exercise)?;
        let mut explanation = format!("{}\n\n{}", content.instruction, exercise.explanation);

        let exact_single = accepted.len() == 1
            && accepted[0].to_lowercase() == submission.trim().to_lowercase();
        if exact_single {
            explanation = format!("<b>Ответ: {}</b>\n\n{explanation}", accepted[0]);
        } else {
            let header = if accepted.len() == 1 {
                format!("<b>Правильный ответ: {}</b>", accepted[0])
            } else {
                format!("<b>Правильные ответы: {}</b>", accepted.join(" / "))
            };
            explanation = format!(
                "Ваш ответ: {}\n{header}\n\n{explanation}",
                escape_html(submission)
            );
        }

        Ok(GradeResult {
            is_correct,
            explanation: Some(explanation),
        })
    }
}
