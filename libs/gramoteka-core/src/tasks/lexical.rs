//! Lexical norm correction: a sentence with a redundant or misused word.
//! The content kind picks the instruction (drop the extra word vs. replace
//! the wrong one); the answer is free text with `;`-joined alternatives.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Result, TaskError};
use crate::matching::{alternatives, matches_any, MatchOptions};
use crate::types::{GradeResult, Session, TaskPayload};

use super::{current_exercise, decode_content, escape_html, TaskContext, TaskProcessor};

const REMOVE_INSTRUCTION: &str = "Отредактируйте предложение: исправьте лексическую ошибку, \
<b>исключив лишнее слово.</b> Выпишите это слово.";

const REPLACE_INSTRUCTION: &str = "Отредактируйте предложение: исправьте лексическую ошибку, \
<b>заменив употреблённое неверно слово.</b> Запишите подобранное слово, соблюдая нормы \
современного русского литературного языка и сохраняя смысл высказывания.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum CorrectionKind {
    Remove,
    Replace,
}

#[derive(Debug, Deserialize)]
struct LexicalContent {
    sentence: String,
    task_type: CorrectionKind,
    sentence_with_markup: String,
    corrected_sentence: String,
}

pub struct LexicalExam {
    ctx: TaskContext,
}

impl LexicalExam {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskProcessor for LexicalExam {
    async fn create_task(&self, session: &Session) -> Result<TaskPayload> {
        let category_id = session.category.id;
        let picked = self.ctx.exercises.random(category_id, 1).await?;
        let exercise = picked
            .first()
            .ok_or(TaskError::NoContent { category_id })?;

        let content: LexicalContent = decode_content(exercise)?;
        let instruction = match content.task_type {
            CorrectionKind::Remove => REMOVE_INSTRUCTION,
            CorrectionKind::Replace => REPLACE_INSTRUCTION,
        };
        let prompt = format!("{instruction}\n\n<i>{}</i>", content.sentence);
        Ok(TaskPayload::single(prompt, None, exercise.id))
    }

    async fn process_answer(&self, session: &Session, submission: &str) -> Result<GradeResult> {
        let exercise = current_exercise(session)?;
        let accepted = alternatives(&exercise.answer);
        let is_correct = matches_any(submission, &exercise.answer, MatchOptions::default());

        self.ctx
            .log_answer(session, exercise.id, is_correct, submission, None)
            .await?;

        let content: LexicalContent = decode_content(exercise)?;
        let mut explanation = format!(
            "{}\n\n<b>Исходное предложение:</b>\n<i>{}</i>\n\n<b>Правильное предложение:</b>\n<i>{}</i>",
            exercise.explanation, content.sentence_with_markup, content.corrected_sentence
        );

        let exact_single = accepted.len() == 1
            && accepted[0].to_lowercase() == submission.trim().to_lowercase();
        if exact_single {
            explanation = format!("<b>Ответ:</b> {}\n\n{explanation}", accepted[0]);
        } else {
            let header = if accepted.len() == 1 {
                format!("<b>Правильный ответ:</b> {}", accepted[0])
            } else {
                format!("<b>Правильные ответы:</b> {}", accepted.join(" / "))
            };
            explanation = format!(
                "<b>Ваш ответ:</b> {}\n{header}\n\n{explanation}",
                escape_html(submission)
            );
        }

        Ok(GradeResult {
            is_correct,
            explanation: Some(explanation),
        })
    }
}
