//! Text analysis: a fragment plus five statements about it; the user enters
//! the numbers of the true statements. A single exercise carries the whole
//! item, its canonical answer is the digit string of true statements.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Result, TaskError};
use crate::types::{GradeResult, Session, TaskPayload};

use super::{
    current_exercise, decode_content, escape_html, submitted_digits, TaskContext, TaskProcessor,
};

const INSTRUCTION: &str = "Укажите варианты ответов, в которых даны верные характеристики \
фрагмента текста. Запишите номера ответов.";

#[derive(Debug, Deserialize)]
struct AnalysisContent {
    text: String,
    statements: Vec<String>,
}

pub struct AnalysisExam {
    ctx: TaskContext,
}

impl AnalysisExam {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskProcessor for AnalysisExam {
    async fn create_task(&self, session: &Session) -> Result<TaskPayload> {
        let category_id = session.category.id;
        let picked = self.ctx.exercises.random(category_id, 1).await?;
        let exercise = picked
            .first()
            .ok_or(TaskError::NoContent { category_id })?;

        let content: AnalysisContent = decode_content(exercise)?;
        let statements = content
            .statements
            .iter()
            .enumerate()
            .map(|(i, s)| format!("<b>{})</b> <i>{s}</i>", i + 1))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "{INSTRUCTION}\n\n<b>Текст:</b>\n<blockquote expandable>{}</blockquote>\n\n{statements}",
            escape_html(&content.text)
        );
        Ok(TaskPayload::single(prompt, None, exercise.id))
    }

    async fn process_answer(&self, session: &Session, submission: &str) -> Result<GradeResult> {
        let exercise = current_exercise(session)?;
        let is_correct = submitted_digits(submission) == submitted_digits(&exercise.answer);

        self.ctx
            .log_answer(session, exercise.id, is_correct, submission, None)
            .await?;

        let content: AnalysisContent = decode_content(exercise)?;
        let mut explanation = format!(
            "<b>Текст:</b>\n<blockquote expandable>{}</blockquote>\n\n{}",
            escape_html(&content.text),
            escape_html(&exercise.explanation)
        );
        if is_correct {
            explanation = format!("<b>Ответ:</b> {}\n\n{explanation}", exercise.answer);
        } else {
            explanation = format!(
                "<b>Ваш ответ:</b> {}\n<b>Правильный ответ:</b> {}\n\n{explanation}",
                escape_html(submission),
                exercise.answer
            );
        }

        Ok(GradeResult {
            is_correct,
            explanation: Some(explanation),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{exercise, fake_ctx, grading_session, leaf_category, session};
    use serde_json::json;

    fn analysis_exercise(id: i64, category_id: i64, answer: &str) -> crate::types::Exercise {
        exercise(
            id,
            category_id,
            json!({
                "text": "Языковые средства выразительности...",
                "statements": ["одно", "два", "три", "четыре", "пять"]
            }),
            answer,
        )
    }

    #[tokio::test]
    async fn renders_numbered_statements() {
        let (ctx, _) = fake_ctx(vec![analysis_exercise(1, 10, "135")], 1);
        let payload = AnalysisExam::new(ctx)
            .create_task(&session(leaf_category("ANALYSIS_EXAM")))
            .await
            .unwrap();
        assert!(payload.prompt.contains("<b>1)</b>"));
        assert!(payload.prompt.contains("<b>5)</b>"));
    }

    #[tokio::test]
    async fn digit_order_and_noise_do_not_matter() {
        let (ctx, _) = fake_ctx(Vec::new(), 1);
        let processor = AnalysisExam::new(ctx);
        let session = grading_session(
            leaf_category("ANALYSIS_EXAM"),
            vec![analysis_exercise(1, 10, "135")],
            None,
        );

        for good in ["135", "531", "1, 3, 5", "1 и 3 и 5"] {
            let result = processor.process_answer(&session, good).await.unwrap();
            assert!(result.is_correct, "{good}");
        }
        let result = processor.process_answer(&session, "15").await.unwrap();
        assert!(!result.is_correct);
    }
}
