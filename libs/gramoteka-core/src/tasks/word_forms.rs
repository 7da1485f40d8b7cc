//! Word-form norms: a phrase template with a `{word}` gap and, where the
//! content declares one, a plausible wrong form. The drill offers the two
//! renderings as buttons; the exam shows five phrases from distinct variant
//! groups, exactly one rendered with its wrong form, and asks for the
//! corrected word in free text. Only the flawed phrase is logged.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskError};
use crate::matching::{matches, MatchOptions};
use crate::types::{GradeResult, Session, TaskOption, TaskPayload};

use super::{
    current_exercise, decode_config, decode_content, escape_html, expect_exercise_count,
    ordered_by_ids, parent_category_id, TaskContext, TaskProcessor,
};

const EXAM_PHRASES: usize = 5;

const DRILL_INSTRUCTION: &str = "Выберите словосочетание, в котором нет грамматической ошибки.";

const EXAM_INSTRUCTION: &str = "В одном из выделенных ниже слов допущена ошибка в образовании \
формы слова. Исправьте ошибку и запишите слово правильно.";

#[derive(Debug, Deserialize)]
struct WordFormContent {
    phrase: String,
    #[serde(default)]
    incorrect_answer: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WordFormExamConfig {
    exercise_ids: Vec<i64>,
    wrong_phrase_index: usize,
}

fn fill(phrase: &str, word: &str) -> String {
    phrase.replace("{word}", word)
}

pub struct WordFormDrill {
    ctx: TaskContext,
}

impl WordFormDrill {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskProcessor for WordFormDrill {
    async fn create_task(&self, session: &Session) -> Result<TaskPayload> {
        let pool_id = parent_category_id(session)?;
        let picked = self
            .ctx
            .exercises
            .random_with_content_field(pool_id, "incorrect_answer", 1)
            .await?;
        let exercise = picked
            .first()
            .ok_or(TaskError::NoContent { category_id: pool_id })?;

        let content: WordFormContent = decode_content(exercise)?;
        let wrong = content.incorrect_answer.as_deref().ok_or_else(|| {
            TaskError::validation(format!("exercise {} lacks a wrong form", exercise.id))
        })?;

        let mut options = vec![
            TaskOption::new(
                fill(&content.phrase, &exercise.answer.to_uppercase()),
                exercise.answer.clone(),
            ),
            TaskOption::new(fill(&content.phrase, &wrong.to_uppercase()), wrong),
        ];
        options.shuffle(&mut self.ctx.rng.rng());

        Ok(TaskPayload::single(
            DRILL_INSTRUCTION.to_string(),
            Some(options),
            exercise.id,
        ))
    }

    async fn process_answer(&self, session: &Session, submission: &str) -> Result<GradeResult> {
        let exercise = current_exercise(session)?;
        let is_correct = matches(submission, &exercise.answer, MatchOptions::single_word());

        self.ctx
            .log_answer(session, exercise.id, is_correct, submission, None)
            .await?;

        let content: WordFormContent = decode_content(exercise)?;
        let correct_phrase = fill(&content.phrase, &exercise.answer.to_uppercase());
        let explanation = if is_correct {
            format!("<b>Ответ:</b> {correct_phrase}\n\n{}", exercise.explanation)
        } else {
            format!(
                "<b>Ваш ответ:</b> {}\n<b>Правильный ответ:</b> {correct_phrase}\n\n{}",
                fill(&content.phrase, &submission.to_uppercase()),
                exercise.explanation
            )
        };

        Ok(GradeResult {
            is_correct,
            explanation: Some(explanation),
        })
    }
}

pub struct WordFormExam {
    ctx: TaskContext,
}

impl WordFormExam {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskProcessor for WordFormExam {
    async fn create_task(&self, session: &Session) -> Result<TaskPayload> {
        let pool_id = parent_category_id(session)?;
        // The first returned exercise is guaranteed to carry a wrong form;
        // move it to a random display position.
        let mut phrases = self
            .ctx
            .exercises
            .random_distinct_groups(pool_id, EXAM_PHRASES, Some("incorrect_answer"))
            .await?;
        if phrases.len() < EXAM_PHRASES {
            return Err(TaskError::NoContent { category_id: pool_id });
        }

        let wrong_index = self.ctx.rng.rng().gen_range(0..EXAM_PHRASES);
        phrases.swap(0, wrong_index);

        let mut lines = Vec::with_capacity(EXAM_PHRASES);
        for (i, exercise) in phrases.iter().enumerate() {
            let content: WordFormContent = decode_content(exercise)?;
            let word = if i == wrong_index {
                content
                    .incorrect_answer
                    .clone()
                    .unwrap_or_else(|| exercise.answer.clone())
            } else {
                exercise.answer.clone()
            };
            lines.push(format!(
                "{}) {}",
                i + 1,
                fill(&content.phrase, &format!("<b>{}</b>", word.to_uppercase()))
            ));
        }

        let prompt = format!("{EXAM_INSTRUCTION}\n\n{}", lines.join("\n"));
        let exercise_ids: Vec<i64> = phrases.iter().map(|e| e.id).collect();
        let config = WordFormExamConfig {
            exercise_ids: exercise_ids.clone(),
            wrong_phrase_index: wrong_index,
        };

        Ok(TaskPayload {
            prompt,
            options: None,
            exercise_ids,
            task_config: Some(serde_json::to_value(config).map_err(anyhow::Error::from)?),
        })
    }

    async fn process_answer(&self, session: &Session, submission: &str) -> Result<GradeResult> {
        expect_exercise_count(session, EXAM_PHRASES)?;
        let config: WordFormExamConfig = decode_config(session)?;
        let ordered = ordered_by_ids(session, &config.exercise_ids)?;

        let wrong_exercise = *ordered.get(config.wrong_phrase_index).ok_or_else(|| {
            TaskError::validation("wrong phrase index out of range")
        })?;

        let is_correct = matches(
            submission,
            &wrong_exercise.answer,
            MatchOptions::single_word(),
        );
        self.ctx
            .log_answer(session, wrong_exercise.id, is_correct, submission, None)
            .await?;

        let content: WordFormContent = decode_content(wrong_exercise)?;
        let correct_phrase = fill(&content.phrase, &wrong_exercise.answer.to_uppercase());
        let body = format!("{correct_phrase}\n\n{}", wrong_exercise.explanation);
        let explanation = if is_correct {
            format!("<b>Ответ:</b> {}\n\n{body}", wrong_exercise.answer)
        } else {
            format!(
                "<b>Ваш ответ:</b> {}\n<b>Правильный ответ:</b> {}\n\n{body}",
                escape_html(submission),
                wrong_exercise.answer
            )
        };

        Ok(GradeResult {
            is_correct,
            explanation: Some(explanation),
        })
    }
}
