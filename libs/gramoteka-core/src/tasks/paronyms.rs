//! Paronym choice. Content carries a sentence template with a `{word}` gap,
//! the paronym series with per-form explanations, and the index of the
//! confusable form used as the exam's planted error. The drill asks to pick
//! the fitting form; the exam shows five sentences with the chosen forms in
//! bold caps, exactly one of them wrong, and asks for the correction in free
//! text.

use std::collections::HashSet;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TaskError};
use crate::matching::{matches, MatchOptions};
use crate::types::{Exercise, GradeResult, Session, TaskOption, TaskPayload};

use super::{
    current_exercise, decode_config, decode_content, escape_html, expect_exercise_count,
    numeric_answer, ordered_by_ids, parent_category_id, TaskContext, TaskProcessor,
};

const EXAM_SENTENCES: usize = 5;
/// Oversampled pool from which non-overlapping sentences are filtered.
const EXAM_POOL_SIZE: usize = 50;

const DRILL_INSTRUCTION: &str = "В предложении пропущено слово. Выберите из предложенных \
паронимов подходящее по смыслу.";

const EXAM_INSTRUCTION: &str = "В одном из приведённых ниже предложений <b>НЕВЕРНО</b> \
употреблено выделенное слово. Исправьте лексическую ошибку, <b>подобрав к выделенному слову \
пароним</b>. Запишите подобранное слово, соблюдая нормы современного русского литературного \
языка.";

#[derive(Debug, Deserialize)]
struct ParonymForm {
    explanation: String,
    inflected_form: String,
}

#[derive(Debug, Deserialize)]
struct ParonymContent {
    sentence: String,
    words: Vec<String>,
    paronyms: Vec<ParonymForm>,
    /// 1-based index of the form planted as the exam error.
    secondary_number: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct ParonymExamConfig {
    exercise_ids: Vec<i64>,
    wrong_sentence_index: usize,
}

impl ParonymContent {
    fn form(&self, index_1based: usize) -> Result<&ParonymForm> {
        self.paronyms.get(index_1based.wrapping_sub(1)).ok_or_else(|| {
            TaskError::validation(format!("paronym index {index_1based} out of range"))
        })
    }

    /// The sentence with the gap filled by lowercase `word`, capitalized when
    /// the gap opens the sentence.
    fn sentence_with(&self, word: &str) -> String {
        let mut word = word.to_lowercase();
        if self.sentence.trim_start().starts_with("{word}") {
            word = capitalize(&word);
        }
        self.sentence.replace("{word}", &format!("<u>{word}</u>"))
    }

    fn explanations(&self) -> String {
        self.paronyms
            .iter()
            .map(|p| p.explanation.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

pub struct ParonymDrill {
    ctx: TaskContext,
}

impl ParonymDrill {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskProcessor for ParonymDrill {
    async fn create_task(&self, session: &Session) -> Result<TaskPayload> {
        let pool_id = parent_category_id(session)?;
        let picked = self.ctx.exercises.random(pool_id, 1).await?;
        let exercise = picked
            .first()
            .ok_or(TaskError::NoContent { category_id: pool_id })?;

        let content: ParonymContent = decode_content(exercise)?;
        let gap = escape_html("< . . . >");
        let sentence = content.sentence.replace("{word}", &gap);

        let options = content
            .paronyms
            .iter()
            .enumerate()
            .map(|(i, p)| TaskOption::new(p.inflected_form.clone(), (i + 1).to_string()))
            .collect();

        let prompt = format!("{DRILL_INSTRUCTION}\n\n{sentence}");
        Ok(TaskPayload::single(prompt, Some(options), exercise.id))
    }

    async fn process_answer(&self, session: &Session, submission: &str) -> Result<GradeResult> {
        let base = self.ctx.grade_single_exact(session, submission).await?;
        let exercise = current_exercise(session)?;
        let content: ParonymContent = decode_content(exercise)?;

        let correct_form = &content.form(numeric_answer(exercise)?)?.inflected_form;
        let explanation = format!(
            "{}\n\n\n{}",
            content.sentence_with(correct_form),
            content.explanations()
        );

        Ok(GradeResult {
            is_correct: base.is_correct,
            explanation: Some(explanation),
        })
    }
}

pub struct ParonymExam {
    ctx: TaskContext,
}

impl ParonymExam {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }

    /// Greedy filter: keep a sentence only if none of its paronym base words
    /// was already used, so the five sentences test five different series.
    fn without_word_overlap(pool: &[Exercise], limit: usize) -> Result<Vec<Exercise>> {
        let mut selected = Vec::new();
        let mut used_words: HashSet<String> = HashSet::new();

        for exercise in pool {
            let content: ParonymContent = decode_content(exercise)?;
            if content.words.iter().any(|w| used_words.contains(w)) {
                continue;
            }
            used_words.extend(content.words.iter().cloned());
            selected.push(exercise.clone());
            if selected.len() == limit {
                break;
            }
        }
        Ok(selected)
    }
}

#[async_trait]
impl TaskProcessor for ParonymExam {
    async fn create_task(&self, session: &Session) -> Result<TaskPayload> {
        let pool_id = parent_category_id(session)?;
        let pool = self.ctx.exercises.random(pool_id, EXAM_POOL_SIZE).await?;
        let selected = Self::without_word_overlap(&pool, EXAM_SENTENCES)?;
        if selected.len() < EXAM_SENTENCES {
            return Err(TaskError::NoContent { category_id: pool_id });
        }

        let wrong_index = self.ctx.rng.rng().gen_range(0..EXAM_SENTENCES);

        let mut lines = Vec::with_capacity(EXAM_SENTENCES);
        for (i, exercise) in selected.iter().enumerate() {
            let content: ParonymContent = decode_content(exercise)?;
            let form = if i == wrong_index {
                &content.form(content.secondary_number)?.inflected_form
            } else {
                &content.form(numeric_answer(exercise)?)?.inflected_form
            };
            let sentence = content
                .sentence
                .replace("{word}", &format!("<b>{}</b>", form.to_uppercase()));
            lines.push(format!("{}) {sentence}", i + 1));
        }

        let prompt = format!("{EXAM_INSTRUCTION}\n\n\n{}", lines.join("\n"));
        let exercise_ids: Vec<i64> = selected.iter().map(|e| e.id).collect();
        let config = ParonymExamConfig {
            exercise_ids: exercise_ids.clone(),
            wrong_sentence_index: wrong_index,
        };

        Ok(TaskPayload {
            prompt,
            options: None,
            exercise_ids,
            task_config: Some(serde_json::to_value(config).map_err(anyhow::Error::from)?),
        })
    }

    async fn process_answer(&self, session: &Session, submission: &str) -> Result<GradeResult> {
        expect_exercise_count(session, EXAM_SENTENCES)?;
        let config: ParonymExamConfig = decode_config(session)?;
        let ordered = ordered_by_ids(session, &config.exercise_ids)?;

        let wrong_exercise = *ordered.get(config.wrong_sentence_index).ok_or_else(|| {
            TaskError::validation("wrong sentence index out of range")
        })?;
        let content: ParonymContent = decode_content(wrong_exercise)?;
        let correct_form = content.form(numeric_answer(wrong_exercise)?)?.inflected_form.clone();
        let wrong_form = content.form(content.secondary_number)?.inflected_form.clone();

        let is_correct = matches(submission, &correct_form, MatchOptions::single_word());
        let batch_id = Uuid::new_v4();

        for (i, exercise) in ordered.iter().enumerate() {
            // Only the flawed sentence was actually solved; the rest were
            // displayed correct and count as such.
            let item_correct = if i == config.wrong_sentence_index {
                is_correct
            } else {
                true
            };
            self.ctx
                .log_answer(session, exercise.id, item_correct, submission, Some(batch_id))
                .await?;
        }

        let mut explanation = format!("{}\n\n", content.sentence_with(&correct_form));
        if is_correct {
            explanation.push_str(&format!("<b>Ответ: {correct_form}</b>\n"));
        } else {
            explanation.push_str(&format!(
                "<b>Ваш ответ: {}</b>\n<b>Правильный ответ: {correct_form}</b>\n",
                escape_html(submission)
            ));
        }
        explanation.push_str(&format!(
            "<b>Неправильное слово в задании: {wrong_form}</b>\n\n{}",
            content.explanations()
        ));

        Ok(GradeResult {
            is_correct,
            explanation: Some(explanation),
        })
    }
}
