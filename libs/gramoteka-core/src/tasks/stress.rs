//! Stress placement. The canonical answer is the 1-based letter index of the
//! stressed vowel; content carries a plausible wrong index. The drill offers
//! the two renderings as choices; the exam shows five words, each rendered
//! with either its correct or its wrong stress, and asks for the numbers of
//! the correctly stressed ones.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TaskError};
use crate::rng::weighted_pick;
use crate::types::{Exercise, GradeResult, Session, TaskOption, TaskPayload};

use super::{
    decode_config, decode_content, escape_html, expect_exercise_count, numeric_answer,
    ordered_by_ids, parent_category_id, subset_verdict, word_in_context, TaskContext,
    TaskProcessor, CORRECT_COUNT_CHOICES, CORRECT_COUNT_WEIGHTS,
};

const EXAM_WORDS: usize = 5;

const EXAM_INSTRUCTION: &str = "Укажите варианты ответов, в которых верно выделена буква, \
обозначающая ударный гласный звук. Запишите номера ответов.";

#[derive(Debug, Deserialize)]
struct StressContent {
    word: String,
    incorrect_stress: usize,
    #[serde(default)]
    context_before: Option<String>,
    #[serde(default)]
    context_after: Option<String>,
}

/// Persisted exam state: the ids in display order and the stress position
/// each word was rendered with. Correctness cannot be reconstructed from the
/// exercises alone, since a displayed position may or may not be canonical.
#[derive(Debug, Serialize, Deserialize)]
struct StressExamConfig {
    exercise_ids: Vec<i64>,
    stress_positions: Vec<usize>,
}

/// Uppercase the letter at a 1-based position: "банты" + 2 -> "бАнты".
fn apply_stress(word: &str, position: usize) -> Result<String> {
    let chars: Vec<char> = word.chars().collect();
    if position == 0 || position > chars.len() {
        return Err(TaskError::validation(format!(
            "stress position {position} is out of range for \"{word}\""
        )));
    }
    Ok(chars
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i + 1 == position {
                c.to_uppercase().to_string()
            } else {
                c.to_string()
            }
        })
        .collect())
}

pub struct StressDrill {
    ctx: TaskContext,
}

impl StressDrill {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskProcessor for StressDrill {
    async fn create_task(&self, session: &Session) -> Result<TaskPayload> {
        let pool_id = parent_category_id(session)?;
        let picked = self.ctx.exercises.random(pool_id, 1).await?;
        let exercise = picked
            .first()
            .ok_or(TaskError::NoContent { category_id: pool_id })?;

        let content: StressContent = decode_content(exercise)?;
        let answer = numeric_answer(exercise)?;

        let correct_word = apply_stress(&content.word, answer)?;
        let wrong_word = apply_stress(&content.word, content.incorrect_stress)?;
        let mut options = vec![
            TaskOption::new(correct_word, answer.to_string()),
            TaskOption::new(wrong_word, content.incorrect_stress.to_string()),
        ];
        options.shuffle(&mut self.ctx.rng.rng());

        let prompt = format!(
            "Выберите правильное ударение в слове: <b>{}</b>",
            content.word
        );
        Ok(TaskPayload::single(prompt, Some(options), exercise.id))
    }

    async fn process_answer(&self, session: &Session, submission: &str) -> Result<GradeResult> {
        self.ctx.grade_single_exact(session, submission).await
    }
}

pub struct StressExam {
    ctx: TaskContext,
}

impl StressExam {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }

    fn render_line(exercise: &Exercise, position: usize) -> Result<String> {
        let content: StressContent = decode_content(exercise)?;
        let word = apply_stress(&content.word, position)?;
        Ok(word_in_context(
            &word,
            content.context_before.as_deref(),
            content.context_after.as_deref(),
        ))
    }
}

#[async_trait]
impl TaskProcessor for StressExam {
    async fn create_task(&self, session: &Session) -> Result<TaskPayload> {
        let pool_id = parent_category_id(session)?;
        let mut rng = self.ctx.rng.rng();

        let words = self.ctx.exercises.random(pool_id, EXAM_WORDS).await?;
        if words.len() < EXAM_WORDS {
            return Err(TaskError::NoContent { category_id: pool_id });
        }

        let correct_count =
            weighted_pick(&mut rng, &CORRECT_COUNT_CHOICES, &CORRECT_COUNT_WEIGHTS);
        let mut positions: Vec<usize> = (0..EXAM_WORDS).collect();
        positions.shuffle(&mut rng);
        let correct_slots = &positions[..correct_count];

        let mut stress_positions = Vec::with_capacity(EXAM_WORDS);
        let mut lines = Vec::with_capacity(EXAM_WORDS);
        for (i, exercise) in words.iter().enumerate() {
            let content: StressContent = decode_content(exercise)?;
            let displayed = if correct_slots.contains(&i) {
                numeric_answer(exercise)?
            } else {
                content.incorrect_stress
            };
            stress_positions.push(displayed);
            lines.push(format!(
                "{}) {}",
                i + 1,
                Self::render_line(exercise, displayed)?
            ));
        }

        let prompt = format!("{EXAM_INSTRUCTION}\n\n{}", lines.join("\n"));
        let exercise_ids: Vec<i64> = words.iter().map(|e| e.id).collect();
        let config = StressExamConfig {
            exercise_ids: exercise_ids.clone(),
            stress_positions,
        };

        Ok(TaskPayload {
            prompt,
            options: None,
            exercise_ids,
            task_config: Some(serde_json::to_value(config).map_err(anyhow::Error::from)?),
        })
    }

    async fn process_answer(&self, session: &Session, submission: &str) -> Result<GradeResult> {
        expect_exercise_count(session, EXAM_WORDS)?;
        let config: StressExamConfig = decode_config(session)?;
        if config.stress_positions.len() != EXAM_WORDS {
            return Err(TaskError::validation(
                "stress exam config must carry one position per word",
            ));
        }

        let ordered = ordered_by_ids(session, &config.exercise_ids)?;
        let mut correct_indices = Vec::new();
        for (i, exercise) in ordered.iter().enumerate() {
            if config.stress_positions[i] == numeric_answer(exercise)? {
                correct_indices.push(i);
            }
        }

        let (expected, submitted, is_correct) = subset_verdict(&correct_indices, submission);
        let batch_id = Uuid::new_v4();

        let mut details = String::new();
        for (i, exercise) in ordered.iter().enumerate() {
            let item_correct = correct_indices.contains(&i)
                == submitted.contains(&(i + 1).to_string());
            let line = Self::render_line(exercise, numeric_answer(exercise)?)?;
            details.push_str(&format!("<b>{})</b> {line}\n", i + 1));
            if !exercise.explanation.is_empty() {
                details.push_str(&format!("<i>{}</i>\n", exercise.explanation));
            }
            details.push('\n');

            self.ctx
                .log_answer(session, exercise.id, item_correct, submission, Some(batch_id))
                .await?;
        }

        let mut explanation = if is_correct {
            format!("<b>Ответ: {expected}</b>")
        } else {
            format!("Ваш ответ: {}\n<b>Правильный ответ: {expected}</b>", escape_html(&submitted))
        };
        explanation.push_str(&format!(
            "\n\n<b>Объяснения:</b>\n<blockquote expandable>{details}</blockquote>"
        ));

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

    fn stress_exercise(id: i64, category_id: i64, word: &str, answer: usize, wrong: usize) -> Exercise {
        exercise(
            id,
            category_id,
            json!({"word": word, "incorrect_stress": wrong}),
            &answer.to_string(),
        )
    }

    #[test]
    fn apply_stress_uppercases_one_letter() {
        assert_eq!(apply_stress("банты", 2).unwrap(), "бАнты");
        assert_eq!(apply_stress("торты", 1).unwrap(), "Торты");
        assert!(apply_stress("торты", 0).is_err());
        assert!(apply_stress("торты", 6).is_err());
    }

    #[tokio::test]
    async fn drill_offers_both_renderings() {
        let (ctx, _) = fake_ctx(vec![stress_exercise(1, 1, "банты", 2, 1)], 3);
        let payload = StressDrill::new(ctx)
            .create_task(&session(leaf_category("STRESS_DRILL")))
            .await
            .unwrap();
        let options = payload.options.unwrap();
        let labels: Vec<&str> = options.iter().map(|o| o.label.as_str()).collect();
        assert!(labels.contains(&"бАнты"));
        assert!(labels.contains(&"Банты"));
    }

    #[tokio::test]
    async fn drill_rejects_non_numeric_answer() {
        let mut bad = stress_exercise(1, 1, "банты", 2, 1);
        bad.answer = "вторая".to_string();
        let (ctx, _) = fake_ctx(vec![bad], 3);
        let err = StressDrill::new(ctx)
            .create_task(&session(leaf_category("STRESS_DRILL")))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));
    }

    fn exam_pool() -> Vec<Exercise> {
        vec![
            stress_exercise(1, 1, "банты", 1, 2),
            stress_exercise(2, 1, "торты", 1, 2),
            stress_exercise(3, 1, "шарфы", 1, 2),
            stress_exercise(4, 1, "порты", 1, 2),
            stress_exercise(5, 1, "краны", 1, 2),
        ]
    }

    #[tokio::test]
    async fn exam_persists_displayed_positions() {
        let (ctx, _) = fake_ctx(exam_pool(), 11);
        let payload = StressExam::new(ctx)
            .create_task(&session(leaf_category("STRESS_EXAM")))
            .await
            .unwrap();
        assert_eq!(payload.exercise_ids.len(), EXAM_WORDS);

        let config: StressExamConfig =
            serde_json::from_value(payload.task_config.unwrap()).unwrap();
        assert_eq!(config.exercise_ids, payload.exercise_ids);
        assert_eq!(config.stress_positions.len(), EXAM_WORDS);
        // Every displayed position is either the canonical or the wrong one.
        assert!(config.stress_positions.iter().all(|p| *p == 1 || *p == 2));
        let correct = config.stress_positions.iter().filter(|p| **p == 1).count();
        assert!((2..=4).contains(&correct));
    }

    #[tokio::test]
    async fn exam_with_thin_pool_is_no_content() {
        let (ctx, _) = fake_ctx(exam_pool()[..3].to_vec(), 11);
        let err = StressExam::new(ctx)
            .create_task(&session(leaf_category("STRESS_EXAM")))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::NoContent { .. }));
    }

    #[tokio::test]
    async fn exam_grading_follows_the_config_not_the_session_order() {
        let (ctx, log) = fake_ctx(Vec::new(), 11);
        // Words 1,3,5 displayed with canonical stress 1; words 2,4 with 2.
        let config = json!({
            "exercise_ids": [1, 2, 3, 4, 5],
            "stress_positions": [1, 2, 1, 2, 1]
        });
        // Session holds the exercises in scrambled order.
        let mut exercises = exam_pool();
        exercises.reverse();
        let session = grading_session(leaf_category("STRESS_EXAM"), exercises, Some(config));

        let result = StressExam::new(ctx)
            .process_answer(&session, "135")
            .await
            .unwrap();
        assert!(result.is_correct);

        let entries = log.take();
        assert_eq!(entries.len(), EXAM_WORDS);
        assert!(entries.iter().all(|e| e.is_correct));
        assert!(entries.iter().all(|e| e.batch_id == entries[0].batch_id));
        assert!(entries[0].batch_id.is_some());
        // Rows follow display order from the config.
        let ids: Vec<i64> = entries.iter().map(|e| e.exercise_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn exam_grading_rejects_wrong_item_count() {
        let (ctx, _) = fake_ctx(Vec::new(), 11);
        let config = json!({"exercise_ids": [1], "stress_positions": [1]});
        let session = grading_session(
            leaf_category("STRESS_EXAM"),
            exam_pool()[..1].to_vec(),
            Some(config),
        );
        let err = StressExam::new(ctx)
            .process_answer(&session, "1")
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));
    }

    #[tokio::test]
    async fn exam_grading_requires_a_config() {
        let (ctx, _) = fake_ctx(Vec::new(), 11);
        let session = grading_session(leaf_category("STRESS_EXAM"), exam_pool(), None);
        let err = StressExam::new(ctx)
            .process_answer(&session, "1")
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));
    }
}
