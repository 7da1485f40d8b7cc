//! Compound spelling: a bracketed word written together, separately or with
//! a hyphen. The drill classifies one sentence with a single bracketed word;
//! the exam shows five sentences with two bracketed words each and asks for
//! the numbers where both take the target writing. Drill and exam content
//! differ in shape, so both modes pool from the selected category itself.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TaskError};
use crate::rng::weighted_pick;
use crate::types::{Exercise, GradeResult, Session, TaskOption, TaskPayload};

use super::{
    current_exercise, decode_config, decode_content, escape_html, expect_exercise_count,
    ordered_by_ids, subset_verdict, TaskContext, TaskProcessor, CORRECT_COUNT_CHOICES,
    CORRECT_COUNT_WEIGHTS,
};

const EXAM_SENTENCES: usize = 5;

const TOGETHER: &str = "TOGETHER";
const SEPARATE: &str = "SEPARATE";
const HYPHEN: &str = "HYPHEN";

/// Target writings and how often each is asked for.
const TARGET_CHOICES: [&str; 3] = [TOGETHER, SEPARATE, HYPHEN];
const TARGET_WEIGHTS: [u32; 3] = [4, 4, 1];

fn writing_display(answer: &str) -> &str {
    match answer {
        TOGETHER => "слитно",
        SEPARATE => "раздельно",
        HYPHEN => "через дефис",
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct HyphenDrillContent {
    sentence: String,
}

#[derive(Debug, Deserialize)]
struct HyphenExamContent {
    sentence: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct HyphenExamConfig {
    exercise_ids: Vec<i64>,
    correct_indices: Vec<usize>,
    answer_type: String,
}

pub struct HyphenDrill {
    ctx: TaskContext,
}

impl HyphenDrill {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskProcessor for HyphenDrill {
    async fn create_task(&self, session: &Session) -> Result<TaskPayload> {
        let category_id = session.category.id;
        let picked = self.ctx.exercises.random(category_id, 1).await?;
        let exercise = picked
            .first()
            .ok_or(TaskError::NoContent { category_id })?;

        let content: HyphenDrillContent = decode_content(exercise)?;
        let prompt = format!(
            "Определите написание слова в скобках.\n\n<i>{}</i>",
            content.sentence
        );
        let options = vec![
            TaskOption::new("Слитно", TOGETHER),
            TaskOption::new("Раздельно", SEPARATE),
            TaskOption::new("Через дефис", HYPHEN),
        ];
        Ok(TaskPayload::single(prompt, Some(options), exercise.id))
    }

    async fn process_answer(&self, session: &Session, submission: &str) -> Result<GradeResult> {
        let exercise = current_exercise(session)?;
        let is_correct = submission == exercise.answer;

        self.ctx
            .log_answer(session, exercise.id, is_correct, submission, None)
            .await?;

        let content: HyphenDrillContent = decode_content(exercise)?;
        let correct_display = writing_display(&exercise.answer);
        let explanation = if is_correct {
            format!(
                "<b>Ответ:</b> {correct_display}\n\n<i>{}</i>\n\n{}",
                content.sentence, exercise.explanation
            )
        } else {
            format!(
                "<b>Ваш ответ:</b> {}\n<b>Правильный ответ:</b> {correct_display}\n\n<i>{}</i>\n\n{}",
                writing_display(submission),
                content.sentence,
                exercise.explanation
            )
        };

        Ok(GradeResult {
            is_correct,
            explanation: Some(explanation),
        })
    }
}

pub struct HyphenExam {
    ctx: TaskContext,
}

impl HyphenExam {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskProcessor for HyphenExam {
    async fn create_task(&self, session: &Session) -> Result<TaskPayload> {
        let category_id = session.category.id;
        let mut rng = self.ctx.rng.rng();

        let target = weighted_pick(&mut rng, &TARGET_CHOICES, &TARGET_WEIGHTS);
        let correct_count =
            weighted_pick(&mut rng, &CORRECT_COUNT_CHOICES, &CORRECT_COUNT_WEIGHTS);
        let wrong_count = EXAM_SENTENCES - correct_count;

        // Distractors are anything not matching the target, mixed-writing
        // sentences included.
        let correct = self
            .ctx
            .exercises
            .random_by_answer(category_id, target, correct_count)
            .await?;
        let wrong = self
            .ctx
            .exercises
            .random_excluding_answer(category_id, target, wrong_count)
            .await?;
        if correct.len() < correct_count || wrong.len() < wrong_count {
            return Err(TaskError::NoContent { category_id });
        }

        let mut sentences: Vec<Exercise> = correct.into_iter().chain(wrong).collect();
        sentences.shuffle(&mut rng);

        let correct_indices: Vec<usize> = sentences
            .iter()
            .enumerate()
            .filter(|(_, e)| e.answer == target)
            .map(|(i, _)| i)
            .collect();

        let mut prompt = format!(
            "Укажите варианты ответов, в которых оба выделенных слова пишутся <b>{}</b>. \
             Запишите номера ответов.\n\n",
            writing_display(target)
        );
        for (i, exercise) in sentences.iter().enumerate() {
            let content: HyphenExamContent = decode_content(exercise)?;
            prompt.push_str(&format!("{}) {}\n", i + 1, content.sentence));
        }

        let exercise_ids: Vec<i64> = sentences.iter().map(|e| e.id).collect();
        let config = HyphenExamConfig {
            exercise_ids: exercise_ids.clone(),
            correct_indices,
            answer_type: target.to_string(),
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
        let config: HyphenExamConfig = decode_config(session)?;

        let (expected, submitted, is_correct) =
            subset_verdict(&config.correct_indices, submission);
        let ordered = ordered_by_ids(session, &config.exercise_ids)?;
        let batch_id = Uuid::new_v4();

        let mut details = String::new();
        for (i, exercise) in ordered.iter().enumerate() {
            let number = i + 1;
            let should_pick = config.correct_indices.contains(&i);
            let picked = submitted.contains(&number.to_string());
            let sentence_right = picked == should_pick;

            let content: HyphenExamContent = decode_content(exercise)?;
            details.push_str(&format!("<b>{number})</b> <i>{}</i>\n", content.sentence));
            details.push_str(&format!("{}\n\n", exercise.explanation));

            self.ctx
                .log_answer(session, exercise.id, sentence_right, submission, Some(batch_id))
                .await?;
        }

        let mut explanation = if is_correct {
            format!("<b>Ответ: {expected}</b>")
        } else {
            format!(
                "Ваш ответ: {}\n<b>Правильный ответ: {expected}</b>",
                escape_html(&submitted)
            )
        };
        explanation.push_str(&format!(
            "\n\n<b>Объяснение:</b>\n<blockquote expandable>{details}</blockquote>"
        ));

        Ok(GradeResult {
            is_correct,
            explanation: Some(explanation),
        })
    }
}
