//! Particle spelling: НЕ (and occasionally НИ) written together with or
//! separately from the following word. The drill classifies one sentence;
//! the exam asks for the numbers of the sentences where the particle takes
//! the target writing. Content tags each sentence with its particle, which
//! drives the exam's two selection modes.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TaskError};
use crate::rng::weighted_pick;
use crate::types::{Exercise, GradeResult, Session, TaskOption, TaskPayload};

use super::{
    current_exercise, decode_config, decode_content, escape_html, expect_exercise_count,
    ordered_by_ids, parent_category_id, subset_verdict, TaskContext, TaskProcessor,
    CORRECT_COUNT_CHOICES, CORRECT_COUNT_WEIGHTS,
};

const EXAM_SENTENCES: usize = 5;
/// How many НИ sentences a mixed-mode exam takes, weighted like the
/// correct-count draw.
const NI_COUNT_CHOICES: [usize; 3] = [1, 2, 3];
const NI_COUNT_WEIGHTS: [u32; 3] = [4, 4, 1];

const TOGETHER: &str = "TOGETHER";
const SEPARATE: &str = "SEPARATE";

const MODE_NE: &str = "НЕ";
const MODE_NE_NI: &str = "НЕ/НИ";

fn writing_display(answer: &str) -> &str {
    match answer {
        TOGETHER => "слитно",
        SEPARATE => "раздельно",
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct ParticleContent {
    sentence: String,
    particle: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ParticleExamConfig {
    exercise_ids: Vec<i64>,
    correct_indices: Vec<usize>,
    /// The writing the exam asked for: TOGETHER or SEPARATE.
    answer_type: String,
    /// НЕ-only or mixed НЕ/НИ presentation.
    mode: String,
}

pub struct ParticleDrill {
    ctx: TaskContext,
}

impl ParticleDrill {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskProcessor for ParticleDrill {
    async fn create_task(&self, session: &Session) -> Result<TaskPayload> {
        let pool_id = parent_category_id(session)?;
        let picked = self.ctx.exercises.random(pool_id, 1).await?;
        let exercise = picked
            .first()
            .ok_or(TaskError::NoContent { category_id: pool_id })?;

        let content: ParticleContent = decode_content(exercise)?;
        let prompt = format!(
            "Укажите, как пишется частица <b>{}</b> в данном предложении.\n\n<i>{}</i>",
            content.particle, content.sentence
        );
        let options = vec![
            TaskOption::new("Слитно", TOGETHER),
            TaskOption::new("Раздельно", SEPARATE),
        ];
        Ok(TaskPayload::single(prompt, Some(options), exercise.id))
    }

    async fn process_answer(&self, session: &Session, submission: &str) -> Result<GradeResult> {
        let exercise = current_exercise(session)?;
        let is_correct = submission == exercise.answer;

        self.ctx
            .log_answer(session, exercise.id, is_correct, submission, None)
            .await?;

        let correct_display = writing_display(&exercise.answer);
        let explanation = if is_correct {
            format!("<b>Ответ:</b> {correct_display}\n\n{}", exercise.explanation)
        } else {
            format!(
                "<b>Ваш ответ:</b> {}\n<b>Правильный ответ:</b> {correct_display}\n\n{}",
                writing_display(submission),
                exercise.explanation
            )
        };

        Ok(GradeResult {
            is_correct,
            explanation: Some(explanation),
        })
    }
}

pub struct ParticleExam {
    ctx: TaskContext,
}

impl ParticleExam {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }

    /// НЕ-only exam: quotas filled directly from the two answer buckets.
    async fn fetch_ne(
        &self,
        pool_id: i64,
        target: &str,
        opposite: &str,
        correct_count: usize,
        wrong_count: usize,
    ) -> Result<Option<Vec<Exercise>>> {
        let correct = self
            .ctx
            .exercises
            .random_by_answer_and_content_value(pool_id, target, "particle", "НЕ", correct_count)
            .await?;
        let wrong = self
            .ctx
            .exercises
            .random_by_answer_and_content_value(pool_id, opposite, "particle", "НЕ", wrong_count)
            .await?;
        if correct.len() < correct_count || wrong.len() < wrong_count {
            return Ok(None);
        }
        Ok(Some(correct.into_iter().chain(wrong).collect()))
    }

    /// Mixed exam: НИ sentences are drawn first and their share of target
    /// writings gates the НЕ quotas, so the calls must stay sequential.
    async fn fetch_ne_ni(
        &self,
        pool_id: i64,
        target: &str,
        opposite: &str,
        correct_count: usize,
        ni_count: usize,
    ) -> Result<Option<Vec<Exercise>>> {
        let ni = self
            .ctx
            .exercises
            .random_by_content_value(pool_id, "particle", "НИ", ni_count)
            .await?;
        if ni.is_empty() {
            return Ok(None);
        }

        let ni_correct = ni.iter().filter(|e| e.answer == target).count();
        let ne_total = EXAM_SENTENCES - ni.len();
        let ne_correct = correct_count
            .saturating_sub(ni_correct)
            .max(1)
            .min(ne_total - 1);
        let ne_wrong = ne_total - ne_correct;

        let correct = self
            .ctx
            .exercises
            .random_by_answer_and_content_value(pool_id, target, "particle", "НЕ", ne_correct)
            .await?;
        let wrong = self
            .ctx
            .exercises
            .random_by_answer_and_content_value(pool_id, opposite, "particle", "НЕ", ne_wrong)
            .await?;
        if correct.len() < ne_correct || wrong.len() < ne_wrong {
            return Ok(None);
        }
        Ok(Some(ni.into_iter().chain(correct).chain(wrong).collect()))
    }
}

#[async_trait]
impl TaskProcessor for ParticleExam {
    async fn create_task(&self, session: &Session) -> Result<TaskPayload> {
        let pool_id = parent_category_id(session)?;
        let mut rng = self.ctx.rng.rng();

        let mode = weighted_pick(&mut rng, &[MODE_NE, MODE_NE_NI], &[90, 10]);
        let target = *[TOGETHER, SEPARATE].choose(&mut rng).unwrap_or(&TOGETHER);
        let opposite = if target == TOGETHER { SEPARATE } else { TOGETHER };
        let correct_count =
            weighted_pick(&mut rng, &CORRECT_COUNT_CHOICES, &CORRECT_COUNT_WEIGHTS);
        let wrong_count = EXAM_SENTENCES - correct_count;

        let picked = if mode == MODE_NE {
            self.fetch_ne(pool_id, target, opposite, correct_count, wrong_count)
                .await?
        } else {
            let ni_count = weighted_pick(&mut rng, &NI_COUNT_CHOICES, &NI_COUNT_WEIGHTS);
            self.fetch_ne_ni(pool_id, target, opposite, correct_count, ni_count)
                .await?
        };
        let mut sentences = picked.ok_or(TaskError::NoContent { category_id: pool_id })?;

        sentences.shuffle(&mut rng);
        let correct_indices: Vec<usize> = sentences
            .iter()
            .enumerate()
            .filter(|(_, e)| e.answer == target)
            .map(|(i, _)| i)
            .collect();

        let mut prompt = format!(
            "Укажите варианты ответов, в которых <b>{mode}</b> пишется <b>{}</b>. \
             Запишите номера ответов.\n\n",
            writing_display(target)
        );
        for (i, exercise) in sentences.iter().enumerate() {
            let content: ParticleContent = decode_content(exercise)?;
            prompt.push_str(&format!("{}) {}\n", i + 1, content.sentence));
        }

        let exercise_ids: Vec<i64> = sentences.iter().map(|e| e.id).collect();
        let config = ParticleExamConfig {
            exercise_ids: exercise_ids.clone(),
            correct_indices,
            answer_type: target.to_string(),
            mode: mode.to_string(),
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
        let config: ParticleExamConfig = decode_config(session)?;

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

            let content: ParticleContent = decode_content(exercise)?;
            details.push_str(&format!("<b>{number})</b> {}\n", content.sentence));
            details.push_str(&format!(
                "<i>Пишется {}. {}</i>\n\n",
                writing_display(&exercise.answer),
                exercise.explanation
            ));

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
    use std::collections::HashMap;

    fn particle_exercise(id: i64, particle: &str, answer: &str) -> Exercise {
        exercise(
            id,
            1,
            json!({
                "sentence": format!("({particle})ВИДИМЫЙ предмет номер {id}."),
                "particle": particle
            }),
            answer,
        )
    }

    fn rich_pool() -> Vec<Exercise> {
        let mut pool = Vec::new();
        for id in 1..=6 {
            pool.push(particle_exercise(id, "НЕ", TOGETHER));
        }
        for id in 7..=12 {
            pool.push(particle_exercise(id, "НЕ", SEPARATE));
        }
        for id in 13..=15 {
            pool.push(particle_exercise(id, "НИ", SEPARATE));
        }
        pool
    }

    #[tokio::test]
    async fn drill_classifies_by_exact_value() {
        let (ctx, log) = fake_ctx(Vec::new(), 8);
        let session = grading_session(
            leaf_category("PARTICLE_DRILL"),
            vec![particle_exercise(1, "НЕ", TOGETHER)],
            None,
        );
        let processor = ParticleDrill::new(ctx);
        assert!(processor
            .process_answer(&session, TOGETHER)
            .await
            .unwrap()
            .is_correct);
        let result = processor.process_answer(&session, SEPARATE).await.unwrap();
        assert!(!result.is_correct);
        let explanation = result.explanation.unwrap();
        assert!(explanation.contains("Ваш ответ:</b> раздельно"));
        assert!(explanation.contains("Правильный ответ:</b> слитно"));
        assert_eq!(log.take().len(), 2);
    }

    #[tokio::test]
    async fn exam_composition_matches_its_config() {
        for seed in [1, 2, 3, 10, 25] {
            let (ctx, _) = fake_ctx(rich_pool(), seed);
            let payload = ParticleExam::new(ctx)
                .create_task(&session(leaf_category("PARTICLE_EXAM")))
                .await
                .unwrap();

            let config: ParticleExamConfig =
                serde_json::from_value(payload.task_config.unwrap()).unwrap();
            assert_eq!(config.exercise_ids.len(), EXAM_SENTENCES);
            assert!(config.correct_indices.iter().all(|i| *i < EXAM_SENTENCES));

            let by_id: HashMap<i64, Exercise> =
                rich_pool().into_iter().map(|e| (e.id, e)).collect();
            for (i, id) in config.exercise_ids.iter().enumerate() {
                let is_target = by_id[id].answer == config.answer_type;
                assert_eq!(is_target, config.correct_indices.contains(&i), "seed {seed}");
            }
        }
    }

    #[tokio::test]
    async fn exam_without_target_sentences_is_no_content() {
        // Every sentence writes НЕ together; a SEPARATE draw cannot be filled
        // and a TOGETHER draw lacks distractors. Either way: no content.
        let pool: Vec<Exercise> = (1..=8)
            .map(|id| particle_exercise(id, "НЕ", TOGETHER))
            .collect();
        let (ctx, _) = fake_ctx(pool, 2);
        let err = ParticleExam::new(ctx)
            .create_task(&session(leaf_category("PARTICLE_EXAM")))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::NoContent { .. }));
    }

    #[tokio::test]
    async fn exam_grading_appends_five_rows_in_display_order() {
        let exercises: Vec<Exercise> = vec![
            particle_exercise(1, "НЕ", TOGETHER),
            particle_exercise(2, "НЕ", SEPARATE),
            particle_exercise(3, "НЕ", TOGETHER),
            particle_exercise(4, "НЕ", SEPARATE),
            particle_exercise(5, "НИ", SEPARATE),
        ];
        let (ctx, log) = fake_ctx(Vec::new(), 8);
        let config = json!({
            "exercise_ids": [5, 4, 3, 2, 1],
            "correct_indices": [2, 4],
            "answer_type": TOGETHER,
            "mode": MODE_NE_NI
        });
        let session = grading_session(leaf_category("PARTICLE_EXAM"), exercises, Some(config));

        let result = ParticleExam::new(ctx)
            .process_answer(&session, "3 и 5")
            .await
            .unwrap();
        assert!(result.is_correct);

        let entries = log.take();
        assert_eq!(entries.len(), EXAM_SENTENCES);
        let ids: Vec<i64> = entries.iter().map(|e| e.exercise_id).collect();
        assert_eq!(ids, vec![5, 4, 3, 2, 1]);
        assert!(entries.iter().all(|e| e.is_correct));
    }
}
