//! Missing-letter spelling. Content is a word template with a `{letter}`
//! gap, the canonical answer is the letter that belongs there, and the
//! content names the letter learners typically put instead. The drill offers
//! both renderings; the exam shows five rows of words (three per row for
//! roots and prefixes, two for suffixes and endings) and asks for the rows
//! where every word takes the same letter.
//!
//! Correct rows come from same-answer clusters. Distractor rows are built by
//! an ordered ladder: first rows where one word's typical mistake for letter
//! X collides with another word's canonical X while its own answer differs —
//! a genuinely confusable mix — then any row spanning more than one answer,
//! and if neither fills the quota the task is infeasible. No unbounded
//! retries.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TaskError};
use crate::matching::{matches, MatchOptions};
use crate::rng::weighted_pick;
use crate::types::{Exercise, GradeResult, Session, TaskOption, TaskPayload};

use super::{
    current_exercise, decode_config, decode_content, escape_html, expect_exercise_count,
    ordered_by_ids, parent_category_id, word_in_context, subset_verdict, TaskContext,
    TaskProcessor, CORRECT_COUNT_CHOICES, CORRECT_COUNT_WEIGHTS,
};

const EXAM_ROWS: usize = 5;

const DRILL_INSTRUCTION: &str =
    "Выберите правильный вариант ответа, вставив пропущенную букву в слово.";

const EXAM_INSTRUCTION: &str = "<b>Укажите варианты ответов, в которых во всех словах одного \
ряда пропущена одна и та же буква. Запишите номера ответов.</b>";

#[derive(Debug, Deserialize)]
struct SpellingContent {
    word: String,
    incorrect_letter: String,
    #[serde(default)]
    context_before: Option<String>,
    #[serde(default)]
    context_after: Option<String>,
}

/// Ids flattened row by row in display order, plus which rows are uniform.
#[derive(Debug, Serialize, Deserialize)]
struct SpellingExamConfig {
    exercise_ids: Vec<i64>,
    correct_row_indices: Vec<usize>,
    words_per_row: usize,
}

fn word_display(word: &str, letter: &str) -> String {
    word.replace("{letter}", letter)
}

fn word_gap(word: &str) -> String {
    word.replace("{letter}", "..")
}

fn gap_in_context(content: &SpellingContent) -> String {
    word_in_context(
        &word_gap(&content.word),
        content.context_before.as_deref(),
        content.context_after.as_deref(),
    )
}

pub struct SpellingDrill {
    ctx: TaskContext,
}

impl SpellingDrill {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskProcessor for SpellingDrill {
    async fn create_task(&self, session: &Session) -> Result<TaskPayload> {
        let pool_id = parent_category_id(session)?;
        let picked = self.ctx.exercises.random(pool_id, 1).await?;
        let exercise = picked
            .first()
            .ok_or(TaskError::NoContent { category_id: pool_id })?;

        let content: SpellingContent = decode_content(exercise)?;
        let mut options = vec![
            TaskOption::new(
                word_display(&content.word, &exercise.answer.to_uppercase()),
                exercise.answer.clone(),
            ),
            TaskOption::new(
                word_display(&content.word, &content.incorrect_letter.to_uppercase()),
                content.incorrect_letter.clone(),
            ),
        ];
        options.shuffle(&mut self.ctx.rng.rng());

        let prompt = format!("{DRILL_INSTRUCTION}\n\n<i>{}</i>", gap_in_context(&content));
        Ok(TaskPayload::single(prompt, Some(options), exercise.id))
    }

    async fn process_answer(&self, session: &Session, submission: &str) -> Result<GradeResult> {
        let exercise = current_exercise(session)?;
        let is_correct = matches(submission, &exercise.answer, MatchOptions::single_word());

        self.ctx
            .log_answer(session, exercise.id, is_correct, submission, None)
            .await?;

        let content: SpellingContent = decode_content(exercise)?;
        let correct_word = word_display(&content.word, &exercise.answer.to_uppercase());
        let explanation = if is_correct {
            format!("<b>Ответ:</b> {correct_word}\n\n{}", exercise.explanation)
        } else {
            format!(
                "<b>Ваш ответ:</b> {}\n<b>Правильный ответ:</b> {correct_word}\n\n{}",
                word_display(&content.word, &submission.to_uppercase()),
                exercise.explanation
            )
        };

        Ok(GradeResult {
            is_correct,
            explanation: Some(explanation),
        })
    }
}

/// Exercises indexed by canonical letter and by typical-mistake letter.
struct LetterIndex {
    by_answer: HashMap<String, Vec<Exercise>>,
    by_incorrect: HashMap<String, Vec<Exercise>>,
}

impl LetterIndex {
    fn build(pool: &[Exercise]) -> Result<Self> {
        let mut by_answer: HashMap<String, Vec<Exercise>> = HashMap::new();
        let mut by_incorrect: HashMap<String, Vec<Exercise>> = HashMap::new();
        for exercise in pool {
            let content: SpellingContent = decode_content(exercise)?;
            by_answer
                .entry(exercise.answer.clone())
                .or_default()
                .push(exercise.clone());
            by_incorrect
                .entry(content.incorrect_letter)
                .or_default()
                .push(exercise.clone());
        }
        Ok(Self {
            by_answer,
            by_incorrect,
        })
    }

    fn unused<'a>(pool: &'a [Exercise], used: &HashSet<i64>) -> Vec<&'a Exercise> {
        pool.iter().filter(|e| !used.contains(&e.id)).collect()
    }

    /// Two-word distractor row: one word answering X paired with one whose
    /// typical mistake is X but whose own answer differs.
    fn confusable_pair(&self, used: &HashSet<i64>, rng: &mut StdRng) -> Option<Vec<Exercise>> {
        let mut letters: Vec<&String> = self.by_answer.keys().collect();
        letters.shuffle(rng);

        for letter in letters {
            let correct = Self::unused(&self.by_answer[letter], used);
            let confusable: Vec<&Exercise> = self
                .by_incorrect
                .get(letter)
                .map(|pool| {
                    pool.iter()
                        .filter(|e| !used.contains(&e.id) && &e.answer != letter)
                        .collect()
                })
                .unwrap_or_default();
            if let (Some(a), Some(b)) = (correct.first(), confusable.first()) {
                let mut row = vec![(*a).clone(), (*b).clone()];
                row.shuffle(rng);
                return Some(row);
            }
        }
        self.relaxed_row(used, rng, 2)
    }

    /// Three-word distractor row around one contested letter, mixing words
    /// that answer it with words that only look like they do.
    fn confusable_triple(&self, used: &HashSet<i64>, rng: &mut StdRng) -> Option<Vec<Exercise>> {
        let mut letters: Vec<&String> = self.by_incorrect.keys().collect();
        letters.shuffle(rng);

        for letter in letters {
            let correct = self
                .by_answer
                .get(letter)
                .map(|pool| Self::unused(pool, used))
                .unwrap_or_default();
            let confusable: Vec<&Exercise> = self.by_incorrect[letter]
                .iter()
                .filter(|e| !used.contains(&e.id) && &e.answer != letter)
                .collect();

            let mut splits = [(2usize, 1usize), (1, 2), (0, 3)];
            splits.shuffle(rng);
            for (n_correct, n_confusable) in splits {
                if correct.len() < n_correct || confusable.len() < n_confusable {
                    continue;
                }
                let mut row: Vec<Exercise> = correct
                    .iter()
                    .take(n_correct)
                    .chain(confusable.iter().take(n_confusable))
                    .map(|e| (*e).clone())
                    .collect();
                if distinct_answers(&row) > 1 {
                    row.shuffle(rng);
                    return Some(row);
                }
            }
        }
        self.relaxed_row(used, rng, 3)
    }

    /// Fallback strategy: any combination spanning more than one answer.
    fn relaxed_row(
        &self,
        used: &HashSet<i64>,
        rng: &mut StdRng,
        size: usize,
    ) -> Option<Vec<Exercise>> {
        let mut remaining: Vec<&Exercise> = self
            .by_answer
            .values()
            .flatten()
            .filter(|e| !used.contains(&e.id))
            .collect();
        remaining.shuffle(rng);

        if size == 2 {
            for (i, first) in remaining.iter().enumerate() {
                for second in remaining.iter().skip(i + 1) {
                    if first.answer != second.answer {
                        let mut row = vec![(*first).clone(), (*second).clone()];
                        row.shuffle(rng);
                        return Some(row);
                    }
                }
            }
            return None;
        }

        for window in remaining.windows(size) {
            let mut row: Vec<Exercise> = window.iter().map(|e| (*e).clone()).collect();
            if distinct_answers(&row) > 1 {
                row.shuffle(rng);
                return Some(row);
            }
        }
        None
    }
}

fn distinct_answers(row: &[Exercise]) -> usize {
    row.iter()
        .map(|e| e.answer.as_str())
        .collect::<HashSet<_>>()
        .len()
}

fn build_wrong_rows(
    wrong_count: usize,
    words_per_row: usize,
    pool: &[Exercise],
    rng: &mut StdRng,
) -> Result<Vec<Vec<Exercise>>> {
    let index = LetterIndex::build(pool)?;
    let mut rows = Vec::with_capacity(wrong_count);
    let mut used: HashSet<i64> = HashSet::new();

    for _ in 0..wrong_count {
        let row = if words_per_row == 2 {
            index.confusable_pair(&used, rng)
        } else {
            index.confusable_triple(&used, rng)
        };
        match row {
            Some(row) => {
                used.extend(row.iter().map(|e| e.id));
                rows.push(row);
            }
            None => break,
        }
    }
    Ok(rows)
}

pub struct SpellingExam {
    ctx: TaskContext,
    words_per_row: usize,
}

impl SpellingExam {
    pub fn new(ctx: TaskContext, words_per_row: usize) -> Self {
        Self { ctx, words_per_row }
    }
}

#[async_trait]
impl TaskProcessor for SpellingExam {
    async fn create_task(&self, session: &Session) -> Result<TaskPayload> {
        let pool_id = parent_category_id(session)?;
        let wpr = self.words_per_row;
        let mut rng = self.ctx.rng.rng();

        let correct_count =
            weighted_pick(&mut rng, &CORRECT_COUNT_CHOICES, &CORRECT_COUNT_WEIGHTS);
        let wrong_count = EXAM_ROWS - correct_count;

        let clustered = self
            .ctx
            .exercises
            .random_same_answer_groups(pool_id, wpr, correct_count)
            .await?;
        if clustered.len() < correct_count * wpr {
            return Err(TaskError::NoContent { category_id: pool_id });
        }

        let mut correct_rows: Vec<Vec<Exercise>> = Vec::with_capacity(correct_count);
        for exercise in clustered {
            match correct_rows
                .iter_mut()
                .find(|row| row[0].answer == exercise.answer)
            {
                Some(row) => row.push(exercise),
                None => correct_rows.push(vec![exercise]),
            }
        }

        let used: HashSet<i64> = correct_rows
            .iter()
            .flatten()
            .map(|e| e.id)
            .collect();

        // Oversample the distractor pool; the ladder filters it down. The
        // correct-row picks gate this query, so the calls stay sequential.
        let wrong_pool = self
            .ctx
            .exercises
            .random(pool_id, wrong_count * wpr * 3)
            .await?;
        let remaining: Vec<Exercise> = wrong_pool
            .into_iter()
            .filter(|e| !used.contains(&e.id))
            .collect();

        let wrong_rows = build_wrong_rows(wrong_count, wpr, &remaining, &mut rng)?;
        if wrong_rows.len() < wrong_count {
            return Err(TaskError::NoContent { category_id: pool_id });
        }

        let mut tagged: Vec<(Vec<Exercise>, bool)> = correct_rows
            .into_iter()
            .map(|row| (row, true))
            .chain(wrong_rows.into_iter().map(|row| (row, false)))
            .collect();
        tagged.shuffle(&mut rng);

        let correct_row_indices: Vec<usize> = tagged
            .iter()
            .enumerate()
            .filter(|(_, (_, uniform))| *uniform)
            .map(|(i, _)| i)
            .collect();

        let mut lines = Vec::with_capacity(EXAM_ROWS);
        for (i, (row, _)) in tagged.iter().enumerate() {
            let mut words = Vec::with_capacity(row.len());
            for exercise in row {
                let content: SpellingContent = decode_content(exercise)?;
                words.push(gap_in_context(&content));
            }
            lines.push(format!("{}) {}", i + 1, words.join(", ")));
        }

        let prompt = format!("{EXAM_INSTRUCTION}\n\n{}", lines.join("\n"));
        let exercise_ids: Vec<i64> = tagged
            .iter()
            .flat_map(|(row, _)| row.iter().map(|e| e.id))
            .collect();
        let config = SpellingExamConfig {
            exercise_ids: exercise_ids.clone(),
            correct_row_indices,
            words_per_row: wpr,
        };

        Ok(TaskPayload {
            prompt,
            options: None,
            exercise_ids,
            task_config: Some(serde_json::to_value(config).map_err(anyhow::Error::from)?),
        })
    }

    async fn process_answer(&self, session: &Session, submission: &str) -> Result<GradeResult> {
        let wpr = self.words_per_row;
        expect_exercise_count(session, EXAM_ROWS * wpr)?;
        let config: SpellingExamConfig = decode_config(session)?;
        if config.words_per_row != wpr {
            return Err(TaskError::validation(
                "persisted words-per-row does not match this archetype",
            ));
        }

        let (expected, submitted, is_correct) =
            subset_verdict(&config.correct_row_indices, submission);
        let ordered = ordered_by_ids(session, &config.exercise_ids)?;
        let batch_id = Uuid::new_v4();

        let mut details = String::new();
        for row_index in 0..EXAM_ROWS {
            let row = &ordered[row_index * wpr..(row_index + 1) * wpr];
            let row_number = row_index + 1;
            let uniform = config.correct_row_indices.contains(&row_index);
            let selected = submitted.contains(&row_number.to_string());
            let row_right = selected == uniform;

            details.push_str(&format!("<b>{row_number})</b>\n"));
            for exercise in row {
                let content: SpellingContent = decode_content(exercise)?;
                let filled = word_in_context(
                    &word_display(&content.word, &format!("<b>{}</b>", exercise.answer.to_uppercase())),
                    content.context_before.as_deref(),
                    content.context_after.as_deref(),
                );
                details.push_str(&filled);
                details.push('\n');
                if !exercise.explanation.is_empty() {
                    details.push_str(&format!("<i>{}</i>\n", exercise.explanation));
                }
                details.push('\n');
            }

            for exercise in row {
                self.ctx
                    .log_answer(session, exercise.id, row_right, submission, Some(batch_id))
                    .await?;
            }
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
    use crate::rng::RngSource;
    use crate::testing::{exercise, fake_ctx, grading_session, leaf_category, session};
    use serde_json::json;
    use std::collections::HashMap;

    fn spelling_exercise(id: i64, word: &str, answer: &str, wrong: &str) -> Exercise {
        exercise(
            id,
            1,
            json!({"word": word, "incorrect_letter": wrong}),
            answer,
        )
    }

    #[test]
    fn word_rendering_replaces_the_gap() {
        assert_eq!(word_display("з{letter}ря", "а"), "заря");
        assert_eq!(word_gap("з{letter}ря"), "з..ря");
    }

    #[tokio::test]
    async fn drill_offers_both_letters() {
        let (ctx, _) = fake_ctx(vec![spelling_exercise(1, "з{letter}ря", "а", "о")], 6);
        let payload = SpellingDrill::new(ctx)
            .create_task(&session(leaf_category("ROOT_DRILL")))
            .await
            .unwrap();
        let labels: Vec<String> = payload
            .options
            .unwrap()
            .into_iter()
            .map(|o| o.label)
            .collect();
        assert!(labels.contains(&"зАря".to_string()));
        assert!(labels.contains(&"зОря".to_string()));
        assert!(payload.prompt.contains("з..ря"));
    }

    #[tokio::test]
    async fn drill_grades_the_letter_itself() {
        let (ctx, log) = fake_ctx(Vec::new(), 6);
        let session = grading_session(
            leaf_category("ROOT_DRILL"),
            vec![spelling_exercise(1, "з{letter}ря", "а", "о")],
            None,
        );
        let processor = SpellingDrill::new(ctx);
        assert!(processor.process_answer(&session, "А").await.unwrap().is_correct);
        assert!(!processor.process_answer(&session, "о").await.unwrap().is_correct);
        assert_eq!(log.take().len(), 2);
    }

    /// Pool with four same-letter clusters and confusable leftovers.
    fn exam_pool() -> Vec<Exercise> {
        let mut pool = Vec::new();
        let mut id = 0;
        for (letter, wrong) in [("а", "о"), ("о", "а"), ("е", "и"), ("и", "е")] {
            for _ in 0..4 {
                id += 1;
                pool.push(spelling_exercise(
                    id,
                    &format!("сл{{letter}}во{id}"),
                    letter,
                    wrong,
                ));
            }
        }
        pool
    }

    #[tokio::test]
    async fn exam_builds_five_rows_with_uniform_correct_rows() {
        for seed in [1, 7, 42, 99] {
            let (ctx, _) = fake_ctx(exam_pool(), seed);
            let payload = SpellingExam::new(ctx, 2)
                .create_task(&session(leaf_category("SUFFIX_EXAM")))
                .await
                .unwrap();

            let config: SpellingExamConfig =
                serde_json::from_value(payload.task_config.unwrap()).unwrap();
            assert_eq!(config.exercise_ids.len(), EXAM_ROWS * 2);
            assert_eq!(config.words_per_row, 2);
            assert!((2..=4).contains(&config.correct_row_indices.len()));
            assert!(config.correct_row_indices.iter().all(|i| *i < EXAM_ROWS));

            let by_id: HashMap<i64, Exercise> =
                exam_pool().into_iter().map(|e| (e.id, e)).collect();
            for row_index in 0..EXAM_ROWS {
                let row: Vec<&Exercise> = config.exercise_ids
                    [row_index * 2..(row_index + 1) * 2]
                    .iter()
                    .map(|id| &by_id[id])
                    .collect();
                let uniform = row[0].answer == row[1].answer;
                assert_eq!(
                    uniform,
                    config.correct_row_indices.contains(&row_index),
                    "seed {seed}, row {row_index}"
                );
            }

            // No exercise appears twice.
            let mut ids = config.exercise_ids.clone();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), EXAM_ROWS * 2);
        }
    }

    #[tokio::test]
    async fn exam_without_enough_clusters_is_no_content() {
        // Only one letter has enough same-answer words for a cluster.
        let pool = vec![
            spelling_exercise(1, "в{letter}да", "о", "а"),
            spelling_exercise(2, "г{letter}ра", "о", "а"),
            spelling_exercise(3, "з{letter}ря", "а", "о"),
        ];
        let (ctx, _) = fake_ctx(pool, 3);
        let err = SpellingExam::new(ctx, 2)
            .create_task(&session(leaf_category("SUFFIX_EXAM")))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::NoContent { .. }));
    }

    #[test]
    fn confusable_ladder_prefers_genuine_confusions() {
        // "о"-answering word plus a word whose typical mistake is "о".
        let pool = vec![
            spelling_exercise(1, "в{letter}да", "о", "а"),
            spelling_exercise(2, "тр{letter}ва", "а", "о"),
        ];
        let index = LetterIndex::build(&pool).unwrap();
        let mut rng = crate::rng::FixedSeed(5).rng();
        let row = index.confusable_pair(&HashSet::new(), &mut rng).unwrap();
        assert_eq!(distinct_answers(&row), 2);
    }

    #[test]
    fn relaxed_fallback_requires_mixed_answers() {
        // All words answer the same letter: no distractor row can exist.
        let pool = vec![
            spelling_exercise(1, "в{letter}да", "о", "а"),
            spelling_exercise(2, "г{letter}ра", "о", "а"),
            spelling_exercise(3, "к{letter}са", "о", "а"),
        ];
        let index = LetterIndex::build(&pool).unwrap();
        let mut rng = crate::rng::FixedSeed(5).rng();
        assert!(index.confusable_pair(&HashSet::new(), &mut rng).is_none());
        assert!(index.confusable_triple(&HashSet::new(), &mut rng).is_none());
    }

    #[tokio::test]
    async fn exam_grading_logs_one_row_per_word() {
        let pool = exam_pool();
        let exercises: Vec<Exercise> = pool[..10].to_vec();
        let ids: Vec<i64> = exercises.iter().map(|e| e.id).collect();
        let (ctx, log) = fake_ctx(Vec::new(), 6);
        // Rows: (1,2) (3,4) (5,6) (7,8) (9,10). The persisted config, not
        // the exercises, decides which rows count as uniform.
        let config = json!({
            "exercise_ids": ids,
            "correct_row_indices": [0, 2, 4],
            "words_per_row": 2
        });
        let session = grading_session(leaf_category("SUFFIX_EXAM"), exercises, Some(config));

        let processor = SpellingExam::new(ctx, 2);
        let result = processor.process_answer(&session, "135").await.unwrap();
        assert!(result.is_correct);

        let entries = log.take();
        assert_eq!(entries.len(), EXAM_ROWS * 2);
        assert!(entries.iter().all(|e| e.is_correct));
        assert!(entries.iter().all(|e| e.batch_id == entries[0].batch_id));

        // Missing one digit flips exactly the rows it affects.
        let result = processor.process_answer(&session, "15").await.unwrap();
        assert!(!result.is_correct);
        let explanation = result.explanation.unwrap();
        assert!(explanation.contains("Ваш ответ: 15"));
        assert!(explanation.contains("Правильный ответ: 135"));
        let entries = log.take();
        // First call logged 10 rows, second another 10; in the second, the
        // two words of unselected row 3 are wrong.
        let second = &entries[10..];
        assert_eq!(second.iter().filter(|e| !e.is_correct).count(), 2);
    }

    #[tokio::test]
    async fn exam_grading_treats_duplicate_digits_as_one() {
        let pool = exam_pool();
        let exercises: Vec<Exercise> = pool[..10].to_vec();
        let ids: Vec<i64> = exercises.iter().map(|e| e.id).collect();
        let (ctx, _) = fake_ctx(Vec::new(), 6);
        let config = json!({
            "exercise_ids": ids,
            "correct_row_indices": [0, 2, 4],
            "words_per_row": 2
        });
        let session = grading_session(leaf_category("SUFFIX_EXAM"), exercises, Some(config));

        let result = SpellingExam::new(ctx, 2)
            .process_answer(&session, "113355")
            .await
            .unwrap();
        assert!(result.is_correct);
    }

    #[tokio::test]
    async fn exam_grading_rejects_row_count_mismatch() {
        let (ctx, _) = fake_ctx(Vec::new(), 6);
        let exercises: Vec<Exercise> = exam_pool()[..4].to_vec();
        let config = json!({
            "exercise_ids": [1, 2, 3, 4],
            "correct_row_indices": [0],
            "words_per_row": 2
        });
        let session = grading_session(leaf_category("SUFFIX_EXAM"), exercises, Some(config));
        let err = SpellingExam::new(ctx, 2)
            .process_answer(&session, "1")
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));
    }
}
