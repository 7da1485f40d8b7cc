//! The per-archetype processor family.
//!
//! Every archetype implements the same two-operation contract: `create_task`
//! selects content, renders a prompt and persists just enough opaque config
//! to grade later; `process_answer` re-derives correctness from the session
//! state, appends log rows and returns a verdict. The registry maps a
//! category's archetype tag to its processor.

pub mod analysis;
pub mod cloze;
pub mod grammar_errors;
pub mod hyphenation;
pub mod lexical;
pub mod meaning;
pub mod paronyms;
pub mod particles;
pub mod spelling;
pub mod stress;
pub mod stub;
pub mod word_forms;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::{Result, TaskError};
use crate::rng::RngSource;
use crate::selection::{AnswerLog, ExerciseSelector};
use crate::types::{AnswerRecord, ArchetypeTag, Exercise, GradeResult, Session, TaskPayload};

/// Relative weights for drawing the number of "correct" items in a
/// subset-style exam: 2, 3 or 4 of 5, skewed away from 4.
pub(crate) const CORRECT_COUNT_WEIGHTS: [u32; 3] = [4, 4, 1];
pub(crate) const CORRECT_COUNT_CHOICES: [usize; 3] = [2, 3, 4];

/// One exercise archetype in one presentation mode.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    /// Select content and render a task for the session's category.
    async fn create_task(&self, session: &Session) -> Result<TaskPayload>;

    /// Grade a raw submission against the persisted session state.
    async fn process_answer(&self, session: &Session, submission: &str) -> Result<GradeResult>;
}

impl std::fmt::Debug for dyn TaskProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn TaskProcessor")
    }
}

/// Dependencies shared by all processors.
#[derive(Clone)]
pub struct TaskContext {
    pub exercises: Arc<dyn ExerciseSelector>,
    pub answers: Arc<dyn AnswerLog>,
    pub rng: Arc<dyn RngSource>,
}

impl TaskContext {
    pub fn new(
        exercises: Arc<dyn ExerciseSelector>,
        answers: Arc<dyn AnswerLog>,
        rng: Arc<dyn RngSource>,
    ) -> Self {
        Self {
            exercises,
            answers,
            rng,
        }
    }

    /// Append one log row for the session's user and active category.
    pub(crate) async fn log_answer(
        &self,
        session: &Session,
        exercise_id: i64,
        is_correct: bool,
        submission: &str,
        batch_id: Option<Uuid>,
    ) -> Result<()> {
        self.answers
            .append(AnswerRecord {
                is_correct,
                response: submission.to_string(),
                solve_time_secs: solve_time(session.started_at),
                batch_id,
                user_id: session.user_id,
                exercise_id,
                category_id: session.category.id,
            })
            .await
    }

    /// Grade the single displayed exercise by exact answer equality, log the
    /// attempt, and return the exercise's own explanation.
    pub(crate) async fn grade_single_exact(
        &self,
        session: &Session,
        submission: &str,
    ) -> Result<GradeResult> {
        let exercise = current_exercise(session)?;
        let is_correct = submission == exercise.answer;
        self.log_answer(session, exercise.id, is_correct, submission, None)
            .await?;
        Ok(GradeResult {
            is_correct,
            explanation: Some(exercise.explanation.clone()),
        })
    }
}

/// Maps an archetype tag to its processor.
pub struct ProcessorRegistry {
    ctx: TaskContext,
}

impl ProcessorRegistry {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }

    /// Resolve a stored tag string. An unknown tag means a category was
    /// tagged with an archetype this deployment does not support.
    pub fn resolve(&self, tag: &str) -> Result<Box<dyn TaskProcessor>> {
        let tag = ArchetypeTag::parse(tag)
            .ok_or_else(|| TaskError::UnknownArchetype(tag.to_string()))?;
        Ok(self.processor(tag))
    }

    /// Build the processor for a known tag.
    pub fn processor(&self, tag: ArchetypeTag) -> Box<dyn TaskProcessor> {
        let ctx = self.ctx.clone();
        match tag {
            ArchetypeTag::Soon => Box::new(stub::ComingSoon),
            ArchetypeTag::Skip => Box::new(stub::Skipped),
            ArchetypeTag::ClozeDrill => Box::new(cloze::ClozeDrill::new(ctx)),
            ArchetypeTag::MeaningDrill => Box::new(meaning::MeaningDrill::new(ctx)),
            ArchetypeTag::AnalysisExam => Box::new(analysis::AnalysisExam::new(ctx)),
            ArchetypeTag::StressDrill => Box::new(stress::StressDrill::new(ctx)),
            ArchetypeTag::StressExam => Box::new(stress::StressExam::new(ctx)),
            ArchetypeTag::ParonymDrill => Box::new(paronyms::ParonymDrill::new(ctx)),
            ArchetypeTag::ParonymExam => Box::new(paronyms::ParonymExam::new(ctx)),
            ArchetypeTag::LexicalExam => Box::new(lexical::LexicalExam::new(ctx)),
            ArchetypeTag::WordFormDrill => Box::new(word_forms::WordFormDrill::new(ctx)),
            ArchetypeTag::WordFormExam => Box::new(word_forms::WordFormExam::new(ctx)),
            ArchetypeTag::GrammarErrorDrill => {
                Box::new(grammar_errors::GrammarErrorDrill::new(ctx))
            }
            ArchetypeTag::GrammarErrorExam => {
                Box::new(grammar_errors::GrammarErrorExam::new(ctx))
            }
            ArchetypeTag::RootDrill | ArchetypeTag::PrefixDrill => {
                Box::new(spelling::SpellingDrill::new(ctx))
            }
            ArchetypeTag::SuffixDrill | ArchetypeTag::EndingDrill => {
                Box::new(spelling::SpellingDrill::new(ctx))
            }
            ArchetypeTag::RootExam | ArchetypeTag::PrefixExam => {
                Box::new(spelling::SpellingExam::new(ctx, 3))
            }
            ArchetypeTag::SuffixExam | ArchetypeTag::EndingExam => {
                Box::new(spelling::SpellingExam::new(ctx, 2))
            }
            ArchetypeTag::ParticleDrill => Box::new(particles::ParticleDrill::new(ctx)),
            ArchetypeTag::ParticleExam => Box::new(particles::ParticleExam::new(ctx)),
            ArchetypeTag::HyphenDrill => Box::new(hyphenation::HyphenDrill::new(ctx)),
            ArchetypeTag::HyphenExam => Box::new(hyphenation::HyphenExam::new(ctx)),
        }
    }
}

// === shared helpers ===

/// Seconds between task display and now, 0 when the timestamp is missing.
pub(crate) fn solve_time(started_at: Option<DateTime<Utc>>) -> i64 {
    started_at
        .map(|t| (Utc::now() - t).num_seconds().max(0))
        .unwrap_or(0)
}

/// The single currently displayed exercise.
pub(crate) fn current_exercise(session: &Session) -> Result<&Exercise> {
    session
        .exercises
        .first()
        .ok_or_else(|| TaskError::validation("no current exercises to grade"))
}

/// Category whose pool the archetype draws from: the parent of the selected
/// sub-skill category. Its absence means the category tree is miswired.
pub(crate) fn parent_category_id(session: &Session) -> Result<i64> {
    session
        .category
        .parent_id
        .ok_or_else(|| TaskError::validation("selected category has no parent pool"))
}

/// Decode an archetype content envelope.
pub(crate) fn decode_content<T: DeserializeOwned>(exercise: &Exercise) -> Result<T> {
    serde_json::from_value(exercise.content.clone()).map_err(|e| {
        TaskError::validation(format!("malformed content for exercise {}: {e}", exercise.id))
    })
}

/// Decode the persisted task config; its absence at grading time means the
/// session is stale or corrupt.
pub(crate) fn decode_config<T: DeserializeOwned>(session: &Session) -> Result<T> {
    let raw = session
        .task_config
        .as_ref()
        .ok_or_else(|| TaskError::validation("task config is required for this archetype"))?;
    serde_json::from_value(raw.clone())
        .map_err(|e| TaskError::validation(format!("malformed task config: {e}")))
}

/// Reconstruct display order from the persisted id list.
pub(crate) fn ordered_by_ids<'a>(session: &'a Session, ids: &[i64]) -> Result<Vec<&'a Exercise>> {
    ids.iter()
        .map(|id| {
            session
                .exercises
                .iter()
                .find(|e| e.id == *id)
                .ok_or_else(|| {
                    TaskError::validation(format!("exercise {id} is missing from the session"))
                })
        })
        .collect()
}

/// The displayed-exercise count must match the archetype's exam size.
pub(crate) fn expect_exercise_count(session: &Session, expected: usize) -> Result<()> {
    if session.exercises.len() != expected {
        return Err(TaskError::validation(format!(
            "expected {expected} current exercises, found {}",
            session.exercises.len()
        )));
    }
    Ok(())
}

/// Canonical answer interpreted as a 1-based index.
pub(crate) fn numeric_answer(exercise: &Exercise) -> Result<usize> {
    exercise.answer.trim().parse().map_err(|_| {
        TaskError::validation(format!(
            "exercise {} answer must be a numeric index",
            exercise.id
        ))
    })
}

/// Digits of a raw submission, deduplicated. Duplicate digits grade the same
/// as their deduplicated form.
pub(crate) fn digit_set(submission: &str) -> BTreeSet<u32> {
    submission.chars().filter_map(|c| c.to_digit(10)).collect()
}

/// Sorted digit string of a submission.
pub(crate) fn submitted_digits(submission: &str) -> String {
    digit_set(submission).iter().map(|d| d.to_string()).collect()
}

/// Canonical digit string for a set of 0-based display indices (rendered
/// 1-based, ascending).
pub(crate) fn expected_digits(indices: &[usize]) -> String {
    let set: BTreeSet<usize> = indices.iter().copied().collect();
    set.iter().map(|i| (i + 1).to_string()).collect()
}

/// A word (or its rendering) framed by its optional context fragments.
pub(crate) fn word_in_context(word: &str, before: Option<&str>, after: Option<&str>) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(3);
    if let Some(b) = before {
        parts.push(b);
    }
    parts.push(word);
    if let Some(a) = after {
        parts.push(a);
    }
    parts.join(" ")
}

/// Subset-exam verdict: canonical digit string for the correct display
/// indices, the normalized submission digits, and their equality.
pub(crate) fn subset_verdict(
    correct_indices: &[usize],
    submission: &str,
) -> (String, String, bool) {
    let expected = expected_digits(correct_indices);
    let submitted = submitted_digits(submission);
    let is_correct = expected == submitted;
    (expected, submitted, is_correct)
}

/// Minimal HTML escaping for user-echoed text inside prompt markup.
pub(crate) fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}
