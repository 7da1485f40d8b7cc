//! Core types shared by the task engine and its callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A node of the category tree. Only leaf (selectable) categories carry an
/// archetype tag; several archetypes pool their content from the parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub archetype: Option<String>,
    pub parent_id: Option<i64>,
}

/// Atomic content unit. `content` is an archetype-specific JSON envelope,
/// validated by the processor that consumes it. `answer` semantics vary by
/// archetype: a choice key, a stress index, a digit string, a free-text
/// token, or `;`-joined alternatives. Exercises sharing a `group_id` are
/// content variants that must not co-occur in one exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exercise {
    pub id: i64,
    pub category_id: i64,
    pub group_id: Option<Uuid>,
    pub content: Value,
    pub answer: String,
    pub explanation: String,
    pub is_active: bool,
}

/// Per-user session state, owned and persisted by the caller. `exercises`
/// holds the currently displayed items; for exams their display order is
/// reconstructed from the persisted `task_config`, never from this list.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: i64,
    pub category: Category,
    pub exercises: Vec<Exercise>,
    pub started_at: Option<DateTime<Utc>>,
    pub task_config: Option<Value>,
}

/// One answer choice offered with a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOption {
    pub label: String,
    pub value: String,
}

impl TaskOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Result of `create_task`: a rendered prompt, optional answer choices, the
/// selected exercise ids in display order, and an opaque config blob for
/// exam archetypes. The caller persists ids, timestamp and config onto the
/// session; the config round-trips untouched back into `process_answer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    pub prompt: String,
    pub options: Option<Vec<TaskOption>>,
    pub exercise_ids: Vec<i64>,
    pub task_config: Option<Value>,
}

impl TaskPayload {
    /// Payload for a single-exercise task with no persisted config.
    pub fn single(prompt: String, options: Option<Vec<TaskOption>>, exercise_id: i64) -> Self {
        Self {
            prompt,
            options,
            exercise_ids: vec![exercise_id],
            task_config: None,
        }
    }
}

/// Result of grading one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeResult {
    pub is_correct: bool,
    pub explanation: Option<String>,
}

/// One graded attempt, appended to the answer log. Rows produced by a single
/// exam submission share a `batch_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub is_correct: bool,
    pub response: String,
    pub solve_time_secs: i64,
    pub batch_id: Option<Uuid>,
    pub user_id: i64,
    pub exercise_id: i64,
    pub category_id: i64,
}

/// Exercise archetype: one family of content shape + grading rule, in drill
/// (single item) or exam (fixed multi-item) presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArchetypeTag {
    Soon,
    Skip,
    ClozeDrill,
    MeaningDrill,
    AnalysisExam,
    StressDrill,
    StressExam,
    ParonymDrill,
    ParonymExam,
    LexicalExam,
    WordFormDrill,
    WordFormExam,
    GrammarErrorDrill,
    GrammarErrorExam,
    RootDrill,
    RootExam,
    PrefixDrill,
    PrefixExam,
    SuffixDrill,
    SuffixExam,
    EndingDrill,
    EndingExam,
    ParticleDrill,
    ParticleExam,
    HyphenDrill,
    HyphenExam,
}

impl ArchetypeTag {
    /// Stable string value, as stored on category records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Soon => "SOON",
            Self::Skip => "SKIP",
            Self::ClozeDrill => "CLOZE_DRILL",
            Self::MeaningDrill => "MEANING_DRILL",
            Self::AnalysisExam => "ANALYSIS_EXAM",
            Self::StressDrill => "STRESS_DRILL",
            Self::StressExam => "STRESS_EXAM",
            Self::ParonymDrill => "PARONYM_DRILL",
            Self::ParonymExam => "PARONYM_EXAM",
            Self::LexicalExam => "LEXICAL_EXAM",
            Self::WordFormDrill => "WORD_FORM_DRILL",
            Self::WordFormExam => "WORD_FORM_EXAM",
            Self::GrammarErrorDrill => "GRAMMAR_ERROR_DRILL",
            Self::GrammarErrorExam => "GRAMMAR_ERROR_EXAM",
            Self::RootDrill => "ROOT_DRILL",
            Self::RootExam => "ROOT_EXAM",
            Self::PrefixDrill => "PREFIX_DRILL",
            Self::PrefixExam => "PREFIX_EXAM",
            Self::SuffixDrill => "SUFFIX_DRILL",
            Self::SuffixExam => "SUFFIX_EXAM",
            Self::EndingDrill => "ENDING_DRILL",
            Self::EndingExam => "ENDING_EXAM",
            Self::ParticleDrill => "PARTICLE_DRILL",
            Self::ParticleExam => "PARTICLE_EXAM",
            Self::HyphenDrill => "HYPHEN_DRILL",
            Self::HyphenExam => "HYPHEN_EXAM",
        }
    }

    /// Parse from the stored string value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SOON" => Some(Self::Soon),
            "SKIP" => Some(Self::Skip),
            "CLOZE_DRILL" => Some(Self::ClozeDrill),
            "MEANING_DRILL" => Some(Self::MeaningDrill),
            "ANALYSIS_EXAM" => Some(Self::AnalysisExam),
            "STRESS_DRILL" => Some(Self::StressDrill),
            "STRESS_EXAM" => Some(Self::StressExam),
            "PARONYM_DRILL" => Some(Self::ParonymDrill),
            "PARONYM_EXAM" => Some(Self::ParonymExam),
            "LEXICAL_EXAM" => Some(Self::LexicalExam),
            "WORD_FORM_DRILL" => Some(Self::WordFormDrill),
            "WORD_FORM_EXAM" => Some(Self::WordFormExam),
            "GRAMMAR_ERROR_DRILL" => Some(Self::GrammarErrorDrill),
            "GRAMMAR_ERROR_EXAM" => Some(Self::GrammarErrorExam),
            "ROOT_DRILL" => Some(Self::RootDrill),
            "ROOT_EXAM" => Some(Self::RootExam),
            "PREFIX_DRILL" => Some(Self::PrefixDrill),
            "PREFIX_EXAM" => Some(Self::PrefixExam),
            "SUFFIX_DRILL" => Some(Self::SuffixDrill),
            "SUFFIX_EXAM" => Some(Self::SuffixExam),
            "ENDING_DRILL" => Some(Self::EndingDrill),
            "ENDING_EXAM" => Some(Self::EndingExam),
            "PARTICLE_DRILL" => Some(Self::ParticleDrill),
            "PARTICLE_EXAM" => Some(Self::ParticleExam),
            "HYPHEN_DRILL" => Some(Self::HyphenDrill),
            "HYPHEN_EXAM" => Some(Self::HyphenExam),
            _ => None,
        }
    }
}
