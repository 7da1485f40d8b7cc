//! Error types for gramoteka-core.

use thiserror::Error;

/// Result type alias using TaskError.
pub type Result<T> = std::result::Result<T, TaskError>;

/// Errors produced by task creation and grading.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The exercise pool cannot satisfy the archetype's constraints.
    /// Surfaced to the user as "no content available"; never retried here.
    #[error("no suitable exercises in category {category_id}")]
    NoContent { category_id: i64 },

    /// Persisted session state or exercise data is structurally wrong for
    /// the archetype being processed. Data-integrity error, not recoverable.
    #[error("invalid session state: {0}")]
    Validation(String),

    /// A category is tagged with an archetype this deployment does not know.
    #[error("unsupported archetype tag: {0}")]
    UnknownArchetype(String),

    /// Failure inside a consumed capability (selection provider, answer log).
    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}

impl TaskError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
