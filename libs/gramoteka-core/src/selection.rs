//! Capabilities the task engine consumes from its environment.
//!
//! Both traits are implemented by the storage layer of the embedding
//! application. Every selection operation samples randomly from the active
//! exercises of one category; returning fewer rows than requested is a valid
//! response and signals infeasibility to the processor, which then fails the
//! task-creation attempt.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AnswerRecord, Exercise};

/// Randomized exercise selection under combinatorial constraints.
#[async_trait]
pub trait ExerciseSelector: Send + Sync {
    /// Up to `limit` exercises uniformly sampled from the category pool.
    async fn random(&self, category_id: i64, limit: usize) -> Result<Vec<Exercise>>;

    /// Restricted to exercises whose content carries the named optional field.
    async fn random_with_content_field(
        &self,
        category_id: i64,
        field: &str,
        limit: usize,
    ) -> Result<Vec<Exercise>>;

    /// At most one exercise per group id; a missing group id counts as a
    /// singleton group. When `require_field` is set, at least one returned
    /// exercise carries that content field (or the result is empty).
    async fn random_distinct_groups(
        &self,
        category_id: i64,
        limit: usize,
        require_field: Option<&str>,
    ) -> Result<Vec<Exercise>>;

    /// Exercises whose canonical answer equals `answer`.
    async fn random_by_answer(
        &self,
        category_id: i64,
        answer: &str,
        limit: usize,
    ) -> Result<Vec<Exercise>>;

    /// Exercises whose canonical answer differs from `answer`.
    async fn random_excluding_answer(
        &self,
        category_id: i64,
        answer: &str,
        limit: usize,
    ) -> Result<Vec<Exercise>>;

    /// At most one exercise per distinct canonical answer, excluding
    /// `exclude_answer`.
    async fn random_with_distinct_answers(
        &self,
        category_id: i64,
        exclude_answer: &str,
        limit: usize,
    ) -> Result<Vec<Exercise>>;

    /// `num_groups` clusters of `group_size` exercises, each cluster sharing
    /// one canonical answer value and clusters pairwise distinct in it.
    /// Returned flat, clusters contiguous. Shortfall in either dimension is
    /// reported by simply returning fewer exercises.
    async fn random_same_answer_groups(
        &self,
        category_id: i64,
        group_size: usize,
        num_groups: usize,
    ) -> Result<Vec<Exercise>>;

    /// Exercises whose content field equals a literal value.
    async fn random_by_content_value(
        &self,
        category_id: i64,
        field: &str,
        value: &str,
        limit: usize,
    ) -> Result<Vec<Exercise>>;

    /// Exercises filtered both by canonical answer and a content field value.
    async fn random_by_answer_and_content_value(
        &self,
        category_id: i64,
        answer: &str,
        field: &str,
        value: &str,
        limit: usize,
    ) -> Result<Vec<Exercise>>;
}

/// Append-only sink for graded attempts. The caller owns the surrounding
/// transaction boundary; rows of one submission are appended in display
/// order.
#[async_trait]
pub trait AnswerLog: Send + Sync {
    async fn append(&self, entry: AnswerRecord) -> Result<()>;
}
