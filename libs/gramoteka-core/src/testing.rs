//! In-memory fakes and factories for processor tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::rng::FixedSeed;
use crate::selection::{AnswerLog, ExerciseSelector};
use crate::tasks::TaskContext;
use crate::types::{AnswerRecord, Category, Exercise, Session};

/// Deterministic in-memory selector over a fixed exercise list. Selection
/// order is insertion order; "random" sampling takes the first eligible rows,
/// which keeps constructions reproducible without a seeded shuffle.
#[derive(Default)]
pub struct FakeSelector {
    pub exercises: Vec<Exercise>,
}

impl FakeSelector {
    pub fn new(exercises: Vec<Exercise>) -> Self {
        Self { exercises }
    }

    fn pool(&self, category_id: i64) -> impl Iterator<Item = &Exercise> {
        self.exercises
            .iter()
            .filter(move |e| e.category_id == category_id && e.is_active)
    }

    fn has_field(exercise: &Exercise, field: &str) -> bool {
        exercise
            .content
            .get(field)
            .map(|v| !v.is_null())
            .unwrap_or(false)
    }

    fn field_equals(exercise: &Exercise, field: &str, value: &str) -> bool {
        exercise
            .content
            .get(field)
            .and_then(Value::as_str)
            .map(|v| v == value)
            .unwrap_or(false)
    }
}

#[async_trait]
impl ExerciseSelector for FakeSelector {
    async fn random(&self, category_id: i64, limit: usize) -> Result<Vec<Exercise>> {
        Ok(self.pool(category_id).take(limit).cloned().collect())
    }

    async fn random_with_content_field(
        &self,
        category_id: i64,
        field: &str,
        limit: usize,
    ) -> Result<Vec<Exercise>> {
        Ok(self
            .pool(category_id)
            .filter(|e| Self::has_field(e, field))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn random_distinct_groups(
        &self,
        category_id: i64,
        limit: usize,
        require_field: Option<&str>,
    ) -> Result<Vec<Exercise>> {
        let mut picked: Vec<Exercise> = Vec::new();
        let mut seen_groups: Vec<Uuid> = Vec::new();

        if let Some(field) = require_field {
            let required = match self.pool(category_id).find(|e| Self::has_field(e, field)) {
                Some(e) => e.clone(),
                None => return Ok(Vec::new()),
            };
            if let Some(group) = required.group_id {
                seen_groups.push(group);
            }
            picked.push(required);
        }

        for exercise in self.pool(category_id) {
            if picked.len() >= limit {
                break;
            }
            if picked.iter().any(|p| p.id == exercise.id) {
                continue;
            }
            if let Some(group) = exercise.group_id {
                if seen_groups.contains(&group) {
                    continue;
                }
                seen_groups.push(group);
            }
            picked.push(exercise.clone());
        }
        Ok(picked)
    }

    async fn random_by_answer(
        &self,
        category_id: i64,
        answer: &str,
        limit: usize,
    ) -> Result<Vec<Exercise>> {
        Ok(self
            .pool(category_id)
            .filter(|e| e.answer == answer)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn random_excluding_answer(
        &self,
        category_id: i64,
        answer: &str,
        limit: usize,
    ) -> Result<Vec<Exercise>> {
        Ok(self
            .pool(category_id)
            .filter(|e| e.answer != answer)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn random_with_distinct_answers(
        &self,
        category_id: i64,
        exclude_answer: &str,
        limit: usize,
    ) -> Result<Vec<Exercise>> {
        let mut seen: Vec<String> = Vec::new();
        let mut picked = Vec::new();
        for exercise in self.pool(category_id) {
            if picked.len() >= limit {
                break;
            }
            if exercise.answer == exclude_answer || seen.contains(&exercise.answer) {
                continue;
            }
            seen.push(exercise.answer.clone());
            picked.push(exercise.clone());
        }
        Ok(picked)
    }

    async fn random_same_answer_groups(
        &self,
        category_id: i64,
        group_size: usize,
        num_groups: usize,
    ) -> Result<Vec<Exercise>> {
        let mut answers: Vec<String> = Vec::new();
        for exercise in self.pool(category_id) {
            if !answers.contains(&exercise.answer) {
                answers.push(exercise.answer.clone());
            }
        }
        let mut picked = Vec::new();
        let mut groups = 0;
        for answer in answers {
            if groups >= num_groups {
                break;
            }
            let members: Vec<Exercise> = self
                .pool(category_id)
                .filter(|e| e.answer == answer)
                .take(group_size)
                .cloned()
                .collect();
            if members.len() == group_size {
                picked.extend(members);
                groups += 1;
            }
        }
        Ok(picked)
    }

    async fn random_by_content_value(
        &self,
        category_id: i64,
        field: &str,
        value: &str,
        limit: usize,
    ) -> Result<Vec<Exercise>> {
        Ok(self
            .pool(category_id)
            .filter(|e| Self::field_equals(e, field, value))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn random_by_answer_and_content_value(
        &self,
        category_id: i64,
        answer: &str,
        field: &str,
        value: &str,
        limit: usize,
    ) -> Result<Vec<Exercise>> {
        Ok(self
            .pool(category_id)
            .filter(|e| e.answer == answer && Self::field_equals(e, field, value))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Records appended answers for assertions.
#[derive(Default)]
pub struct RecordingLog {
    pub entries: Mutex<Vec<AnswerRecord>>,
}

impl RecordingLog {
    pub fn take(&self) -> Vec<AnswerRecord> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnswerLog for RecordingLog {
    async fn append(&self, entry: AnswerRecord) -> Result<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

/// Context over a fake selector, recording log and pinned seed.
pub fn fake_ctx(exercises: Vec<Exercise>, seed: u64) -> (TaskContext, Arc<RecordingLog>) {
    let log = Arc::new(RecordingLog::default());
    let ctx = TaskContext::new(
        Arc::new(FakeSelector::new(exercises)),
        log.clone(),
        Arc::new(FixedSeed(seed)),
    );
    (ctx, log)
}

pub fn exercise(id: i64, category_id: i64, content: Value, answer: &str) -> Exercise {
    Exercise {
        id,
        category_id,
        group_id: None,
        content,
        answer: answer.to_string(),
        explanation: format!("объяснение {id}"),
        is_active: true,
    }
}

pub fn grouped(mut ex: Exercise, group: Uuid) -> Exercise {
    ex.group_id = Some(group);
    ex
}

/// Leaf category 10 under parent pool 1.
pub fn leaf_category(archetype: &str) -> Category {
    Category {
        id: 10,
        name: "тренажёр".to_string(),
        archetype: Some(archetype.to_string()),
        parent_id: Some(1),
    }
}

pub fn session(category: Category) -> Session {
    Session {
        user_id: 77,
        category,
        exercises: Vec::new(),
        started_at: None,
        task_config: None,
    }
}

/// Session ready for grading: displayed exercises plus persisted config.
pub fn grading_session(
    category: Category,
    exercises: Vec<Exercise>,
    task_config: Option<Value>,
) -> Session {
    Session {
        user_id: 77,
        category,
        exercises,
        started_at: Some(chrono::Utc::now()),
        task_config,
    }
}
