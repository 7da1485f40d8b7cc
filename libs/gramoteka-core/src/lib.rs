//! Core task engine for the Gramoteka exam trainer.
//!
//! Provides:
//! - Per-archetype task processors (drill and exam variants)
//! - Exam pool construction under combinatorial constraints
//! - Tolerant answer matching for free-text submissions
//! - The capability traits the engine consumes (exercise selection, answer log)
//! - Shared types (Exercise, Session, TaskPayload, GradeResult, ...)

pub mod error;
pub mod matching;
pub mod rng;
pub mod selection;
pub mod tasks;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Result, TaskError};
pub use matching::{matches, matches_any, MatchOptions};
pub use rng::{FixedSeed, OsSeeded, RngSource};
pub use selection::{AnswerLog, ExerciseSelector};
pub use tasks::{ProcessorRegistry, TaskContext, TaskProcessor};
pub use types::{
    AnswerRecord, ArchetypeTag, Category, Exercise, GradeResult, Session, TaskOption, TaskPayload,
};
