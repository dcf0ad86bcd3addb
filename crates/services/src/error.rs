//! Shared error types for the services crate.

use thiserror::Error;

use pacer_core::model::{AttemptTransitionError, LearnerError, QuizError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressionError {
    #[error(transparent)]
    Learner(#[from] LearnerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `QuizGenService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizGenError {
    #[error("week {week} does not close a cycle")]
    NotCycleBoundary { week: u32 },
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AttemptService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttemptServiceError {
    #[error(transparent)]
    Transition(#[from] AttemptTransitionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors a scheduled job can fail with.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JobError {
    #[error("job failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by the task scheduler's out-of-band operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchedulerError {
    #[error("unknown task: {0}")]
    UnknownTask(String),
    #[error(transparent)]
    Job(#[from] JobError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
