use std::sync::Arc;

use pacer_core::curriculum::CurriculumConfig;
use pacer_core::time::Clock;
use storage::repository::Storage;

use crate::attempts::AttemptService;
use crate::error::AppServicesError;
use crate::jobs::{LogNotifier, Notifier, register_default_jobs};
use crate::progression::ProgressionService;
use crate::quiz_gen::QuizGenService;
use crate::scheduler::TaskScheduler;

/// Assembles the application-facing services over one storage backend.
///
/// Everything is passed in explicitly; there is no global state, so tests
/// can build as many independent instances as they need.
#[derive(Clone)]
pub struct AppServices {
    clock: Clock,
    config: CurriculumConfig,
    storage: Storage,
    progression: Arc<ProgressionService>,
    quiz_gen: Arc<QuizGenService>,
    attempts: Arc<AttemptService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: CurriculumConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::assemble(storage, clock, config))
    }

    /// Build services over in-memory storage.
    #[must_use]
    pub fn new_in_memory(clock: Clock, config: CurriculumConfig) -> Self {
        Self::assemble(Storage::in_memory(), clock, config)
    }

    fn assemble(storage: Storage, clock: Clock, config: CurriculumConfig) -> Self {
        let progression = Arc::new(ProgressionService::new(
            clock,
            config,
            Arc::clone(&storage.learners),
            Arc::clone(&storage.content),
        ));
        let quiz_gen = Arc::new(QuizGenService::new(
            clock,
            config,
            Arc::clone(&storage.quizzes),
        ));
        let attempts = Arc::new(AttemptService::new(
            clock,
            config,
            Arc::clone(&storage.quizzes),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.learners),
        ));

        Self {
            clock,
            config,
            storage,
            progression,
            quiz_gen,
            attempts,
        }
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    #[must_use]
    pub fn config(&self) -> CurriculumConfig {
        self.config
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn progression(&self) -> Arc<ProgressionService> {
        Arc::clone(&self.progression)
    }

    #[must_use]
    pub fn quiz_gen(&self) -> Arc<QuizGenService> {
        Arc::clone(&self.quiz_gen)
    }

    #[must_use]
    pub fn attempts(&self) -> Arc<AttemptService> {
        Arc::clone(&self.attempts)
    }

    /// A scheduler carrying the default maintenance jobs, ready for
    /// `run()` to be spawned.
    pub async fn scheduler(&self) -> Arc<TaskScheduler> {
        self.scheduler_with_notifier(Arc::new(LogNotifier)).await
    }

    /// Same as [`scheduler`](Self::scheduler) with a custom reminder
    /// channel.
    pub async fn scheduler_with_notifier(&self, notifier: Arc<dyn Notifier>) -> Arc<TaskScheduler> {
        let scheduler = Arc::new(TaskScheduler::new(self.clock));
        register_default_jobs(
            &scheduler,
            Arc::clone(&self.attempts),
            Arc::clone(&self.storage.learners),
            Arc::clone(&self.quiz_gen),
            notifier,
        )
        .await;
        scheduler
    }
}
