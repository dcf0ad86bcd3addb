#![forbid(unsafe_code)]

pub mod app_services;
pub mod attempts;
pub mod error;
pub mod jobs;
pub mod progression;
pub mod quiz_gen;
pub mod scheduler;

pub use pacer_core::time::Clock;

pub use app_services::AppServices;
pub use attempts::{
    AttemptService, CompleteOutcome, StartOutcome, StartRefusal, SubmitOutcome, SubmitRefusal,
};
pub use error::{
    AppServicesError, AttemptServiceError, JobError, ProgressionError, QuizGenError,
    SchedulerError,
};
pub use jobs::{
    EngagementReminder, LogNotifier, Notifier, StaleAttemptSweep, WeeklyQuizSeeder,
    register_default_jobs,
};
pub use progression::{CurrentPhase, Phase, ProgressSummary, ProgressionService};
pub use quiz_gen::{GeneratedQuiz, QuizGenService};
pub use scheduler::{
    Frequency, HISTORY_CAPACITY, Job, JobReport, RETRY_DELAY_MINUTES, RunOutcome, RunRecord,
    TICK_INTERVAL, TaskScheduler, TaskStatus,
};
