//! Maintenance jobs run by the task scheduler.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use pacer_core::model::{ActivityKind, ActivityRecord, Learner};
use serde_json::json;
use storage::repository::LearnerRepository;
use tracing::info;

use crate::attempts::AttemptService;
use crate::error::JobError;
use crate::quiz_gen::QuizGenService;
use crate::scheduler::{Frequency, Job, JobReport, TaskScheduler};

/// Days without activity before a learner gets a reminder.
const IDLE_DAYS: i64 = 3;

/// Delivery channel for learner reminders.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message to a learner.
    ///
    /// # Errors
    ///
    /// Returns `JobError` if delivery fails.
    async fn notify(&self, learner: &Learner, message: &str) -> Result<(), JobError>;
}

/// Notifier that only writes to the log. Stands in until a real channel
/// is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, learner: &Learner, message: &str) -> Result<(), JobError> {
        info!(learner = %learner.id(), name = learner.name(), message, "reminder");
        Ok(())
    }
}

//
// ─── STALE ATTEMPT SWEEP ───────────────────────────────────────────────────────
//

/// Times out open attempts that outlived their quiz's limit, so the lazy
/// timeout check is not the only thing closing abandoned attempts.
pub struct StaleAttemptSweep {
    attempts: Arc<AttemptService>,
}

impl StaleAttemptSweep {
    #[must_use]
    pub fn new(attempts: Arc<AttemptService>) -> Self {
        Self { attempts }
    }
}

#[async_trait]
impl Job for StaleAttemptSweep {
    async fn run(&self, _now: DateTime<Utc>) -> Result<JobReport, JobError> {
        let closed = self
            .attempts
            .sweep_expired()
            .await
            .map_err(|e| JobError::Failed(e.to_string()))?;
        Ok(JobReport::with_detail(
            format!("timed out {closed} stale attempts"),
            json!({ "closed": closed }),
        ))
    }
}

//
// ─── ENGAGEMENT REMINDER ───────────────────────────────────────────────────────
//

/// Nudges learners with no activity for a few days and records the nudge
/// in the ledger.
pub struct EngagementReminder {
    learners: Arc<dyn LearnerRepository>,
    notifier: Arc<dyn Notifier>,
}

impl EngagementReminder {
    #[must_use]
    pub fn new(learners: Arc<dyn LearnerRepository>, notifier: Arc<dyn Notifier>) -> Self {
        Self { learners, notifier }
    }
}

#[async_trait]
impl Job for EngagementReminder {
    async fn run(&self, now: DateTime<Utc>) -> Result<JobReport, JobError> {
        let cutoff = now - Duration::days(IDLE_DAYS);
        let idle = self.learners.learners_inactive_since(cutoff).await?;
        let mut reminded = 0;
        for learner in &idle {
            let week = learner.visible_week();
            let message =
                format!("You have been away for a few days. Week {week} is waiting for you.");
            self.notifier.notify(learner, &message).await?;
            self.learners
                .append_activity(&ActivityRecord::new(
                    learner.id(),
                    ActivityKind::ReminderSent,
                    week,
                    now,
                ))
                .await?;
            reminded += 1;
        }
        Ok(JobReport::with_detail(
            format!("reminded {reminded} idle learners"),
            json!({ "reminded": reminded }),
        ))
    }
}

//
// ─── WEEKLY QUIZ SEEDER ────────────────────────────────────────────────────────
//

/// Pre-materializes the quizzes learners will hit next, so the first
/// learner of the week never waits on generation. Cumulative quizzes are
/// seeded when the visible week closes a cycle.
pub struct WeeklyQuizSeeder {
    learners: Arc<dyn LearnerRepository>,
    quiz_gen: Arc<QuizGenService>,
}

impl WeeklyQuizSeeder {
    #[must_use]
    pub fn new(learners: Arc<dyn LearnerRepository>, quiz_gen: Arc<QuizGenService>) -> Self {
        Self { learners, quiz_gen }
    }
}

#[async_trait]
impl Job for WeeklyQuizSeeder {
    async fn run(&self, _now: DateTime<Utc>) -> Result<JobReport, JobError> {
        let learners = self.learners.list_learners().await?;
        let mut seen: HashSet<(String, u32)> = HashSet::new();
        let mut seeded = 0;
        for learner in learners {
            let week = learner.visible_week();
            if !seen.insert((learner.section().to_owned(), week)) {
                continue;
            }
            self.quiz_gen
                .weekly_quiz(learner.section(), week)
                .await
                .map_err(|e| JobError::Failed(e.to_string()))?;
            seeded += 1;
            if let Err(e) = self.quiz_gen.cumulative_quiz(learner.section(), week).await {
                // Mid-cycle weeks simply have no cumulative quiz to seed.
                if !matches!(e, crate::error::QuizGenError::NotCycleBoundary { .. }) {
                    return Err(JobError::Failed(e.to_string()));
                }
            } else {
                seeded += 1;
            }
        }
        Ok(JobReport::with_detail(
            format!("seeded {seeded} quizzes"),
            json!({ "seeded": seeded }),
        ))
    }
}

/// Wire the default maintenance schedule: an hourly attempt sweep and
/// daily reminder and seeder passes.
pub async fn register_default_jobs(
    scheduler: &TaskScheduler,
    attempts: Arc<AttemptService>,
    learners: Arc<dyn LearnerRepository>,
    quiz_gen: Arc<QuizGenService>,
    notifier: Arc<dyn Notifier>,
) {
    scheduler
        .register(
            "stale-attempt-sweep",
            Frequency::Every { minutes: 60 },
            3,
            Arc::new(StaleAttemptSweep::new(attempts)),
        )
        .await;
    scheduler
        .register(
            "engagement-reminder",
            Frequency::Daily,
            3,
            Arc::new(EngagementReminder::new(Arc::clone(&learners), notifier)),
        )
        .await;
    scheduler
        .register(
            "weekly-quiz-seeder",
            Frequency::Daily,
            3,
            Arc::new(WeeklyQuizSeeder::new(learners, quiz_gen)),
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacer_core::curriculum::CurriculumConfig;
    use pacer_core::model::QuizScope;
    use pacer_core::time::{Clock, fixed_clock, fixed_now};
    use storage::repository::{NewLearnerRecord, Storage};

    async fn enroll(storage: &Storage, name: &str, section: &str) -> Learner {
        storage
            .learners
            .register_learner(&NewLearnerRecord {
                name: name.into(),
                section: section.into(),
                enrolled_at: fixed_now(),
            })
            .await
            .unwrap()
    }

    fn quiz_gen(storage: &Storage, clock: Clock) -> Arc<QuizGenService> {
        Arc::new(QuizGenService::new(
            clock,
            CurriculumConfig::default(),
            Arc::clone(&storage.quizzes),
        ))
    }

    #[tokio::test]
    async fn reminder_touches_only_idle_learners() {
        let storage = Storage::in_memory();
        let idle = enroll(&storage, "Idle", "Section A").await;

        // An active learner was seen an hour ago.
        let mut active = enroll(&storage, "Active", "Section A").await;
        active.touch(fixed_now() + Duration::days(4) - Duration::hours(1));
        storage.learners.update_progress(&active).await.unwrap();

        let job = EngagementReminder::new(
            Arc::clone(&storage.learners),
            Arc::new(LogNotifier),
        );
        let now = fixed_now() + Duration::days(4);
        let report = job.run(now).await.unwrap();
        assert_eq!(report.summary, "reminded 1 idle learners");

        assert!(
            storage
                .learners
                .has_activity(idle.id(), ActivityKind::ReminderSent, 1)
                .await
                .unwrap()
        );
        assert!(
            !storage
                .learners
                .has_activity(active.id(), ActivityKind::ReminderSent, 1)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn seeder_deduplicates_sections_on_the_same_week() {
        let storage = Storage::in_memory();
        enroll(&storage, "One", "Section A").await;
        enroll(&storage, "Two", "Section A").await;
        enroll(&storage, "Three", "Section B").await;

        let job = WeeklyQuizSeeder::new(
            Arc::clone(&storage.learners),
            quiz_gen(&storage, fixed_clock()),
        );
        let report = job.run(fixed_now()).await.unwrap();
        // Two distinct (section, week) pairs, both mid-cycle week 1.
        assert_eq!(report.summary, "seeded 2 quizzes");

        assert!(
            storage
                .quizzes
                .find_quiz("Section A", &QuizScope::Weekly { week: 1 })
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            storage
                .quizzes
                .find_quiz("Section B", &QuizScope::Weekly { week: 1 })
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn seeder_adds_the_cumulative_quiz_at_a_cycle_boundary() {
        let storage = Storage::in_memory();
        let learner = enroll(&storage, "One", "Section A").await;

        // Move the learner to week 3, the end of the first cycle.
        let mut at_three = learner;
        at_three.advance(fixed_now());
        let mut at_three = storage.learners.update_progress(&at_three).await.unwrap();
        at_three.advance(fixed_now());
        storage.learners.update_progress(&at_three).await.unwrap();

        let job = WeeklyQuizSeeder::new(
            Arc::clone(&storage.learners),
            quiz_gen(&storage, fixed_clock()),
        );
        let report = job.run(fixed_now()).await.unwrap();
        assert_eq!(report.summary, "seeded 2 quizzes");

        assert!(
            storage
                .quizzes
                .find_quiz(
                    "Section A",
                    &QuizScope::Cumulative {
                        start_week: 1,
                        end_week: 3
                    }
                )
                .await
                .unwrap()
                .is_some()
        );
    }
}
