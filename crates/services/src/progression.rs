//! Phase computation and week advancement.
//!
//! A learner's phase is always derived from the activity ledger, never
//! stored. Advancing is a bounded loop: as long as every requirement of the
//! visible week is in the ledger, the week closes and the next one opens,
//! so a learner returning after a long break settles in one call.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pacer_core::curriculum::{CurriculumConfig, Milestone};
use pacer_core::model::{ActivityKind, ActivityRecord, Learner, LearnerId, Material};
use pacer_core::time::Clock;
use storage::repository::{
    ContentRepository, LearnerRepository, NewLearnerRecord, StorageError,
};
use tracing::{debug, info};

use crate::error::ProgressionError;

/// How far back `progress_summary` looks for recent ledger entries.
const RECENT_ACTIVITY_WINDOW_DAYS: i64 = 30;

/// What the learner should be doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Content { week: u32 },
    WeeklyQuiz { week: u32 },
    CumulativeQuiz { start_week: u32, end_week: u32 },
    Complete,
}

/// A resolved phase together with the week it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentPhase {
    pub week: u32,
    pub phase: Phase,
    pub description: String,
}

impl CurrentPhase {
    fn new(week: u32, phase: Phase) -> Self {
        let description = match phase {
            Phase::Content { week } => format!("Study the week {week} material"),
            Phase::WeeklyQuiz { week } => format!("Take the week {week} quiz"),
            Phase::CumulativeQuiz {
                start_week,
                end_week,
            } => format!("Take the cumulative quiz covering weeks {start_week}-{end_week}"),
            Phase::Complete => "Curriculum complete".to_owned(),
        };
        Self {
            week,
            phase,
            description,
        }
    }
}

/// Point-in-time progress snapshot for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSummary {
    pub learner_id: LearnerId,
    pub name: String,
    pub section: String,
    pub current_week: u32,
    pub completed_weeks: u32,
    pub percent_complete: f64,
    pub cycle: u32,
    pub week_in_cycle: u32,
    pub weeks_remaining: u32,
    pub next_milestone: Milestone,
    pub recent_activity: Vec<ActivityRecord>,
}

/// Drives learners through the paced curriculum.
pub struct ProgressionService {
    clock: Clock,
    config: CurriculumConfig,
    learners: Arc<dyn LearnerRepository>,
    content: Arc<dyn ContentRepository>,
}

impl ProgressionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        config: CurriculumConfig,
        learners: Arc<dyn LearnerRepository>,
        content: Arc<dyn ContentRepository>,
    ) -> Self {
        Self {
            clock,
            config,
            learners,
            content,
        }
    }

    /// Enroll a learner at week one.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError` if the record is invalid or storage fails.
    pub async fn enroll(
        &self,
        name: &str,
        section: &str,
    ) -> Result<Learner, ProgressionError> {
        let learner = self
            .learners
            .register_learner(&NewLearnerRecord {
                name: name.to_owned(),
                section: section.to_owned(),
                enrolled_at: self.clock.now(),
            })
            .await?;
        info!(learner = %learner.id(), section = learner.section(), "enrolled learner");
        Ok(learner)
    }

    /// Resolve the learner's phase, advancing through any weeks whose
    /// requirements are already in the ledger.
    ///
    /// The loop is bounded by the curriculum length; a learner past the
    /// final week is `Complete` and never advances further.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError` on storage failure.
    pub async fn current_phase(
        &self,
        learner_id: LearnerId,
    ) -> Result<CurrentPhase, ProgressionError> {
        let mut learner = self.learners.get_learner(learner_id).await?;

        for _ in 0..=self.config.max_weeks() {
            if learner.completed_weeks() >= self.config.max_weeks() {
                return Ok(CurrentPhase::new(learner.visible_week(), Phase::Complete));
            }

            let week = learner.visible_week();
            if let Some(phase) = self.open_requirement(learner_id, week).await? {
                return Ok(CurrentPhase::new(week, phase));
            }

            // Week fully done: close it and look at the next one. A lost
            // version race means another caller advanced concurrently, so
            // reload and recompute.
            let mut advanced = learner.clone();
            advanced.advance(self.clock.now());
            match self.learners.update_progress(&advanced).await {
                Ok(stored) => {
                    debug!(learner = %learner_id, week, "advanced past completed week");
                    learner = stored;
                }
                Err(StorageError::StaleVersion) => {
                    learner = self.learners.get_learner(learner_id).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(CurrentPhase::new(learner.visible_week(), Phase::Complete))
    }

    /// The first unmet requirement of `week`, or `None` when the week is
    /// fully done.
    async fn open_requirement(
        &self,
        learner_id: LearnerId,
        week: u32,
    ) -> Result<Option<Phase>, ProgressionError> {
        if !self
            .learners
            .has_activity(learner_id, ActivityKind::ContentCompleted, week)
            .await?
        {
            return Ok(Some(Phase::Content { week }));
        }
        if !self
            .learners
            .has_activity(learner_id, ActivityKind::WeeklyQuizCompleted, week)
            .await?
        {
            return Ok(Some(Phase::WeeklyQuiz { week }));
        }
        if self.config.is_cycle_end(week)
            && !self
                .learners
                .has_activity(learner_id, ActivityKind::CumulativeQuizCompleted, week)
                .await?
        {
            return Ok(Some(Phase::CumulativeQuiz {
                start_week: self.config.cycle_start(week),
                end_week: week,
            }));
        }
        Ok(None)
    }

    /// Record that the learner finished this week's material and return the
    /// phase that follows.
    ///
    /// The ledger entry is appended even when one already exists; the phase
    /// computation only asks whether at least one is present.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError` on storage failure.
    pub async fn mark_content_completed(
        &self,
        learner_id: LearnerId,
    ) -> Result<CurrentPhase, ProgressionError> {
        let learner = self.learners.get_learner(learner_id).await?;
        let now = self.clock.now();
        self.learners
            .append_activity(&ActivityRecord::new(
                learner_id,
                ActivityKind::ContentCompleted,
                learner.visible_week(),
                now,
            ))
            .await?;
        self.touch(learner, now).await?;
        self.current_phase(learner_id).await
    }

    /// Materials for one week of the learner's section, substituting a
    /// placeholder when nothing is authored.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError` on storage failure.
    pub async fn week_content(
        &self,
        learner_id: LearnerId,
        week: u32,
    ) -> Result<Vec<Material>, ProgressionError> {
        let learner = self.learners.get_learner(learner_id).await?;
        let materials = self
            .content
            .materials_or_placeholder(learner.section(), week)
            .await?;
        Ok(materials)
    }

    /// Progress snapshot with cycle position, next milestone and recent
    /// ledger entries.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError` on storage failure.
    pub async fn progress_summary(
        &self,
        learner_id: LearnerId,
    ) -> Result<ProgressSummary, ProgressionError> {
        let learner = self.learners.get_learner(learner_id).await?;
        let since = self.clock.now() - Duration::days(RECENT_ACTIVITY_WINDOW_DAYS);
        let recent_activity = self.learners.activities_since(learner_id, since).await?;

        let week = learner.visible_week();
        Ok(ProgressSummary {
            learner_id,
            name: learner.name().to_owned(),
            section: learner.section().to_owned(),
            current_week: learner.current_week(),
            completed_weeks: learner.completed_weeks(),
            percent_complete: self.config.progress_percent(learner.completed_weeks()),
            cycle: self.config.cycle_number(week),
            week_in_cycle: self.config.week_in_cycle(week),
            weeks_remaining: self
                .config
                .max_weeks()
                .saturating_sub(learner.completed_weeks()),
            next_milestone: self.config.next_milestone(week),
            recent_activity,
        })
    }

    /// Refresh the learner's activity timestamp, retrying once on a lost
    /// version race. Losing twice is fine; some other write just touched
    /// the row.
    async fn touch(
        &self,
        mut learner: Learner,
        now: DateTime<Utc>,
    ) -> Result<(), ProgressionError> {
        for _ in 0..2 {
            learner.touch(now);
            match self.learners.update_progress(&learner).await {
                Ok(_) => return Ok(()),
                Err(StorageError::StaleVersion) => {
                    learner = self.learners.get_learner(learner.id()).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacer_core::time::fixed_clock;
    use storage::repository::Storage;

    fn service(storage: &Storage) -> ProgressionService {
        ProgressionService::new(
            fixed_clock(),
            CurriculumConfig::default(),
            Arc::clone(&storage.learners),
            Arc::clone(&storage.content),
        )
    }

    async fn complete_week(storage: &Storage, learner_id: LearnerId, week: u32) {
        let now = pacer_core::time::fixed_now();
        let mut kinds = vec![
            ActivityKind::ContentCompleted,
            ActivityKind::WeeklyQuizCompleted,
        ];
        if CurriculumConfig::default().is_cycle_end(week) {
            kinds.push(ActivityKind::CumulativeQuizCompleted);
        }
        for kind in kinds {
            storage
                .learners
                .append_activity(&ActivityRecord::new(learner_id, kind, week, now))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn fresh_learner_starts_with_week_one_content() {
        let storage = Storage::in_memory();
        let svc = service(&storage);
        let learner = svc.enroll("Amira", "Section A").await.unwrap();

        let phase = svc.current_phase(learner.id()).await.unwrap();
        assert_eq!(phase.phase, Phase::Content { week: 1 });
        assert_eq!(phase.week, 1);
    }

    #[tokio::test]
    async fn weekly_quiz_follows_content() {
        let storage = Storage::in_memory();
        let svc = service(&storage);
        let learner = svc.enroll("Amira", "Section A").await.unwrap();

        let phase = svc.mark_content_completed(learner.id()).await.unwrap();
        assert_eq!(phase.phase, Phase::WeeklyQuiz { week: 1 });
    }

    #[tokio::test]
    async fn cumulative_quiz_is_required_at_the_cycle_boundary() {
        let storage = Storage::in_memory();
        let svc = service(&storage);
        let learner = svc.enroll("Amira", "Section A").await.unwrap();

        // Weeks 1 and 2 close without a cumulative requirement.
        complete_week(&storage, learner.id(), 1).await;
        complete_week(&storage, learner.id(), 2).await;
        storage
            .learners
            .append_activity(&ActivityRecord::new(
                learner.id(),
                ActivityKind::ContentCompleted,
                3,
                pacer_core::time::fixed_now(),
            ))
            .await
            .unwrap();
        storage
            .learners
            .append_activity(&ActivityRecord::new(
                learner.id(),
                ActivityKind::WeeklyQuizCompleted,
                3,
                pacer_core::time::fixed_now(),
            ))
            .await
            .unwrap();

        let phase = svc.current_phase(learner.id()).await.unwrap();
        assert_eq!(
            phase.phase,
            Phase::CumulativeQuiz {
                start_week: 1,
                end_week: 3
            }
        );
        assert_eq!(phase.week, 3);
    }

    #[tokio::test]
    async fn advance_loop_settles_a_returning_learner_in_one_call() {
        let storage = Storage::in_memory();
        let svc = service(&storage);
        let learner = svc.enroll("Amira", "Section A").await.unwrap();

        for week in 1..=4 {
            complete_week(&storage, learner.id(), week).await;
        }

        let phase = svc.current_phase(learner.id()).await.unwrap();
        assert_eq!(phase.phase, Phase::Content { week: 5 });

        let stored = storage.learners.get_learner(learner.id()).await.unwrap();
        assert_eq!(stored.completed_weeks(), 4);
        assert_eq!(stored.current_week(), 5);
    }

    #[tokio::test]
    async fn learner_past_the_final_week_is_complete() {
        let storage = Storage::in_memory();
        let svc = service(&storage);
        let learner = svc.enroll("Amira", "Section A").await.unwrap();

        for week in 1..=CurriculumConfig::default().max_weeks() {
            complete_week(&storage, learner.id(), week).await;
        }

        let phase = svc.current_phase(learner.id()).await.unwrap();
        assert_eq!(phase.phase, Phase::Complete);

        // Repeated calls stay complete and never run past the cap.
        let phase = svc.current_phase(learner.id()).await.unwrap();
        assert_eq!(phase.phase, Phase::Complete);
        let stored = storage.learners.get_learner(learner.id()).await.unwrap();
        assert_eq!(
            stored.completed_weeks(),
            CurriculumConfig::default().max_weeks()
        );
    }

    #[tokio::test]
    async fn week_content_falls_back_to_a_placeholder() {
        let storage = Storage::in_memory();
        let svc = service(&storage);
        let learner = svc.enroll("Amira", "Section A").await.unwrap();

        let materials = svc.week_content(learner.id(), 1).await.unwrap();
        assert_eq!(materials.len(), 1);
        assert!(materials[0].is_placeholder);
    }

    #[tokio::test]
    async fn progress_summary_reports_cycle_position_and_milestone() {
        let storage = Storage::in_memory();
        let svc = service(&storage);
        let learner = svc.enroll("Amira", "Section A").await.unwrap();
        complete_week(&storage, learner.id(), 1).await;
        let _ = svc.current_phase(learner.id()).await.unwrap();

        let summary = svc.progress_summary(learner.id()).await.unwrap();
        assert_eq!(summary.completed_weeks, 1);
        assert_eq!(summary.cycle, 1);
        assert_eq!(summary.week_in_cycle, 2);
        assert_eq!(summary.weeks_remaining, 103);
        assert_eq!(summary.next_milestone.target_week, 3);
        assert!(!summary.recent_activity.is_empty());
    }
}
