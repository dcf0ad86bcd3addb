//! Quiz attempt lifecycle.
//!
//! Eligibility refusals are values, not errors: a learner hitting the
//! attempt cap or an already-open attempt is a normal outcome the caller
//! presents, while storage failures stay in the `Result` error channel.
//! Timeouts are lazy; nothing watches the clock until the attempt is next
//! touched.

use std::sync::Arc;

use pacer_core::curriculum::CurriculumConfig;
use pacer_core::evaluate::{Evaluation, evaluate_answer_with_threshold};
use pacer_core::model::{
    ActivityRecord, AnswerRecord, AttemptId, AttemptStatus, LearnerId, QuestionId, QuizAttempt,
    QuizId,
};
use pacer_core::time::Clock;
use storage::repository::{
    AttemptRepository, LearnerRepository, NewAttemptRecord, QuizRepository, StorageError,
};
use tracing::info;

use crate::error::AttemptServiceError;

/// Why an attempt could not be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRefusal {
    /// The quiz exists but has not been activated yet.
    InactiveQuiz,
    /// The learner has used every allowed attempt.
    MaxAttemptsReached { max_attempts: u32 },
    /// An earlier attempt at this quiz is still open.
    AttemptInProgress,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started(QuizAttempt),
    Refused(StartRefusal),
}

/// Why an answer was not recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRefusal {
    /// The attempt already ended.
    NotInProgress { status: AttemptStatus },
    /// The time limit ran out; the attempt has now been marked timed out.
    TimedOut,
    /// The question belongs to a different quiz.
    QuestionMismatch,
    /// This question was already answered within the attempt.
    AlreadyAnswered,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Recorded(Evaluation),
    Refused(SubmitRefusal),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompleteOutcome {
    Completed(QuizAttempt),
    Refused { status: AttemptStatus },
}

/// Runs attempts from start to a terminal state.
pub struct AttemptService {
    clock: Clock,
    config: CurriculumConfig,
    quizzes: Arc<dyn QuizRepository>,
    attempts: Arc<dyn AttemptRepository>,
    learners: Arc<dyn LearnerRepository>,
}

impl AttemptService {
    #[must_use]
    pub fn new(
        clock: Clock,
        config: CurriculumConfig,
        quizzes: Arc<dyn QuizRepository>,
        attempts: Arc<dyn AttemptRepository>,
        learners: Arc<dyn LearnerRepository>,
    ) -> Self {
        Self {
            clock,
            config,
            quizzes,
            attempts,
            learners,
        }
    }

    /// Start an attempt if the learner is eligible.
    ///
    /// The single-open-attempt rule is enforced by storage at insert time,
    /// so two concurrent starts cannot both succeed.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError` on storage failure; eligibility
    /// problems come back as `StartOutcome::Refused`.
    pub async fn start_attempt(
        &self,
        learner_id: LearnerId,
        quiz_id: QuizId,
    ) -> Result<StartOutcome, AttemptServiceError> {
        let quiz = self.quizzes.get_quiz(quiz_id).await?;
        if !quiz.is_active() {
            return Ok(StartOutcome::Refused(StartRefusal::InactiveQuiz));
        }

        let prior = self.attempts.attempts_for(learner_id, quiz_id).await?;
        let used = u32::try_from(prior.len()).unwrap_or(u32::MAX);
        if used >= quiz.max_attempts() {
            return Ok(StartOutcome::Refused(StartRefusal::MaxAttemptsReached {
                max_attempts: quiz.max_attempts(),
            }));
        }

        let record = NewAttemptRecord {
            learner_id,
            quiz_id,
            started_at: self.clock.now(),
            attempt_number: used + 1,
        };
        match self.attempts.insert_attempt(&record).await {
            Ok(attempt) => {
                info!(
                    attempt = %attempt.id(),
                    learner = %learner_id,
                    quiz = %quiz_id,
                    number = attempt.attempt_number(),
                    "started attempt"
                );
                Ok(StartOutcome::Started(attempt))
            }
            Err(StorageError::Conflict) => {
                Ok(StartOutcome::Refused(StartRefusal::AttemptInProgress))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Grade and record one answer within an open attempt.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError` on storage failure; everything the
    /// learner can cause comes back as `SubmitOutcome::Refused`.
    pub async fn submit_answer(
        &self,
        attempt_id: AttemptId,
        question_id: QuestionId,
        submitted: &str,
    ) -> Result<SubmitOutcome, AttemptServiceError> {
        let mut attempt = self.attempts.get_attempt(attempt_id).await?;
        if attempt.status().is_terminal() {
            return Ok(SubmitOutcome::Refused(SubmitRefusal::NotInProgress {
                status: attempt.status(),
            }));
        }

        let quiz = self.quizzes.get_quiz(attempt.quiz_id()).await?;
        let now = self.clock.now();
        if attempt.has_expired(now, quiz.time_limit()) {
            attempt.time_out(now)?;
            self.attempts.update_attempt(&attempt).await?;
            info!(attempt = %attempt_id, "attempt timed out on submission");
            return Ok(SubmitOutcome::Refused(SubmitRefusal::TimedOut));
        }

        let question = self.quizzes.get_question(question_id).await?;
        if question.quiz_id() != attempt.quiz_id() {
            return Ok(SubmitOutcome::Refused(SubmitRefusal::QuestionMismatch));
        }

        let evaluation = evaluate_answer_with_threshold(
            &question,
            submitted,
            self.config.answer_match_threshold(),
        );
        let record = AnswerRecord {
            attempt_id,
            question_id,
            submitted: submitted.to_owned(),
            is_correct: evaluation.is_correct,
            points_earned: evaluation.points_earned,
            answered_at: now,
        };
        match self.attempts.insert_answer(&record).await {
            Ok(()) => Ok(SubmitOutcome::Recorded(evaluation)),
            Err(StorageError::Conflict) => {
                Ok(SubmitOutcome::Refused(SubmitRefusal::AlreadyAnswered))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Close an open attempt, score it against the quiz totals, and record
    /// the completion in the activity ledger.
    ///
    /// The ledger entry is appended whether the attempt passed or failed;
    /// taking the quiz is what the progression engine requires.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError` on storage failure.
    pub async fn complete_attempt(
        &self,
        attempt_id: AttemptId,
    ) -> Result<CompleteOutcome, AttemptServiceError> {
        let mut attempt = self.attempts.get_attempt(attempt_id).await?;
        if attempt.status().is_terminal() {
            return Ok(CompleteOutcome::Refused {
                status: attempt.status(),
            });
        }

        let quiz = self.quizzes.get_quiz(attempt.quiz_id()).await?;
        let answers = self.attempts.answers_for_attempt(attempt_id).await?;
        let points_earned = answers.iter().map(|a| a.points_earned).sum();

        let now = self.clock.now();
        attempt.complete(
            now,
            points_earned,
            quiz.total_points(),
            quiz.passing_score_percent(),
        )?;
        self.attempts.update_attempt(&attempt).await?;

        let scope = quiz.scope();
        self.learners
            .append_activity(&ActivityRecord::new(
                attempt.learner_id(),
                scope.completion_activity(),
                scope.ledger_week(),
                now,
            ))
            .await?;
        self.touch_learner(attempt.learner_id()).await?;

        info!(
            attempt = %attempt_id,
            score = attempt.score_percent(),
            passed = attempt.passed(),
            "completed attempt"
        );
        Ok(CompleteOutcome::Completed(attempt))
    }

    /// Time out every open attempt that has outlived its quiz's limit.
    /// Returns how many were closed.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError` on storage failure.
    pub async fn sweep_expired(&self) -> Result<u32, AttemptServiceError> {
        let now = self.clock.now();
        let mut closed = 0;
        for mut attempt in self.attempts.in_progress_attempts().await? {
            let quiz = self.quizzes.get_quiz(attempt.quiz_id()).await?;
            if attempt.has_expired(now, quiz.time_limit()) {
                attempt.time_out(now)?;
                self.attempts.update_attempt(&attempt).await?;
                closed += 1;
            }
        }
        if closed > 0 {
            info!(closed, "swept expired attempts");
        }
        Ok(closed)
    }

    async fn touch_learner(&self, learner_id: LearnerId) -> Result<(), AttemptServiceError> {
        let now = self.clock.now();
        for _ in 0..2 {
            let mut learner = self.learners.get_learner(learner_id).await?;
            learner.touch(now);
            match self.learners.update_progress(&learner).await {
                Ok(_) => return Ok(()),
                Err(StorageError::StaleVersion) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz_gen::QuizGenService;
    use chrono::Duration;
    use pacer_core::model::{ActivityKind, QuestionKind};
    use pacer_core::time::{Clock, fixed_now};
    use storage::repository::{NewLearnerRecord, Storage};

    struct Fixture {
        storage: Storage,
        clock: Clock,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                storage: Storage::in_memory(),
                clock: Clock::fixed(fixed_now()),
            }
        }

        fn service(&self) -> AttemptService {
            AttemptService::new(
                self.clock,
                CurriculumConfig::default(),
                Arc::clone(&self.storage.quizzes),
                Arc::clone(&self.storage.attempts),
                Arc::clone(&self.storage.learners),
            )
        }

        async fn learner(&self) -> LearnerId {
            self.storage
                .learners
                .register_learner(&NewLearnerRecord {
                    name: "Amira".into(),
                    section: "Section A".into(),
                    enrolled_at: fixed_now(),
                })
                .await
                .unwrap()
                .id()
        }

        async fn weekly_quiz(&self, week: u32) -> crate::quiz_gen::GeneratedQuiz {
            QuizGenService::new(
                self.clock,
                CurriculumConfig::default(),
                Arc::clone(&self.storage.quizzes),
            )
            .weekly_quiz("Section A", week)
            .await
            .unwrap()
        }
    }

    #[tokio::test]
    async fn full_attempt_passes_and_lands_in_the_ledger() {
        let fx = Fixture::new();
        let svc = fx.service();
        let learner = fx.learner().await;
        let generated = fx.weekly_quiz(1).await;

        let StartOutcome::Started(attempt) = svc
            .start_attempt(learner, generated.quiz.id())
            .await
            .unwrap()
        else {
            panic!("start refused");
        };

        let question = &generated.questions[0];
        let outcome = svc
            .submit_answer(attempt.id(), question.id(), question.correct_answer())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Recorded(Evaluation {
                is_correct: true,
                points_earned: 1
            })
        );

        let CompleteOutcome::Completed(done) =
            svc.complete_attempt(attempt.id()).await.unwrap()
        else {
            panic!("complete refused");
        };
        assert!(done.passed());
        assert!((done.score_percent() - 100.0).abs() < f64::EPSILON);

        assert!(
            fx.storage
                .learners
                .has_activity(learner, ActivityKind::WeeklyQuizCompleted, 1)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn failed_attempt_still_counts_as_taken() {
        let fx = Fixture::new();
        let svc = fx.service();
        let learner = fx.learner().await;
        let generated = fx.weekly_quiz(1).await;

        let StartOutcome::Started(attempt) = svc
            .start_attempt(learner, generated.quiz.id())
            .await
            .unwrap()
        else {
            panic!("start refused");
        };

        // No answers submitted at all.
        let CompleteOutcome::Completed(done) =
            svc.complete_attempt(attempt.id()).await.unwrap()
        else {
            panic!("complete refused");
        };
        assert!(!done.passed());

        assert!(
            fx.storage
                .learners
                .has_activity(learner, ActivityKind::WeeklyQuizCompleted, 1)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn attempt_cap_and_open_attempt_are_refusals() {
        let fx = Fixture::new();
        let svc = fx.service();
        let learner = fx.learner().await;
        let generated = fx.weekly_quiz(1).await;
        let quiz_id = generated.quiz.id();

        let StartOutcome::Started(first) =
            svc.start_attempt(learner, quiz_id).await.unwrap()
        else {
            panic!("start refused");
        };
        assert_eq!(
            svc.start_attempt(learner, quiz_id).await.unwrap(),
            StartOutcome::Refused(StartRefusal::AttemptInProgress)
        );

        svc.complete_attempt(first.id()).await.unwrap();
        let StartOutcome::Started(second) =
            svc.start_attempt(learner, quiz_id).await.unwrap()
        else {
            panic!("second start refused");
        };
        assert_eq!(second.attempt_number(), 2);
        svc.complete_attempt(second.id()).await.unwrap();

        assert_eq!(
            svc.start_attempt(learner, quiz_id).await.unwrap(),
            StartOutcome::Refused(StartRefusal::MaxAttemptsReached { max_attempts: 2 })
        );
    }

    #[tokio::test]
    async fn late_submission_times_the_attempt_out() {
        let fx = Fixture::new();
        let learner = fx.learner().await;
        let generated = fx.weekly_quiz(1).await;

        let svc = fx.service();
        let StartOutcome::Started(attempt) = svc
            .start_attempt(learner, generated.quiz.id())
            .await
            .unwrap()
        else {
            panic!("start refused");
        };

        // Re-read the world six minutes later; the 5-minute limit is gone.
        let late = AttemptService::new(
            Clock::fixed(fixed_now() + Duration::minutes(6)),
            CurriculumConfig::default(),
            Arc::clone(&fx.storage.quizzes),
            Arc::clone(&fx.storage.attempts),
            Arc::clone(&fx.storage.learners),
        );
        let question = &generated.questions[0];
        let outcome = late
            .submit_answer(attempt.id(), question.id(), "A")
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Refused(SubmitRefusal::TimedOut));

        let stored = fx.storage.attempts.get_attempt(attempt.id()).await.unwrap();
        assert_eq!(stored.status(), AttemptStatus::TimedOut);

        // Further submissions and completion are refused.
        let outcome = late
            .submit_answer(attempt.id(), question.id(), "A")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Refused(SubmitRefusal::NotInProgress {
                status: AttemptStatus::TimedOut
            })
        );
        assert_eq!(
            late.complete_attempt(attempt.id()).await.unwrap(),
            CompleteOutcome::Refused {
                status: AttemptStatus::TimedOut
            }
        );
    }

    #[tokio::test]
    async fn cross_quiz_question_and_double_answer_are_refused() {
        let fx = Fixture::new();
        let svc = fx.service();
        let learner = fx.learner().await;
        let week1 = fx.weekly_quiz(1).await;
        let week2 = fx.weekly_quiz(2).await;

        let StartOutcome::Started(attempt) =
            svc.start_attempt(learner, week1.quiz.id()).await.unwrap()
        else {
            panic!("start refused");
        };

        let foreign = &week2.questions[0];
        assert_eq!(
            svc.submit_answer(attempt.id(), foreign.id(), "A")
                .await
                .unwrap(),
            SubmitOutcome::Refused(SubmitRefusal::QuestionMismatch)
        );

        let question = &week1.questions[0];
        svc.submit_answer(attempt.id(), question.id(), "A")
            .await
            .unwrap();
        assert_eq!(
            svc.submit_answer(attempt.id(), question.id(), "B")
                .await
                .unwrap(),
            SubmitOutcome::Refused(SubmitRefusal::AlreadyAnswered)
        );
    }

    #[tokio::test]
    async fn inactive_quiz_cannot_be_started() {
        let fx = Fixture::new();
        let svc = fx.service();
        let learner = fx.learner().await;

        let shell = fx
            .storage
            .quizzes
            .insert_quiz(&storage::repository::NewQuizRecord {
                section: "Section A".into(),
                scope: pacer_core::model::QuizScope::Weekly { week: 9 },
                difficulty: pacer_core::curriculum::Difficulty::Easy,
                time_limit_minutes: 5,
                max_attempts: 2,
                passing_score_percent: 70,
                created_at: fixed_now(),
            })
            .await
            .unwrap();

        assert_eq!(
            svc.start_attempt(learner, shell).await.unwrap(),
            StartOutcome::Refused(StartRefusal::InactiveQuiz)
        );
    }

    #[tokio::test]
    async fn sweep_closes_only_expired_attempts() {
        let fx = Fixture::new();
        let svc = fx.service();
        let learner = fx.learner().await;
        let generated = fx.weekly_quiz(1).await;

        let StartOutcome::Started(attempt) = svc
            .start_attempt(learner, generated.quiz.id())
            .await
            .unwrap()
        else {
            panic!("start refused");
        };

        // Not expired yet.
        assert_eq!(svc.sweep_expired().await.unwrap(), 0);

        let late = AttemptService::new(
            Clock::fixed(fixed_now() + Duration::minutes(6)),
            CurriculumConfig::default(),
            Arc::clone(&fx.storage.quizzes),
            Arc::clone(&fx.storage.attempts),
            Arc::clone(&fx.storage.learners),
        );
        assert_eq!(late.sweep_expired().await.unwrap(), 1);
        let stored = fx.storage.attempts.get_attempt(attempt.id()).await.unwrap();
        assert_eq!(stored.status(), AttemptStatus::TimedOut);
    }

    #[test]
    fn short_answer_matching_uses_the_configured_threshold() {
        // Sanity-check the threshold wiring end to end through the config.
        let config = CurriculumConfig::default();
        assert!((config.answer_match_threshold() - 0.8).abs() < f64::EPSILON);

        let question = pacer_core::model::Question::from_persisted(
            QuestionId::new(1),
            QuizId::new(1),
            "prompt",
            QuestionKind::ShortAnswer,
            "the quick brown fox jumps",
            1,
            0,
            pacer_core::curriculum::Difficulty::Easy,
        )
        .unwrap();
        let eval = evaluate_answer_with_threshold(
            &question,
            "quick brown fox jumps",
            config.answer_match_threshold(),
        );
        assert!(eval.is_correct);
    }
}
