use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::model::ids::{AttemptId, LearnerId, QuestionId, QuizId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("attempt is {status} and cannot transition")]
pub struct AttemptTransitionError {
    pub status: AttemptStatus,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown attempt status: {0}")]
pub struct ParseStatusError(String);

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle of an attempt. Transitions are one-directional:
/// `InProgress` ends in exactly one of `Completed` or `TimedOut`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    InProgress,
    Completed,
    TimedOut,
}

impl AttemptStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::TimedOut => "timed_out",
        }
    }

    /// Parse the storage representation.
    ///
    /// # Errors
    ///
    /// Returns `ParseStatusError` for an unrecognized string.
    pub fn parse(s: &str) -> Result<Self, ParseStatusError> {
        match s {
            "in_progress" => Ok(AttemptStatus::InProgress),
            "completed" => Ok(AttemptStatus::Completed),
            "timed_out" => Ok(AttemptStatus::TimedOut),
            other => Err(ParseStatusError(other.to_owned())),
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// One instance of a learner taking a quiz.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizAttempt {
    id: AttemptId,
    learner_id: LearnerId,
    quiz_id: QuizId,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    status: AttemptStatus,
    attempt_number: u32,
    points_earned: u32,
    score_percent: f64,
    passed: bool,
}

impl QuizAttempt {
    /// A freshly started attempt.
    #[must_use]
    pub fn started(
        id: AttemptId,
        learner_id: LearnerId,
        quiz_id: QuizId,
        started_at: DateTime<Utc>,
        attempt_number: u32,
    ) -> Self {
        Self {
            id,
            learner_id,
            quiz_id,
            started_at,
            ended_at: None,
            status: AttemptStatus::InProgress,
            attempt_number,
            points_earned: 0,
            score_percent: 0.0,
            passed: false,
        }
    }

    /// Rehydrate an attempt from persisted storage.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: AttemptId,
        learner_id: LearnerId,
        quiz_id: QuizId,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
        status: AttemptStatus,
        attempt_number: u32,
        points_earned: u32,
        score_percent: f64,
        passed: bool,
    ) -> Self {
        Self {
            id,
            learner_id,
            quiz_id,
            started_at,
            ended_at,
            status,
            attempt_number,
            points_earned,
            score_percent,
            passed,
        }
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> AttemptId {
        self.id
    }

    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.learner_id
    }

    #[must_use]
    pub fn quiz_id(&self) -> QuizId {
        self.quiz_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    #[must_use]
    pub fn points_earned(&self) -> u32 {
        self.points_earned
    }

    #[must_use]
    pub fn score_percent(&self) -> f64 {
        self.score_percent
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.passed
    }

    /// Wall-clock time spent on this attempt so far.
    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.started_at)
    }

    /// True once the attempt has run past the quiz time limit.
    #[must_use]
    pub fn has_expired(&self, now: DateTime<Utc>, time_limit: Duration) -> bool {
        self.elapsed(now) > time_limit
    }

    /// Transition to `TimedOut`.
    ///
    /// # Errors
    ///
    /// Returns `AttemptTransitionError` unless the attempt is in progress.
    pub fn time_out(&mut self, now: DateTime<Utc>) -> Result<(), AttemptTransitionError> {
        if self.status != AttemptStatus::InProgress {
            return Err(AttemptTransitionError {
                status: self.status,
            });
        }
        self.status = AttemptStatus::TimedOut;
        self.ended_at = Some(now);
        Ok(())
    }

    /// Transition to `Completed` with the aggregated score.
    ///
    /// `score_percent` is derived from `points_earned / total_points`; a
    /// quiz with zero total points scores 0.
    ///
    /// # Errors
    ///
    /// Returns `AttemptTransitionError` unless the attempt is in progress.
    pub fn complete(
        &mut self,
        now: DateTime<Utc>,
        points_earned: u32,
        total_points: u32,
        passing_score_percent: u32,
    ) -> Result<(), AttemptTransitionError> {
        if self.status != AttemptStatus::InProgress {
            return Err(AttemptTransitionError {
                status: self.status,
            });
        }
        let score_percent = if total_points == 0 {
            0.0
        } else {
            f64::from(points_earned) / f64::from(total_points) * 100.0
        };
        self.status = AttemptStatus::Completed;
        self.ended_at = Some(now);
        self.points_earned = points_earned;
        self.score_percent = score_percent;
        self.passed = score_percent >= f64::from(passing_score_percent);
        Ok(())
    }
}

//
// ─── ANSWERS ───────────────────────────────────────────────────────────────────
//

/// Persisted result of one submitted answer within an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    pub attempt_id: AttemptId,
    pub question_id: QuestionId,
    pub submitted: String,
    pub is_correct: bool,
    pub points_earned: u32,
    pub answered_at: DateTime<Utc>,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn attempt() -> QuizAttempt {
        QuizAttempt::started(
            AttemptId::new(1),
            LearnerId::new(2),
            QuizId::new(3),
            fixed_now(),
            1,
        )
    }

    #[test]
    fn status_roundtrips_through_storage_form() {
        for status in [
            AttemptStatus::InProgress,
            AttemptStatus::Completed,
            AttemptStatus::TimedOut,
        ] {
            assert_eq!(AttemptStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn expiry_is_strictly_past_the_limit() {
        let a = attempt();
        let limit = Duration::minutes(5);
        assert!(!a.has_expired(fixed_now() + Duration::minutes(5), limit));
        assert!(a.has_expired(fixed_now() + Duration::minutes(5) + Duration::seconds(1), limit));
    }

    #[test]
    fn complete_computes_score_and_pass() {
        let mut a = attempt();
        let done = fixed_now() + Duration::minutes(2);
        a.complete(done, 7, 10, 70).unwrap();

        assert_eq!(a.status(), AttemptStatus::Completed);
        assert_eq!(a.ended_at(), Some(done));
        assert_eq!(a.points_earned(), 7);
        assert!((a.score_percent() - 70.0).abs() < f64::EPSILON);
        assert!(a.passed());
    }

    #[test]
    fn complete_with_zero_total_points_scores_zero() {
        let mut a = attempt();
        a.complete(fixed_now(), 0, 0, 70).unwrap();
        assert!(!a.passed());
        assert!(a.score_percent().abs() < f64::EPSILON);
    }

    #[test]
    fn terminal_states_refuse_further_transitions() {
        let mut a = attempt();
        a.time_out(fixed_now()).unwrap();
        assert!(a.status().is_terminal());

        let err = a.complete(fixed_now(), 1, 1, 70).unwrap_err();
        assert_eq!(err.status, AttemptStatus::TimedOut);

        let err = a.time_out(fixed_now()).unwrap_err();
        assert_eq!(err.status, AttemptStatus::TimedOut);
    }
}
