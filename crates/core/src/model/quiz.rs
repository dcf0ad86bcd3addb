use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::curriculum::Difficulty;
use crate::model::activity::ActivityKind;
use crate::model::ids::QuizId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("quiz section cannot be empty")]
    EmptySection,

    #[error("quiz week numbers must be >= 1")]
    WeekBelowOne,

    #[error("cumulative range start ({start}) must not exceed end ({end})")]
    InvalidWeekRange { start: u32, end: u32 },

    #[error("time limit must be > 0 minutes")]
    ZeroTimeLimit,

    #[error("max attempts must be > 0")]
    ZeroMaxAttempts,

    #[error("passing score must be between 1 and 100, got {0}")]
    PassingScoreOutOfRange(u32),
}

//
// ─── SCOPE ─────────────────────────────────────────────────────────────────────
//

/// What a quiz covers: a single week or a closed cumulative range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuizScope {
    Weekly { week: u32 },
    Cumulative { start_week: u32, end_week: u32 },
}

impl QuizScope {
    /// Validate week numbers.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` for zero weeks or an inverted range.
    pub fn validate(&self) -> Result<(), QuizError> {
        match *self {
            QuizScope::Weekly { week } => {
                if week == 0 {
                    return Err(QuizError::WeekBelowOne);
                }
            }
            QuizScope::Cumulative {
                start_week,
                end_week,
            } => {
                if start_week == 0 {
                    return Err(QuizError::WeekBelowOne);
                }
                if start_week > end_week {
                    return Err(QuizError::InvalidWeekRange {
                        start: start_week,
                        end: end_week,
                    });
                }
            }
        }
        Ok(())
    }

    /// Stable key making a quiz unique within its section.
    #[must_use]
    pub fn storage_key(&self) -> String {
        match *self {
            QuizScope::Weekly { week } => format!("weekly:{week}"),
            QuizScope::Cumulative {
                start_week,
                end_week,
            } => format!("cumulative:{start_week}-{end_week}"),
        }
    }

    /// The week under which completion of this quiz is recorded in the
    /// ledger: the week itself, or the end of a cumulative range.
    #[must_use]
    pub fn ledger_week(&self) -> u32 {
        match *self {
            QuizScope::Weekly { week } => week,
            QuizScope::Cumulative { end_week, .. } => end_week,
        }
    }

    /// The ledger event appended when an attempt at this quiz completes.
    #[must_use]
    pub fn completion_activity(&self) -> ActivityKind {
        match self {
            QuizScope::Weekly { .. } => ActivityKind::WeeklyQuizCompleted,
            QuizScope::Cumulative { .. } => ActivityKind::CumulativeQuizCompleted,
        }
    }
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

/// An assessment materialized once per (section, scope).
///
/// A quiz is created inactive with zero totals; `total_questions`,
/// `total_points` and `is_active` are set together only after every
/// question has been persisted, so a half-built quiz is never offered.
#[derive(Debug, Clone, PartialEq)]
pub struct Quiz {
    id: QuizId,
    section: String,
    scope: QuizScope,
    difficulty: Difficulty,
    time_limit_minutes: u32,
    max_attempts: u32,
    passing_score_percent: u32,
    total_questions: u32,
    total_points: u32,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl Quiz {
    /// Rehydrate a quiz from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` if any field is out of range.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: QuizId,
        section: impl Into<String>,
        scope: QuizScope,
        difficulty: Difficulty,
        time_limit_minutes: u32,
        max_attempts: u32,
        passing_score_percent: u32,
        total_questions: u32,
        total_points: u32,
        is_active: bool,
        created_at: DateTime<Utc>,
    ) -> Result<Self, QuizError> {
        let section = section.into().trim().to_owned();
        if section.is_empty() {
            return Err(QuizError::EmptySection);
        }
        scope.validate()?;
        if time_limit_minutes == 0 {
            return Err(QuizError::ZeroTimeLimit);
        }
        if max_attempts == 0 {
            return Err(QuizError::ZeroMaxAttempts);
        }
        if !(1..=100).contains(&passing_score_percent) {
            return Err(QuizError::PassingScoreOutOfRange(passing_score_percent));
        }

        Ok(Self {
            id,
            section,
            scope,
            difficulty,
            time_limit_minutes,
            max_attempts,
            passing_score_percent,
            total_questions,
            total_points,
            is_active,
            created_at,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> QuizId {
        self.id
    }

    #[must_use]
    pub fn section(&self) -> &str {
        &self.section
    }

    #[must_use]
    pub fn scope(&self) -> QuizScope {
        self.scope
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn time_limit_minutes(&self) -> u32 {
        self.time_limit_minutes
    }

    #[must_use]
    pub fn time_limit(&self) -> Duration {
        Duration::minutes(i64::from(self.time_limit_minutes))
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn passing_score_percent(&self) -> u32 {
        self.passing_score_percent
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn total_points(&self) -> u32 {
        self.total_points
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn weekly(week: u32) -> Quiz {
        Quiz::from_persisted(
            QuizId::new(1),
            "Section A",
            QuizScope::Weekly { week },
            Difficulty::Easy,
            5,
            2,
            70,
            1,
            1,
            true,
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn scope_storage_keys_are_distinct() {
        let w = QuizScope::Weekly { week: 3 };
        let c = QuizScope::Cumulative {
            start_week: 1,
            end_week: 3,
        };
        assert_eq!(w.storage_key(), "weekly:3");
        assert_eq!(c.storage_key(), "cumulative:1-3");
        assert_ne!(w.storage_key(), c.storage_key());
    }

    #[test]
    fn scope_ledger_week_uses_range_end() {
        let c = QuizScope::Cumulative {
            start_week: 4,
            end_week: 6,
        };
        assert_eq!(c.ledger_week(), 6);
        assert_eq!(
            c.completion_activity(),
            ActivityKind::CumulativeQuizCompleted
        );
    }

    #[test]
    fn scope_rejects_inverted_range() {
        let err = QuizScope::Cumulative {
            start_week: 5,
            end_week: 3,
        }
        .validate()
        .unwrap_err();
        assert_eq!(err, QuizError::InvalidWeekRange { start: 5, end: 3 });
    }

    #[test]
    fn quiz_time_limit_converts_to_duration() {
        assert_eq!(weekly(1).time_limit(), Duration::minutes(5));
    }

    #[test]
    fn quiz_rejects_out_of_range_passing_score() {
        let err = Quiz::from_persisted(
            QuizId::new(1),
            "A",
            QuizScope::Weekly { week: 1 },
            Difficulty::Easy,
            5,
            2,
            0,
            0,
            0,
            false,
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, QuizError::PassingScoreOutOfRange(0));
    }
}
