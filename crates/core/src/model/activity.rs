use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::LearnerId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown activity kind: {0}")]
pub struct ParseActivityError(String);

/// Kinds of completion events recorded in the activity ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    ContentCompleted,
    WeeklyQuizCompleted,
    CumulativeQuizCompleted,
    ReminderSent,
}

impl ActivityKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::ContentCompleted => "content_completed",
            ActivityKind::WeeklyQuizCompleted => "weekly_quiz_completed",
            ActivityKind::CumulativeQuizCompleted => "cumulative_quiz_completed",
            ActivityKind::ReminderSent => "reminder_sent",
        }
    }

    /// Parse the storage representation back into a kind.
    ///
    /// # Errors
    ///
    /// Returns `ParseActivityError` for an unrecognized string.
    pub fn parse(s: &str) -> Result<Self, ParseActivityError> {
        match s {
            "content_completed" => Ok(ActivityKind::ContentCompleted),
            "weekly_quiz_completed" => Ok(ActivityKind::WeeklyQuizCompleted),
            "cumulative_quiz_completed" => Ok(ActivityKind::CumulativeQuizCompleted),
            "reminder_sent" => Ok(ActivityKind::ReminderSent),
            other => Err(ParseActivityError(other.to_owned())),
        }
    }
}

/// One entry in the append-only activity ledger.
///
/// The ledger is the source of truth for phase computation; entries are
/// never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRecord {
    pub learner_id: LearnerId,
    pub kind: ActivityKind,
    pub week: u32,
    pub recorded_at: DateTime<Utc>,
}

impl ActivityRecord {
    #[must_use]
    pub fn new(
        learner_id: LearnerId,
        kind: ActivityKind,
        week: u32,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            learner_id,
            kind,
            week,
            recorded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrips_through_storage_form() {
        for kind in [
            ActivityKind::ContentCompleted,
            ActivityKind::WeeklyQuizCompleted,
            ActivityKind::CumulativeQuizCompleted,
            ActivityKind::ReminderSent,
        ] {
            assert_eq!(ActivityKind::parse(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn parse_rejects_unknown_kind() {
        assert!(ActivityKind::parse("graduated").is_err());
    }
}
