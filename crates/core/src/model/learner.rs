use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::LearnerId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LearnerError {
    #[error("learner name cannot be empty")]
    EmptyName,

    #[error("learner section cannot be empty")]
    EmptySection,

    #[error("current week must be >= 1")]
    WeekBelowOne,

    #[error("completed weeks ({completed}) cannot exceed current week ({current})")]
    CompletedBeyondCurrent { completed: u32, current: u32 },
}

//
// ─── LEARNER ───────────────────────────────────────────────────────────────────
//

/// A learner enrolled in the paced curriculum.
///
/// `current_week` and `completed_weeks` are mutated only by the progression
/// engine's advance step; `version` supports optimistic concurrency at the
/// storage boundary so two concurrent advances cannot both win.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Learner {
    id: LearnerId,
    name: String,
    section: String,
    current_week: u32,
    completed_weeks: u32,
    version: u64,
    enrolled_at: DateTime<Utc>,
    last_activity_at: Option<DateTime<Utc>>,
}

impl Learner {
    /// Creates a newly enrolled learner at week 1 with nothing completed.
    ///
    /// # Errors
    ///
    /// Returns `LearnerError` if name or section is empty or whitespace-only.
    pub fn new(
        id: LearnerId,
        name: impl Into<String>,
        section: impl Into<String>,
        enrolled_at: DateTime<Utc>,
    ) -> Result<Self, LearnerError> {
        Self::from_persisted(id, name, section, 1, 0, 1, enrolled_at, None)
    }

    /// Rehydrate a learner from persisted storage, re-checking invariants.
    ///
    /// # Errors
    ///
    /// Returns `LearnerError` if a field violates the week invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: LearnerId,
        name: impl Into<String>,
        section: impl Into<String>,
        current_week: u32,
        completed_weeks: u32,
        version: u64,
        enrolled_at: DateTime<Utc>,
        last_activity_at: Option<DateTime<Utc>>,
    ) -> Result<Self, LearnerError> {
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(LearnerError::EmptyName);
        }
        let section = section.into().trim().to_owned();
        if section.is_empty() {
            return Err(LearnerError::EmptySection);
        }
        if current_week == 0 {
            return Err(LearnerError::WeekBelowOne);
        }
        if completed_weeks > current_week {
            return Err(LearnerError::CompletedBeyondCurrent {
                completed: completed_weeks,
                current: current_week,
            });
        }

        Ok(Self {
            id,
            name,
            section,
            current_week,
            completed_weeks,
            version,
            enrolled_at,
            last_activity_at,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> LearnerId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn section(&self) -> &str {
        &self.section
    }

    #[must_use]
    pub fn current_week(&self) -> u32 {
        self.current_week
    }

    #[must_use]
    pub fn completed_weeks(&self) -> u32 {
        self.completed_weeks
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn enrolled_at(&self) -> DateTime<Utc> {
        self.enrolled_at
    }

    #[must_use]
    pub fn last_activity_at(&self) -> Option<DateTime<Utc>> {
        self.last_activity_at
    }

    /// The week the learner should actually be working on.
    ///
    /// A learner whose `current_week` ran ahead of what they completed is
    /// held back to the first unfinished week.
    #[must_use]
    pub fn visible_week(&self) -> u32 {
        self.current_week.min(self.completed_weeks + 1)
    }

    /// Advance one week: the current week counts as completed and the next
    /// one opens up.
    ///
    /// Callers are expected to persist the result through an
    /// optimistic-version update; `version` itself is bumped by storage.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.completed_weeks = self.current_week;
        self.current_week += 1;
        self.last_activity_at = Some(now);
    }

    /// Record that the learner did something, for inactivity tracking.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = Some(now);
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
