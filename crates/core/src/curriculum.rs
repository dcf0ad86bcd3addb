use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CurriculumError {
    #[error("weeks per cycle must be > 0")]
    ZeroCycleLength,

    #[error("max weeks must be at least one full cycle")]
    MaxWeeksBelowCycle,

    #[error("cumulative question bounds must satisfy 0 < min <= max")]
    InvalidQuestionBounds,

    #[error("time limits must be > 0 minutes")]
    ZeroTimeLimit,

    #[error("max attempts must be > 0")]
    ZeroMaxAttempts,

    #[error("passing score must be between 1 and 100")]
    InvalidPassingScore,

    #[error("answer match threshold must be in (0, 1]")]
    InvalidMatchThreshold,
}

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown difficulty: {0}")]
pub struct ParseDifficultyError(String);

/// Difficulty ladder a learner climbs over the course of the curriculum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Expert => "expert",
        }
    }

    /// Parse the storage representation.
    ///
    /// # Errors
    ///
    /// Returns `ParseDifficultyError` for an unrecognized string.
    pub fn parse(s: &str) -> Result<Self, ParseDifficultyError> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            "expert" => Ok(Difficulty::Expert),
            other => Err(ParseDifficultyError(other.to_owned())),
        }
    }
}

//
// ─── MILESTONE ─────────────────────────────────────────────────────────────────
//

/// The next cumulative checkpoint ahead of (or at) a given week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milestone {
    pub target_week: u32,
    pub weeks_away: u32,
}

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Pacing parameters for the whole curriculum.
///
/// Defaults model a two-year program: 3-week cycles over 104 weeks, one
/// weekly question, and a 5-10 question cumulative assessment at each
/// cycle boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurriculumConfig {
    weeks_per_cycle: u32,
    max_weeks: u32,
    min_cumulative_questions: u32,
    max_cumulative_questions: u32,
    weekly_time_limit_minutes: u32,
    minutes_per_cumulative_question: u32,
    quiz_max_attempts: u32,
    passing_score_percent: u32,
    answer_match_threshold: f64,
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        Self {
            weeks_per_cycle: 3,
            max_weeks: 104,
            min_cumulative_questions: 5,
            max_cumulative_questions: 10,
            weekly_time_limit_minutes: 5,
            minutes_per_cumulative_question: 3,
            quiz_max_attempts: 2,
            passing_score_percent: 70,
            answer_match_threshold: 0.8,
        }
    }
}

impl CurriculumConfig {
    /// Creates a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError` if any parameter is out of range.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        weeks_per_cycle: u32,
        max_weeks: u32,
        min_cumulative_questions: u32,
        max_cumulative_questions: u32,
        weekly_time_limit_minutes: u32,
        minutes_per_cumulative_question: u32,
        quiz_max_attempts: u32,
        passing_score_percent: u32,
        answer_match_threshold: f64,
    ) -> Result<Self, CurriculumError> {
        if weeks_per_cycle == 0 {
            return Err(CurriculumError::ZeroCycleLength);
        }
        if max_weeks < weeks_per_cycle {
            return Err(CurriculumError::MaxWeeksBelowCycle);
        }
        if min_cumulative_questions == 0 || min_cumulative_questions > max_cumulative_questions {
            return Err(CurriculumError::InvalidQuestionBounds);
        }
        if weekly_time_limit_minutes == 0 || minutes_per_cumulative_question == 0 {
            return Err(CurriculumError::ZeroTimeLimit);
        }
        if quiz_max_attempts == 0 {
            return Err(CurriculumError::ZeroMaxAttempts);
        }
        if !(1..=100).contains(&passing_score_percent) {
            return Err(CurriculumError::InvalidPassingScore);
        }
        if !answer_match_threshold.is_finite()
            || answer_match_threshold <= 0.0
            || answer_match_threshold > 1.0
        {
            return Err(CurriculumError::InvalidMatchThreshold);
        }

        Ok(Self {
            weeks_per_cycle,
            max_weeks,
            min_cumulative_questions,
            max_cumulative_questions,
            weekly_time_limit_minutes,
            minutes_per_cumulative_question,
            quiz_max_attempts,
            passing_score_percent,
            answer_match_threshold,
        })
    }

    // Accessors
    #[must_use]
    pub fn weeks_per_cycle(&self) -> u32 {
        self.weeks_per_cycle
    }

    #[must_use]
    pub fn max_weeks(&self) -> u32 {
        self.max_weeks
    }

    #[must_use]
    pub fn min_cumulative_questions(&self) -> u32 {
        self.min_cumulative_questions
    }

    #[must_use]
    pub fn max_cumulative_questions(&self) -> u32 {
        self.max_cumulative_questions
    }

    #[must_use]
    pub fn weekly_time_limit_minutes(&self) -> u32 {
        self.weekly_time_limit_minutes
    }

    #[must_use]
    pub fn quiz_max_attempts(&self) -> u32 {
        self.quiz_max_attempts
    }

    #[must_use]
    pub fn passing_score_percent(&self) -> u32 {
        self.passing_score_percent
    }

    #[must_use]
    pub fn answer_match_threshold(&self) -> f64 {
        self.answer_match_threshold
    }

    /// True when `week` closes a cycle and a cumulative quiz is due.
    #[must_use]
    pub fn is_cycle_end(&self, week: u32) -> bool {
        week > 0 && week % self.weeks_per_cycle == 0
    }

    /// First week of the cycle ending at `end_week`.
    #[must_use]
    pub fn cycle_start(&self, end_week: u32) -> u32 {
        end_week.saturating_sub(self.weeks_per_cycle - 1).max(1)
    }

    /// 1-based cycle number for a week.
    #[must_use]
    pub fn cycle_number(&self, week: u32) -> u32 {
        (week.max(1) - 1) / self.weeks_per_cycle + 1
    }

    /// 1-based position of a week inside its cycle.
    #[must_use]
    pub fn week_in_cycle(&self, week: u32) -> u32 {
        (week.max(1) - 1) % self.weeks_per_cycle + 1
    }

    /// Number of questions on the cumulative quiz ending at `end_week`,
    /// scaling with progress but clamped to the configured bounds.
    #[must_use]
    pub fn cumulative_question_count(&self, end_week: u32) -> u32 {
        (end_week / 2).clamp(self.min_cumulative_questions, self.max_cumulative_questions)
    }

    /// Time limit for a cumulative quiz with the given question count.
    #[must_use]
    pub fn cumulative_time_limit_minutes(&self, question_count: u32) -> u32 {
        question_count * self.minutes_per_cumulative_question
    }

    /// Difficulty tier a week's questions are generated at.
    #[must_use]
    pub fn difficulty_for_week(&self, week: u32) -> Difficulty {
        match week {
            0..=10 => Difficulty::Easy,
            11..=30 => Difficulty::Medium,
            31..=60 => Difficulty::Hard,
            _ => Difficulty::Expert,
        }
    }

    /// The next cumulative checkpoint at or after `current_week`.
    #[must_use]
    pub fn next_milestone(&self, current_week: u32) -> Milestone {
        let week = current_week.max(1);
        if self.is_cycle_end(week) {
            return Milestone {
                target_week: week,
                weeks_away: 0,
            };
        }
        let weeks_away = self.weeks_per_cycle - week % self.weeks_per_cycle;
        Milestone {
            target_week: week + weeks_away,
            weeks_away,
        }
    }

    /// Share of the curriculum completed, in percent.
    #[must_use]
    pub fn progress_percent(&self, completed_weeks: u32) -> f64 {
        f64::from(completed_weeks.min(self.max_weeks)) / f64::from(self.max_weeks) * 100.0
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
