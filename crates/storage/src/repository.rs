use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pacer_core::curriculum::Difficulty;
use pacer_core::model::{
    ActivityKind, ActivityRecord, AnswerRecord, AttemptId, Learner, LearnerId, Material, Question,
    QuestionId, QuestionKind, Quiz, QuizAttempt, QuizId, QuizScope,
};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("stale version")]
    StaleVersion,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── INSERT RECORDS ────────────────────────────────────────────────────────────
//

/// Fields needed to enroll a learner; the backend assigns the id.
#[derive(Debug, Clone)]
pub struct NewLearnerRecord {
    pub name: String,
    pub section: String,
    pub enrolled_at: DateTime<Utc>,
}

/// Fields for a quiz row. Quizzes are always inserted inactive with zero
/// totals; `finalize_quiz` activates them once their questions exist.
#[derive(Debug, Clone)]
pub struct NewQuizRecord {
    pub section: String,
    pub scope: QuizScope,
    pub difficulty: Difficulty,
    pub time_limit_minutes: u32,
    pub max_attempts: u32,
    pub passing_score_percent: u32,
    pub created_at: DateTime<Utc>,
}

/// Fields for one question row of a quiz being built.
#[derive(Debug, Clone)]
pub struct NewQuestionRecord {
    pub quiz_id: QuizId,
    pub text: String,
    pub kind: QuestionKind,
    pub correct_answer: String,
    pub points: u32,
    pub order_index: u32,
    pub difficulty: Difficulty,
}

/// Fields for a fresh attempt; the backend assigns the id and enforces the
/// single-in-progress rule.
#[derive(Debug, Clone)]
pub struct NewAttemptRecord {
    pub learner_id: LearnerId,
    pub quiz_id: QuizId,
    pub started_at: DateTime<Utc>,
    pub attempt_number: u32,
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Learners and their append-only activity ledger.
#[async_trait]
pub trait LearnerRepository: Send + Sync {
    /// Enroll a learner and return the stored row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the learner cannot be stored.
    async fn register_learner(&self, record: &NewLearnerRecord) -> Result<Learner, StorageError>;

    /// Fetch a learner by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_learner(&self, id: LearnerId) -> Result<Learner, StorageError>;

    /// Persist progression fields with an optimistic version check.
    ///
    /// The row is written only when the stored version matches
    /// `learner.version()`; on success the version is bumped and the updated
    /// learner is returned.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::StaleVersion` when another writer advanced the
    /// row first, `StorageError::NotFound` if the learner vanished.
    async fn update_progress(&self, learner: &Learner) -> Result<Learner, StorageError>;

    /// All learners, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_learners(&self) -> Result<Vec<Learner>, StorageError>;

    /// Learners whose last recorded activity is before `cutoff` (or who have
    /// none at all).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn learners_inactive_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Learner>, StorageError>;

    /// Append one ledger entry. Entries are never updated or deleted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the entry cannot be stored.
    async fn append_activity(&self, record: &ActivityRecord) -> Result<(), StorageError>;

    /// Whether the ledger holds at least one entry of `kind` for the
    /// learner's `week`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn has_activity(
        &self,
        learner_id: LearnerId,
        kind: ActivityKind,
        week: u32,
    ) -> Result<bool, StorageError>;

    /// Ledger entries for a learner recorded at or after `since`, newest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn activities_since(
        &self,
        learner_id: LearnerId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityRecord>, StorageError>;
}

/// Quizzes and their questions.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Insert an inactive quiz shell.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a quiz already exists for the
    /// same section and scope.
    async fn insert_quiz(&self, record: &NewQuizRecord) -> Result<QuizId, StorageError>;

    /// Fetch a quiz by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_quiz(&self, id: QuizId) -> Result<Quiz, StorageError>;

    /// Look up the quiz for a section and scope, if one was ever created.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn find_quiz(
        &self,
        section: &str,
        scope: &QuizScope,
    ) -> Result<Option<Quiz>, StorageError>;

    /// Insert one question of a quiz being built.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn insert_question(&self, record: &NewQuestionRecord)
    -> Result<QuestionId, StorageError>;

    /// Fetch a question by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError>;

    /// All questions of a quiz in presentation order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn questions_for_quiz(&self, quiz_id: QuizId) -> Result<Vec<Question>, StorageError>;

    /// Remove all questions of a quiz so a half-built one can be rebuilt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn delete_questions(&self, quiz_id: QuizId) -> Result<(), StorageError>;

    /// Set the totals and activate the quiz in one step, returning the
    /// updated row. Called only after every question has been persisted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the quiz is missing.
    async fn finalize_quiz(
        &self,
        id: QuizId,
        total_questions: u32,
        total_points: u32,
    ) -> Result<Quiz, StorageError>;
}

/// Quiz attempts and submitted answers.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Insert a fresh in-progress attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the learner already has an
    /// in-progress attempt at this quiz; the check and the insert are one
    /// atomic step.
    async fn insert_attempt(&self, record: &NewAttemptRecord)
    -> Result<QuizAttempt, StorageError>;

    /// Fetch an attempt by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_attempt(&self, id: AttemptId) -> Result<QuizAttempt, StorageError>;

    /// Persist an attempt's current state.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the attempt is missing.
    async fn update_attempt(&self, attempt: &QuizAttempt) -> Result<(), StorageError>;

    /// All attempts a learner has made at a quiz, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn attempts_for(
        &self,
        learner_id: LearnerId,
        quiz_id: QuizId,
    ) -> Result<Vec<QuizAttempt>, StorageError>;

    /// Record one submitted answer.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if this question was already
    /// answered within the attempt.
    async fn insert_answer(&self, record: &AnswerRecord) -> Result<(), StorageError>;

    /// All answers recorded for an attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn answers_for_attempt(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Vec<AnswerRecord>, StorageError>;

    /// Every attempt still marked in progress, across all learners.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn in_progress_attempts(&self) -> Result<Vec<QuizAttempt>, StorageError>;
}

/// Authored weekly learning materials.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Store or replace a material by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the material cannot be stored.
    async fn upsert_material(&self, material: &Material) -> Result<(), StorageError>;

    /// Authored materials for a section and week.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn materials(&self, section: &str, week: u32) -> Result<Vec<Material>, StorageError>;

    /// Materials for a section and week, substituting a placeholder when
    /// nothing has been authored yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn materials_or_placeholder(
        &self,
        section: &str,
        week: u32,
    ) -> Result<Vec<Material>, StorageError> {
        let found = self.materials(section, week).await?;
        if found.is_empty() {
            return Ok(vec![Material::placeholder(section, week)]);
        }
        Ok(found)
    }
}

//
// ─── STORAGE AGGREGATE ─────────────────────────────────────────────────────────
//

/// Aggregates all repositories behind trait objects for easy backend
/// swapping.
#[derive(Clone)]
pub struct Storage {
    pub learners: Arc<dyn LearnerRepository>,
    pub quizzes: Arc<dyn QuizRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub content: Arc<dyn ContentRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = crate::memory::InMemoryRepository::new();
        let learners: Arc<dyn LearnerRepository> = Arc::new(repo.clone());
        let quizzes: Arc<dyn QuizRepository> = Arc::new(repo.clone());
        let attempts: Arc<dyn AttemptRepository> = Arc::new(repo.clone());
        let content: Arc<dyn ContentRepository> = Arc::new(repo);
        Self {
            learners,
            quizzes,
            attempts,
            content,
        }
    }
}
