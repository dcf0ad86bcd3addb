//! In-memory backend for tests and prototyping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pacer_core::model::{
    ActivityKind, ActivityRecord, AnswerRecord, AttemptId, AttemptStatus, Learner, LearnerId,
    Material, Question, QuestionId, Quiz, QuizAttempt, QuizId, QuizScope,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::repository::{
    AttemptRepository, ContentRepository, LearnerRepository, NewAttemptRecord, NewLearnerRecord,
    NewQuestionRecord, NewQuizRecord, QuizRepository, StorageError,
};

#[derive(Default)]
struct Inner {
    learners: HashMap<LearnerId, Learner>,
    activities: Vec<ActivityRecord>,
    quizzes: HashMap<QuizId, Quiz>,
    questions: HashMap<QuestionId, Question>,
    attempts: HashMap<AttemptId, QuizAttempt>,
    answers: Vec<AnswerRecord>,
    materials: HashMap<String, Material>,
    next_id: u64,
}

impl Inner {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Simple in-memory repository implementation backing all four contracts.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StorageError> {
        self.inner
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

#[async_trait]
impl LearnerRepository for InMemoryRepository {
    async fn register_learner(&self, record: &NewLearnerRecord) -> Result<Learner, StorageError> {
        let mut guard = self.lock()?;
        let id = LearnerId::new(guard.allocate_id());
        let learner = Learner::new(id, &record.name, &record.section, record.enrolled_at)
            .map_err(ser)?;
        guard.learners.insert(id, learner.clone());
        Ok(learner)
    }

    async fn get_learner(&self, id: LearnerId) -> Result<Learner, StorageError> {
        let guard = self.lock()?;
        guard.learners.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn update_progress(&self, learner: &Learner) -> Result<Learner, StorageError> {
        let mut guard = self.lock()?;
        let stored = guard
            .learners
            .get(&learner.id())
            .ok_or(StorageError::NotFound)?;
        if stored.version() != learner.version() {
            return Err(StorageError::StaleVersion);
        }
        let bumped = Learner::from_persisted(
            learner.id(),
            learner.name(),
            learner.section(),
            learner.current_week(),
            learner.completed_weeks(),
            learner.version() + 1,
            learner.enrolled_at(),
            learner.last_activity_at(),
        )
        .map_err(ser)?;
        guard.learners.insert(learner.id(), bumped.clone());
        Ok(bumped)
    }

    async fn list_learners(&self) -> Result<Vec<Learner>, StorageError> {
        let guard = self.lock()?;
        let mut all: Vec<Learner> = guard.learners.values().cloned().collect();
        all.sort_by_key(Learner::id);
        Ok(all)
    }

    async fn learners_inactive_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Learner>, StorageError> {
        let guard = self.lock()?;
        let mut idle: Vec<Learner> = guard
            .learners
            .values()
            .filter(|l| l.last_activity_at().is_none_or(|at| at < cutoff))
            .cloned()
            .collect();
        idle.sort_by_key(Learner::id);
        Ok(idle)
    }

    async fn append_activity(&self, record: &ActivityRecord) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.activities.push(record.clone());
        Ok(())
    }

    async fn has_activity(
        &self,
        learner_id: LearnerId,
        kind: ActivityKind,
        week: u32,
    ) -> Result<bool, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .activities
            .iter()
            .any(|a| a.learner_id == learner_id && a.kind == kind && a.week == week))
    }

    async fn activities_since(
        &self,
        learner_id: LearnerId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityRecord>, StorageError> {
        let guard = self.lock()?;
        let mut found: Vec<ActivityRecord> = guard
            .activities
            .iter()
            .filter(|a| a.learner_id == learner_id && a.recorded_at >= since)
            .cloned()
            .collect();
        found.sort_by_key(|a| std::cmp::Reverse(a.recorded_at));
        Ok(found)
    }
}

#[async_trait]
impl QuizRepository for InMemoryRepository {
    async fn insert_quiz(&self, record: &NewQuizRecord) -> Result<QuizId, StorageError> {
        let mut guard = self.lock()?;
        let key = record.scope.storage_key();
        if guard
            .quizzes
            .values()
            .any(|q| q.section() == record.section && q.scope().storage_key() == key)
        {
            return Err(StorageError::Conflict);
        }
        let id = QuizId::new(guard.allocate_id());
        let quiz = Quiz::from_persisted(
            id,
            &record.section,
            record.scope,
            record.difficulty,
            record.time_limit_minutes,
            record.max_attempts,
            record.passing_score_percent,
            0,
            0,
            false,
            record.created_at,
        )
        .map_err(ser)?;
        guard.quizzes.insert(id, quiz);
        Ok(id)
    }

    async fn get_quiz(&self, id: QuizId) -> Result<Quiz, StorageError> {
        let guard = self.lock()?;
        guard.quizzes.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn find_quiz(
        &self,
        section: &str,
        scope: &QuizScope,
    ) -> Result<Option<Quiz>, StorageError> {
        let guard = self.lock()?;
        let key = scope.storage_key();
        Ok(guard
            .quizzes
            .values()
            .find(|q| q.section() == section && q.scope().storage_key() == key)
            .cloned())
    }

    async fn insert_question(
        &self,
        record: &NewQuestionRecord,
    ) -> Result<QuestionId, StorageError> {
        let mut guard = self.lock()?;
        if !guard.quizzes.contains_key(&record.quiz_id) {
            return Err(StorageError::NotFound);
        }
        let id = QuestionId::new(guard.allocate_id());
        let question = Question::from_persisted(
            id,
            record.quiz_id,
            &record.text,
            record.kind.clone(),
            &record.correct_answer,
            record.points,
            record.order_index,
            record.difficulty,
        )
        .map_err(ser)?;
        guard.questions.insert(id, question);
        Ok(id)
    }

    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError> {
        let guard = self.lock()?;
        guard
            .questions
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn questions_for_quiz(&self, quiz_id: QuizId) -> Result<Vec<Question>, StorageError> {
        let guard = self.lock()?;
        let mut found: Vec<Question> = guard
            .questions
            .values()
            .filter(|q| q.quiz_id() == quiz_id)
            .cloned()
            .collect();
        found.sort_by_key(Question::order_index);
        Ok(found)
    }

    async fn delete_questions(&self, quiz_id: QuizId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.questions.retain(|_, q| q.quiz_id() != quiz_id);
        Ok(())
    }

    async fn finalize_quiz(
        &self,
        id: QuizId,
        total_questions: u32,
        total_points: u32,
    ) -> Result<Quiz, StorageError> {
        let mut guard = self.lock()?;
        let stored = guard.quizzes.get(&id).ok_or(StorageError::NotFound)?;
        let finalized = Quiz::from_persisted(
            stored.id(),
            stored.section(),
            stored.scope(),
            stored.difficulty(),
            stored.time_limit_minutes(),
            stored.max_attempts(),
            stored.passing_score_percent(),
            total_questions,
            total_points,
            true,
            stored.created_at(),
        )
        .map_err(ser)?;
        guard.quizzes.insert(id, finalized.clone());
        Ok(finalized)
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn insert_attempt(
        &self,
        record: &NewAttemptRecord,
    ) -> Result<QuizAttempt, StorageError> {
        let mut guard = self.lock()?;
        let in_progress = guard.attempts.values().any(|a| {
            a.learner_id() == record.learner_id
                && a.quiz_id() == record.quiz_id
                && a.status() == AttemptStatus::InProgress
        });
        if in_progress {
            return Err(StorageError::Conflict);
        }
        let id = AttemptId::new(guard.allocate_id());
        let attempt = QuizAttempt::started(
            id,
            record.learner_id,
            record.quiz_id,
            record.started_at,
            record.attempt_number,
        );
        guard.attempts.insert(id, attempt.clone());
        Ok(attempt)
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<QuizAttempt, StorageError> {
        let guard = self.lock()?;
        guard
            .attempts
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn update_attempt(&self, attempt: &QuizAttempt) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.attempts.contains_key(&attempt.id()) {
            return Err(StorageError::NotFound);
        }
        guard.attempts.insert(attempt.id(), attempt.clone());
        Ok(())
    }

    async fn attempts_for(
        &self,
        learner_id: LearnerId,
        quiz_id: QuizId,
    ) -> Result<Vec<QuizAttempt>, StorageError> {
        let guard = self.lock()?;
        let mut found: Vec<QuizAttempt> = guard
            .attempts
            .values()
            .filter(|a| a.learner_id() == learner_id && a.quiz_id() == quiz_id)
            .cloned()
            .collect();
        found.sort_by_key(QuizAttempt::attempt_number);
        Ok(found)
    }

    async fn insert_answer(&self, record: &AnswerRecord) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let duplicate = guard
            .answers
            .iter()
            .any(|a| a.attempt_id == record.attempt_id && a.question_id == record.question_id);
        if duplicate {
            return Err(StorageError::Conflict);
        }
        guard.answers.push(record.clone());
        Ok(())
    }

    async fn answers_for_attempt(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .answers
            .iter()
            .filter(|a| a.attempt_id == attempt_id)
            .cloned()
            .collect())
    }

    async fn in_progress_attempts(&self) -> Result<Vec<QuizAttempt>, StorageError> {
        let guard = self.lock()?;
        let mut found: Vec<QuizAttempt> = guard
            .attempts
            .values()
            .filter(|a| a.status() == AttemptStatus::InProgress)
            .cloned()
            .collect();
        found.sort_by_key(QuizAttempt::id);
        Ok(found)
    }
}

#[async_trait]
impl ContentRepository for InMemoryRepository {
    async fn upsert_material(&self, material: &Material) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard
            .materials
            .insert(material.id.clone(), material.clone());
        Ok(())
    }

    async fn materials(&self, section: &str, week: u32) -> Result<Vec<Material>, StorageError> {
        let guard = self.lock()?;
        let mut found: Vec<Material> = guard
            .materials
            .values()
            .filter(|m| m.section == section && m.week == week)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacer_core::time::fixed_now;

    fn new_learner() -> NewLearnerRecord {
        NewLearnerRecord {
            name: "Amira".into(),
            section: "Section A".into(),
            enrolled_at: fixed_now(),
        }
    }

    fn weekly_quiz(section: &str, week: u32) -> NewQuizRecord {
        NewQuizRecord {
            section: section.into(),
            scope: QuizScope::Weekly { week },
            difficulty: pacer_core::curriculum::Difficulty::Easy,
            time_limit_minutes: 5,
            max_attempts: 2,
            passing_score_percent: 70,
            created_at: fixed_now(),
        }
    }

    #[tokio::test]
    async fn update_progress_bumps_version_and_detects_staleness() {
        let repo = InMemoryRepository::new();
        let learner = repo.register_learner(&new_learner()).await.unwrap();
        assert_eq!(learner.version(), 1);

        let mut advancing = learner.clone();
        advancing.advance(fixed_now());
        let stored = repo.update_progress(&advancing).await.unwrap();
        assert_eq!(stored.version(), 2);
        assert_eq!(stored.current_week(), 2);

        // A second writer still holding version 1 loses.
        let mut late = learner;
        late.advance(fixed_now());
        let err = repo.update_progress(&late).await.unwrap_err();
        assert!(matches!(err, StorageError::StaleVersion));
    }

    #[tokio::test]
    async fn quiz_shell_is_inactive_until_finalized() {
        let repo = InMemoryRepository::new();
        let id = repo.insert_quiz(&weekly_quiz("Section A", 1)).await.unwrap();
        assert!(!repo.get_quiz(id).await.unwrap().is_active());

        let quiz = repo.finalize_quiz(id, 1, 1).await.unwrap();
        assert!(quiz.is_active());
        assert_eq!(quiz.total_questions(), 1);
        assert_eq!(quiz.total_points(), 1);
    }

    #[tokio::test]
    async fn duplicate_quiz_scope_conflicts() {
        let repo = InMemoryRepository::new();
        repo.insert_quiz(&weekly_quiz("Section A", 1)).await.unwrap();
        let err = repo
            .insert_quiz(&weekly_quiz("Section A", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        // Same week in another section is a different quiz.
        repo.insert_quiz(&weekly_quiz("Section B", 1)).await.unwrap();
    }

    #[tokio::test]
    async fn second_in_progress_attempt_conflicts() {
        let repo = InMemoryRepository::new();
        let record = NewAttemptRecord {
            learner_id: LearnerId::new(1),
            quiz_id: QuizId::new(1),
            started_at: fixed_now(),
            attempt_number: 1,
        };
        let first = repo.insert_attempt(&record).await.unwrap();
        let err = repo.insert_attempt(&record).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        // Once the first is terminal a new attempt is allowed.
        let mut done = first;
        done.time_out(fixed_now()).unwrap();
        repo.update_attempt(&done).await.unwrap();
        repo.insert_attempt(&NewAttemptRecord {
            attempt_number: 2,
            ..record
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn duplicate_answer_for_a_question_conflicts() {
        let repo = InMemoryRepository::new();
        let answer = AnswerRecord {
            attempt_id: AttemptId::new(1),
            question_id: QuestionId::new(7),
            submitted: "A".into(),
            is_correct: true,
            points_earned: 1,
            answered_at: fixed_now(),
        };
        repo.insert_answer(&answer).await.unwrap();
        let err = repo.insert_answer(&answer).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn placeholder_substitutes_for_missing_materials() {
        let repo = InMemoryRepository::new();
        let found = repo
            .materials_or_placeholder("Section A", 4)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].is_placeholder);

        let authored = Material {
            id: "mat-1".into(),
            section: "Section A".into(),
            week: 4,
            title: "Fractions".into(),
            body: "Adding fractions with unlike denominators.".into(),
            is_placeholder: false,
        };
        repo.upsert_material(&authored).await.unwrap();
        let found = repo
            .materials_or_placeholder("Section A", 4)
            .await
            .unwrap();
        assert_eq!(found, vec![authored]);
    }

    #[tokio::test]
    async fn ledger_queries_filter_by_kind_week_and_time() {
        let repo = InMemoryRepository::new();
        let learner = repo.register_learner(&new_learner()).await.unwrap();
        let record = ActivityRecord::new(
            learner.id(),
            ActivityKind::ContentCompleted,
            1,
            fixed_now(),
        );
        repo.append_activity(&record).await.unwrap();

        assert!(
            repo.has_activity(learner.id(), ActivityKind::ContentCompleted, 1)
                .await
                .unwrap()
        );
        assert!(
            !repo
                .has_activity(learner.id(), ActivityKind::WeeklyQuizCompleted, 1)
                .await
                .unwrap()
        );

        let since = fixed_now() - chrono::Duration::days(1);
        assert_eq!(
            repo.activities_since(learner.id(), since).await.unwrap(),
            vec![record]
        );
        assert!(
            repo.activities_since(learner.id(), fixed_now() + chrono::Duration::days(1))
                .await
                .unwrap()
                .is_empty()
        );
    }
}
