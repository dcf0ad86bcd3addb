use pacer_core::model::{AnswerRecord, AttemptId, LearnerId, QuizAttempt, QuizId};

use super::SqliteRepository;
use super::mapping::{id_to_i64, insert_err, map_answer_row, map_attempt_row};
use crate::repository::{AttemptRepository, NewAttemptRecord, StorageError};

const ATTEMPT_COLUMNS: &str = r"
    id, learner_id, quiz_id, started_at, ended_at, status, attempt_number,
    points_earned, score_percent, passed
";

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn insert_attempt(
        &self,
        record: &NewAttemptRecord,
    ) -> Result<QuizAttempt, StorageError> {
        // The partial unique index on open attempts turns a second
        // concurrent start into a unique violation, so the check and the
        // insert are one step.
        let result = sqlx::query(
            r"
            INSERT INTO quiz_attempts (
                learner_id, quiz_id, started_at, ended_at, status,
                attempt_number, points_earned, score_percent, passed
            )
            VALUES (?1, ?2, ?3, NULL, 'in_progress', ?4, 0, 0.0, 0)
            ",
        )
        .bind(id_to_i64("learner_id", record.learner_id.value())?)
        .bind(id_to_i64("quiz_id", record.quiz_id.value())?)
        .bind(record.started_at)
        .bind(i64::from(record.attempt_number))
        .execute(&self.pool)
        .await
        .map_err(insert_err)?;

        let id = u64::try_from(result.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("attempt id overflow".into()))?;

        Ok(QuizAttempt::started(
            AttemptId::new(id),
            record.learner_id,
            record.quiz_id,
            record.started_at,
            record.attempt_number,
        ))
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<QuizAttempt, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE id = ?1"
        ))
        .bind(id_to_i64("attempt_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_attempt_row(&row)
    }

    async fn update_attempt(&self, attempt: &QuizAttempt) -> Result<(), StorageError> {
        let result = sqlx::query(
            r"
            UPDATE quiz_attempts
            SET ended_at = ?1, status = ?2, points_earned = ?3,
                score_percent = ?4, passed = ?5
            WHERE id = ?6
            ",
        )
        .bind(attempt.ended_at())
        .bind(attempt.status().as_str())
        .bind(i64::from(attempt.points_earned()))
        .bind(attempt.score_percent())
        .bind(attempt.passed())
        .bind(id_to_i64("attempt_id", attempt.id().value())?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn attempts_for(
        &self,
        learner_id: LearnerId,
        quiz_id: QuizId,
    ) -> Result<Vec<QuizAttempt>, StorageError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts
            WHERE learner_id = ?1 AND quiz_id = ?2
            ORDER BY attempt_number
            "
        ))
        .bind(id_to_i64("learner_id", learner_id.value())?)
        .bind(id_to_i64("quiz_id", quiz_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_attempt_row).collect()
    }

    async fn insert_answer(&self, record: &AnswerRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO quiz_answers (
                attempt_id, question_id, submitted, is_correct,
                points_earned, answered_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(id_to_i64("attempt_id", record.attempt_id.value())?)
        .bind(id_to_i64("question_id", record.question_id.value())?)
        .bind(&record.submitted)
        .bind(record.is_correct)
        .bind(i64::from(record.points_earned))
        .bind(record.answered_at)
        .execute(&self.pool)
        .await
        .map_err(insert_err)?;

        Ok(())
    }

    async fn answers_for_attempt(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT attempt_id, question_id, submitted, is_correct,
                   points_earned, answered_at
            FROM quiz_answers
            WHERE attempt_id = ?1
            ORDER BY id
            ",
        )
        .bind(id_to_i64("attempt_id", attempt_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_answer_row).collect()
    }

    async fn in_progress_attempts(&self) -> Result<Vec<QuizAttempt>, StorageError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts
            WHERE status = 'in_progress'
            ORDER BY id
            "
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_attempt_row).collect()
    }
}
