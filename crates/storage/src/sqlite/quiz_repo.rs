use pacer_core::model::{Question, QuestionId, Quiz, QuizId, QuizScope};

use super::SqliteRepository;
use super::mapping::{
    id_to_i64, insert_err, map_question_row, map_quiz_row, question_kind_columns, scope_columns,
};
use crate::repository::{NewQuestionRecord, NewQuizRecord, QuizRepository, StorageError};

const QUIZ_COLUMNS: &str = r"
    id, section, scope_key, kind, start_week, end_week, difficulty,
    time_limit_minutes, max_attempts, passing_score_percent,
    total_questions, total_points, is_active, created_at
";

const QUESTION_COLUMNS: &str = r"
    id, quiz_id, text, kind, options, correct_answer, points, order_index, difficulty
";

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl QuizRepository for SqliteRepository {
    async fn insert_quiz(&self, record: &NewQuizRecord) -> Result<QuizId, StorageError> {
        record
            .scope
            .validate()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let (kind, start_week, end_week) = scope_columns(&record.scope);

        let result = sqlx::query(
            r"
            INSERT INTO quizzes (
                section, scope_key, kind, start_week, end_week, difficulty,
                time_limit_minutes, max_attempts, passing_score_percent,
                total_questions, total_points, is_active, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, 0, 0, ?10)
            ",
        )
        .bind(&record.section)
        .bind(record.scope.storage_key())
        .bind(kind)
        .bind(start_week)
        .bind(end_week)
        .bind(record.difficulty.as_str())
        .bind(i64::from(record.time_limit_minutes))
        .bind(i64::from(record.max_attempts))
        .bind(i64::from(record.passing_score_percent))
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(insert_err)?;

        let id = u64::try_from(result.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("quiz id overflow".into()))?;
        Ok(QuizId::new(id))
    }

    async fn get_quiz(&self, id: QuizId) -> Result<Quiz, StorageError> {
        let row = sqlx::query(&format!("SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = ?1"))
            .bind(id_to_i64("quiz_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        map_quiz_row(&row)
    }

    async fn find_quiz(
        &self,
        section: &str,
        scope: &QuizScope,
    ) -> Result<Option<Quiz>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {QUIZ_COLUMNS} FROM quizzes WHERE section = ?1 AND scope_key = ?2"
        ))
        .bind(section)
        .bind(scope.storage_key())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_quiz_row).transpose()
    }

    async fn insert_question(
        &self,
        record: &NewQuestionRecord,
    ) -> Result<QuestionId, StorageError> {
        let (kind, options) = question_kind_columns(&record.kind)?;

        let result = sqlx::query(
            r"
            INSERT INTO questions (
                quiz_id, text, kind, options, correct_answer, points,
                order_index, difficulty
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(id_to_i64("quiz_id", record.quiz_id.value())?)
        .bind(&record.text)
        .bind(kind)
        .bind(options)
        .bind(&record.correct_answer)
        .bind(i64::from(record.points))
        .bind(i64::from(record.order_index))
        .bind(record.difficulty.as_str())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        let id = u64::try_from(result.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("question id overflow".into()))?;
        Ok(QuestionId::new(id))
    }

    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?1"
        ))
        .bind(id_to_i64("question_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_question_row(&row)
    }

    async fn questions_for_quiz(&self, quiz_id: QuizId) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {QUESTION_COLUMNS} FROM questions
            WHERE quiz_id = ?1
            ORDER BY order_index
            "
        ))
        .bind(id_to_i64("quiz_id", quiz_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_question_row).collect()
    }

    async fn delete_questions(&self, quiz_id: QuizId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM questions WHERE quiz_id = ?1")
            .bind(id_to_i64("quiz_id", quiz_id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }

    async fn finalize_quiz(
        &self,
        id: QuizId,
        total_questions: u32,
        total_points: u32,
    ) -> Result<Quiz, StorageError> {
        let result = sqlx::query(
            r"
            UPDATE quizzes
            SET total_questions = ?1, total_points = ?2, is_active = 1
            WHERE id = ?3
            ",
        )
        .bind(i64::from(total_questions))
        .bind(i64::from(total_points))
        .bind(id_to_i64("quiz_id", id.value())?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        self.get_quiz(id).await
    }
}
