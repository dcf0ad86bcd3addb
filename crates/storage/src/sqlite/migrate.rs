use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema: learners with their activity ledger, quizzes
/// with questions, attempts with answers, materials, and indexes.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS learners (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    section TEXT NOT NULL,
                    current_week INTEGER NOT NULL CHECK (current_week >= 1),
                    completed_weeks INTEGER NOT NULL
                        CHECK (completed_weeks >= 0 AND completed_weeks <= current_week),
                    version INTEGER NOT NULL CHECK (version >= 1),
                    enrolled_at TEXT NOT NULL,
                    last_activity_at TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS activity_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    learner_id INTEGER NOT NULL,
                    kind TEXT NOT NULL,
                    week INTEGER NOT NULL CHECK (week >= 1),
                    recorded_at TEXT NOT NULL,
                    FOREIGN KEY (learner_id) REFERENCES learners(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS quizzes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    section TEXT NOT NULL,
                    scope_key TEXT NOT NULL,
                    kind TEXT NOT NULL CHECK (kind IN ('weekly', 'cumulative')),
                    start_week INTEGER NOT NULL CHECK (start_week >= 1),
                    end_week INTEGER NOT NULL CHECK (end_week >= start_week),
                    difficulty TEXT NOT NULL,
                    time_limit_minutes INTEGER NOT NULL CHECK (time_limit_minutes > 0),
                    max_attempts INTEGER NOT NULL CHECK (max_attempts > 0),
                    passing_score_percent INTEGER NOT NULL
                        CHECK (passing_score_percent BETWEEN 1 AND 100),
                    total_questions INTEGER NOT NULL CHECK (total_questions >= 0),
                    total_points INTEGER NOT NULL CHECK (total_points >= 0),
                    is_active INTEGER NOT NULL CHECK (is_active IN (0, 1)),
                    created_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS questions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    quiz_id INTEGER NOT NULL,
                    text TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    options TEXT,
                    correct_answer TEXT NOT NULL,
                    points INTEGER NOT NULL CHECK (points > 0),
                    order_index INTEGER NOT NULL CHECK (order_index >= 0),
                    difficulty TEXT NOT NULL,
                    FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS quiz_attempts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    learner_id INTEGER NOT NULL,
                    quiz_id INTEGER NOT NULL,
                    started_at TEXT NOT NULL,
                    ended_at TEXT,
                    status TEXT NOT NULL
                        CHECK (status IN ('in_progress', 'completed', 'timed_out')),
                    attempt_number INTEGER NOT NULL CHECK (attempt_number >= 1),
                    points_earned INTEGER NOT NULL CHECK (points_earned >= 0),
                    score_percent REAL NOT NULL,
                    passed INTEGER NOT NULL CHECK (passed IN (0, 1)),
                    FOREIGN KEY (learner_id) REFERENCES learners(id) ON DELETE CASCADE,
                    FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS quiz_answers (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    attempt_id INTEGER NOT NULL,
                    question_id INTEGER NOT NULL,
                    submitted TEXT NOT NULL,
                    is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
                    points_earned INTEGER NOT NULL CHECK (points_earned >= 0),
                    answered_at TEXT NOT NULL,
                    UNIQUE (attempt_id, question_id),
                    FOREIGN KEY (attempt_id) REFERENCES quiz_attempts(id) ON DELETE CASCADE,
                    FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS materials (
                    id TEXT PRIMARY KEY,
                    section TEXT NOT NULL,
                    week INTEGER NOT NULL CHECK (week >= 1),
                    title TEXT NOT NULL,
                    body TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_quizzes_section_scope
                    ON quizzes (section, scope_key);
            ",
        )
        .execute(&mut *tx)
        .await?;

        // At most one open attempt per learner and quiz; the insert itself
        // is the check.
        sqlx::query(
            r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_attempts_single_open
                    ON quiz_attempts (learner_id, quiz_id)
                    WHERE status = 'in_progress';
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_activity_learner_kind_week
                    ON activity_log (learner_id, kind, week);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_activity_learner_recorded
                    ON activity_log (learner_id, recorded_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_questions_quiz_order
                    ON questions (quiz_id, order_index);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_attempts_learner_quiz
                    ON quiz_attempts (learner_id, quiz_id, attempt_number);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_attempts_status
                    ON quiz_attempts (status);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_materials_section_week
                    ON materials (section, week);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
