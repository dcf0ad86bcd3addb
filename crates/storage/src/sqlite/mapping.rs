use pacer_core::curriculum::Difficulty;
use pacer_core::model::{
    ActivityKind, ActivityRecord, AnswerOption, AnswerRecord, AttemptId, AttemptStatus, Learner,
    LearnerId, Material, Question, QuestionId, QuestionKind, Quiz, QuizAttempt, QuizId, QuizScope,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Maps unique-constraint violations to `Conflict`; everything else is a
/// backend failure.
pub(crate) fn insert_err(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        if db.kind() == sqlx::error::ErrorKind::UniqueViolation {
            return StorageError::Conflict;
        }
    }
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} out of range: {v}")))
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn learner_id_from_i64(v: i64) -> Result<LearnerId, StorageError> {
    Ok(LearnerId::new(i64_to_u64("learner_id", v)?))
}

pub(crate) fn quiz_id_from_i64(v: i64) -> Result<QuizId, StorageError> {
    Ok(QuizId::new(i64_to_u64("quiz_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn attempt_id_from_i64(v: i64) -> Result<AttemptId, StorageError> {
    Ok(AttemptId::new(i64_to_u64("attempt_id", v)?))
}

fn get_u32(row: &sqlx::sqlite::SqliteRow, field: &'static str) -> Result<u32, StorageError> {
    i64_to_u32(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

//
// ─── SCOPE COLUMNS ─────────────────────────────────────────────────────────────
//

/// Flattens a scope into its (kind, start, end) columns. A weekly quiz
/// stores its week in both bounds.
pub(crate) fn scope_columns(scope: &QuizScope) -> (&'static str, i64, i64) {
    match *scope {
        QuizScope::Weekly { week } => ("weekly", i64::from(week), i64::from(week)),
        QuizScope::Cumulative {
            start_week,
            end_week,
        } => ("cumulative", i64::from(start_week), i64::from(end_week)),
    }
}

pub(crate) fn scope_from_columns(
    kind: &str,
    start_week: u32,
    end_week: u32,
) -> Result<QuizScope, StorageError> {
    match kind {
        "weekly" => Ok(QuizScope::Weekly { week: start_week }),
        "cumulative" => Ok(QuizScope::Cumulative {
            start_week,
            end_week,
        }),
        other => Err(StorageError::Serialization(format!(
            "invalid quiz kind: {other}"
        ))),
    }
}

//
// ─── ROW MAPPERS ───────────────────────────────────────────────────────────────
//

pub(crate) fn map_learner_row(row: &sqlx::sqlite::SqliteRow) -> Result<Learner, StorageError> {
    Learner::from_persisted(
        learner_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("name").map_err(ser)?,
        row.try_get::<String, _>("section").map_err(ser)?,
        get_u32(row, "current_week")?,
        get_u32(row, "completed_weeks")?,
        i64_to_u64("version", row.try_get::<i64, _>("version").map_err(ser)?)?,
        row.try_get("enrolled_at").map_err(ser)?,
        row.try_get("last_activity_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_activity_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ActivityRecord, StorageError> {
    let kind_str: String = row.try_get("kind").map_err(ser)?;
    Ok(ActivityRecord {
        learner_id: learner_id_from_i64(row.try_get::<i64, _>("learner_id").map_err(ser)?)?,
        kind: ActivityKind::parse(&kind_str).map_err(ser)?,
        week: get_u32(row, "week")?,
        recorded_at: row.try_get("recorded_at").map_err(ser)?,
    })
}

pub(crate) fn map_quiz_row(row: &sqlx::sqlite::SqliteRow) -> Result<Quiz, StorageError> {
    let kind_str: String = row.try_get("kind").map_err(ser)?;
    let scope = scope_from_columns(
        &kind_str,
        get_u32(row, "start_week")?,
        get_u32(row, "end_week")?,
    )?;
    let difficulty_str: String = row.try_get("difficulty").map_err(ser)?;

    Quiz::from_persisted(
        quiz_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("section").map_err(ser)?,
        scope,
        Difficulty::parse(&difficulty_str).map_err(ser)?,
        get_u32(row, "time_limit_minutes")?,
        get_u32(row, "max_attempts")?,
        get_u32(row, "passing_score_percent")?,
        get_u32(row, "total_questions")?,
        get_u32(row, "total_points")?,
        row.try_get::<bool, _>("is_active").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn question_kind_columns(
    kind: &QuestionKind,
) -> Result<(&'static str, Option<String>), StorageError> {
    let options = match kind {
        QuestionKind::MultipleChoice { options } => {
            Some(serde_json::to_string(options).map_err(ser)?)
        }
        _ => None,
    };
    Ok((kind.as_str(), options))
}

pub(crate) fn question_kind_from_columns(
    kind: &str,
    options: Option<&str>,
) -> Result<QuestionKind, StorageError> {
    match kind {
        "multiple_choice" => {
            let raw = options.ok_or_else(|| {
                StorageError::Serialization("multiple choice row without options".into())
            })?;
            let options: Vec<AnswerOption> = serde_json::from_str(raw).map_err(ser)?;
            Ok(QuestionKind::MultipleChoice { options })
        }
        "true_false" => Ok(QuestionKind::TrueFalse),
        "fill_in_blank" => Ok(QuestionKind::FillInBlank),
        "short_answer" => Ok(QuestionKind::ShortAnswer),
        other => Err(StorageError::Serialization(format!(
            "invalid question kind: {other}"
        ))),
    }
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let kind_str: String = row.try_get("kind").map_err(ser)?;
    let options: Option<String> = row.try_get("options").map_err(ser)?;
    let kind = question_kind_from_columns(&kind_str, options.as_deref())?;
    let difficulty_str: String = row.try_get("difficulty").map_err(ser)?;

    Question::from_persisted(
        question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        quiz_id_from_i64(row.try_get::<i64, _>("quiz_id").map_err(ser)?)?,
        row.try_get::<String, _>("text").map_err(ser)?,
        kind,
        row.try_get::<String, _>("correct_answer").map_err(ser)?,
        get_u32(row, "points")?,
        get_u32(row, "order_index")?,
        Difficulty::parse(&difficulty_str).map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_attempt_row(row: &sqlx::sqlite::SqliteRow) -> Result<QuizAttempt, StorageError> {
    let status_str: String = row.try_get("status").map_err(ser)?;
    Ok(QuizAttempt::from_persisted(
        attempt_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        learner_id_from_i64(row.try_get::<i64, _>("learner_id").map_err(ser)?)?,
        quiz_id_from_i64(row.try_get::<i64, _>("quiz_id").map_err(ser)?)?,
        row.try_get("started_at").map_err(ser)?,
        row.try_get("ended_at").map_err(ser)?,
        AttemptStatus::parse(&status_str).map_err(ser)?,
        get_u32(row, "attempt_number")?,
        get_u32(row, "points_earned")?,
        row.try_get("score_percent").map_err(ser)?,
        row.try_get("passed").map_err(ser)?,
    ))
}

pub(crate) fn map_answer_row(row: &sqlx::sqlite::SqliteRow) -> Result<AnswerRecord, StorageError> {
    Ok(AnswerRecord {
        attempt_id: attempt_id_from_i64(row.try_get::<i64, _>("attempt_id").map_err(ser)?)?,
        question_id: question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?,
        submitted: row.try_get("submitted").map_err(ser)?,
        is_correct: row.try_get("is_correct").map_err(ser)?,
        points_earned: get_u32(row, "points_earned")?,
        answered_at: row.try_get("answered_at").map_err(ser)?,
    })
}

pub(crate) fn map_material_row(row: &sqlx::sqlite::SqliteRow) -> Result<Material, StorageError> {
    Ok(Material {
        id: row.try_get("id").map_err(ser)?,
        section: row.try_get("section").map_err(ser)?,
        week: get_u32(row, "week")?,
        title: row.try_get("title").map_err(ser)?,
        body: row.try_get("body").map_err(ser)?,
        is_placeholder: false,
    })
}
