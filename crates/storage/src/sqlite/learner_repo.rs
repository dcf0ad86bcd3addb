use chrono::{DateTime, Utc};
use pacer_core::model::{ActivityKind, ActivityRecord, Learner, LearnerId};

use super::SqliteRepository;
use super::mapping::{id_to_i64, map_activity_row, map_learner_row, ser};
use crate::repository::{LearnerRepository, NewLearnerRecord, StorageError};

const LEARNER_COLUMNS: &str = r"
    id, name, section, current_week, completed_weeks, version,
    enrolled_at, last_activity_at
";

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl LearnerRepository for SqliteRepository {
    async fn register_learner(&self, record: &NewLearnerRecord) -> Result<Learner, StorageError> {
        // Validate (and trim) through the domain constructor before the row
        // exists; the real id replaces the placeholder after the insert.
        let draft = Learner::new(
            LearnerId::new(0),
            &record.name,
            &record.section,
            record.enrolled_at,
        )
        .map_err(ser)?;

        let result = sqlx::query(
            r"
            INSERT INTO learners (
                name, section, current_week, completed_weeks, version,
                enrolled_at, last_activity_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(draft.name())
        .bind(draft.section())
        .bind(i64::from(draft.current_week()))
        .bind(i64::from(draft.completed_weeks()))
        .bind(id_to_i64("version", draft.version())?)
        .bind(draft.enrolled_at())
        .bind(draft.last_activity_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        let id = u64::try_from(result.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("learner id overflow".into()))?;

        Learner::from_persisted(
            LearnerId::new(id),
            draft.name(),
            draft.section(),
            draft.current_week(),
            draft.completed_weeks(),
            draft.version(),
            draft.enrolled_at(),
            draft.last_activity_at(),
        )
        .map_err(ser)
    }

    async fn get_learner(&self, id: LearnerId) -> Result<Learner, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {LEARNER_COLUMNS} FROM learners WHERE id = ?1"
        ))
        .bind(id_to_i64("learner_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_learner_row(&row)
    }

    async fn update_progress(&self, learner: &Learner) -> Result<Learner, StorageError> {
        let result = sqlx::query(
            r"
            UPDATE learners
            SET current_week = ?1,
                completed_weeks = ?2,
                last_activity_at = ?3,
                version = version + 1
            WHERE id = ?4 AND version = ?5
            ",
        )
        .bind(i64::from(learner.current_week()))
        .bind(i64::from(learner.completed_weeks()))
        .bind(learner.last_activity_at())
        .bind(id_to_i64("learner_id", learner.id().value())?)
        .bind(id_to_i64("version", learner.version())?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if result.rows_affected() == 0 {
            // Distinguish a lost race from a vanished row.
            self.get_learner(learner.id()).await?;
            return Err(StorageError::StaleVersion);
        }

        Learner::from_persisted(
            learner.id(),
            learner.name(),
            learner.section(),
            learner.current_week(),
            learner.completed_weeks(),
            learner.version() + 1,
            learner.enrolled_at(),
            learner.last_activity_at(),
        )
        .map_err(ser)
    }

    async fn list_learners(&self) -> Result<Vec<Learner>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {LEARNER_COLUMNS} FROM learners ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_learner_row).collect()
    }

    async fn learners_inactive_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Learner>, StorageError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {LEARNER_COLUMNS} FROM learners
            WHERE last_activity_at IS NULL OR last_activity_at < ?1
            ORDER BY id
            "
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_learner_row).collect()
    }

    async fn append_activity(&self, record: &ActivityRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO activity_log (learner_id, kind, week, recorded_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(id_to_i64("learner_id", record.learner_id.value())?)
        .bind(record.kind.as_str())
        .bind(i64::from(record.week))
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn has_activity(
        &self,
        learner_id: LearnerId,
        kind: ActivityKind,
        week: u32,
    ) -> Result<bool, StorageError> {
        let row = sqlx::query(
            r"
            SELECT 1 FROM activity_log
            WHERE learner_id = ?1 AND kind = ?2 AND week = ?3
            LIMIT 1
            ",
        )
        .bind(id_to_i64("learner_id", learner_id.value())?)
        .bind(kind.as_str())
        .bind(i64::from(week))
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        Ok(row.is_some())
    }

    async fn activities_since(
        &self,
        learner_id: LearnerId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT learner_id, kind, week, recorded_at FROM activity_log
            WHERE learner_id = ?1 AND recorded_at >= ?2
            ORDER BY recorded_at DESC, id DESC
            ",
        )
        .bind(id_to_i64("learner_id", learner_id.value())?)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_activity_row).collect()
    }
}
