use pacer_core::model::Material;

use super::SqliteRepository;
use super::mapping::map_material_row;
use crate::repository::{ContentRepository, StorageError};

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl ContentRepository for SqliteRepository {
    async fn upsert_material(&self, material: &Material) -> Result<(), StorageError> {
        // Placeholders are synthesized at read time and never stored.
        if material.is_placeholder {
            return Ok(());
        }

        sqlx::query(
            r"
            INSERT INTO materials (id, section, week, title, body)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                section = excluded.section,
                week = excluded.week,
                title = excluded.title,
                body = excluded.body
            ",
        )
        .bind(&material.id)
        .bind(&material.section)
        .bind(i64::from(material.week))
        .bind(&material.title)
        .bind(&material.body)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn materials(&self, section: &str, week: u32) -> Result<Vec<Material>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, section, week, title, body FROM materials
            WHERE section = ?1 AND week = ?2
            ORDER BY id
            ",
        )
        .bind(section)
        .bind(i64::from(week))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_material_row).collect()
    }
}
