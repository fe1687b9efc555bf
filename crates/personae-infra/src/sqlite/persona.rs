//! SQLite persona and index-marker repository implementation.
//!
//! Implements `PersonaRepository` and `IndexMarkerRepository` from
//! `personae-core` using sqlx with split read/write pools.

use chrono::Utc;
use sqlx::Row;

use personae_core::repository::index_marker::IndexMarkerRepository;
use personae_core::repository::persona::PersonaRepository;
use personae_types::error::RepositoryError;
use personae_types::persona::{Persona, PersonaField, PersonaId, ReferenceSection};

use super::pool::DatabasePool;

/// SQLite-backed persona store.
#[derive(Clone)]
pub struct SqlitePersonaRepository {
    pool: DatabasePool,
}

impl SqlitePersonaRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a persona and its sections.
    ///
    /// Used by seeding. An already cached `summarized_personality` is kept
    /// unless the incoming persona carries one.
    pub async fn upsert_persona(&self, persona: &Persona) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO personas (id, name, biography, personality, summarized_personality, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   biography = excluded.biography,
                   personality = excluded.personality,
                   summarized_personality = COALESCE(excluded.summarized_personality, personas.summarized_personality),
                   updated_at = excluded.updated_at"#,
        )
        .bind(persona.id.0)
        .bind(&persona.name)
        .bind(&persona.biography)
        .bind(&persona.personality)
        .bind(&persona.summarized_personality)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query("DELETE FROM reference_sections WHERE persona_id = ?")
            .bind(persona.id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        for (position, section) in persona.sections.iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO reference_sections (persona_id, position, text, tag_1, tag_2, tag_3)
                   VALUES (?, ?, ?, ?, ?, ?)"#,
            )
            .bind(persona.id.0)
            .bind(position as i64)
            .bind(&section.text)
            .bind(&section.tag_1)
            .bind(&section.tag_2)
            .bind(&section.tag_3)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    /// All personas (without sections) ordered by id.
    pub async fn list_personas(&self) -> Result<Vec<Persona>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, biography, personality, summarized_personality FROM personas ORDER BY id",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                PersonaRow::from_row(row)
                    .map(|r| r.into_persona(Vec::new()))
                    .map_err(|e| RepositoryError::Query(e.to_string()))
            })
            .collect()
    }

    async fn sections(&self, id: PersonaId) -> Result<Vec<ReferenceSection>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT text, tag_1, tag_2, tag_3 FROM reference_sections WHERE persona_id = ? ORDER BY position",
        )
        .bind(id.0)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                Ok(ReferenceSection {
                    text: row.try_get("text")?,
                    tag_1: row.try_get("tag_1")?,
                    tag_2: row.try_get("tag_2")?,
                    tag_3: row.try_get("tag_3")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| RepositoryError::Query(e.to_string()))
    }
}

/// Internal row type for mapping SQLite rows to domain Persona.
struct PersonaRow {
    id: i64,
    name: String,
    biography: String,
    personality: String,
    summarized_personality: Option<String>,
}

impl PersonaRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            biography: row.try_get("biography")?,
            personality: row.try_get("personality")?,
            summarized_personality: row.try_get("summarized_personality")?,
        })
    }

    fn into_persona(self, sections: Vec<ReferenceSection>) -> Persona {
        Persona {
            id: PersonaId(self.id),
            name: self.name,
            biography: self.biography,
            personality: self.personality,
            summarized_personality: self.summarized_personality,
            sections,
        }
    }
}

impl PersonaRepository for SqlitePersonaRepository {
    async fn get_persona(&self, id: PersonaId) -> Result<Option<Persona>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, biography, personality, summarized_personality FROM personas WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let persona_row =
            PersonaRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
        let sections = self.sections(id).await?;
        Ok(Some(persona_row.into_persona(sections)))
    }

    async fn update_persona_field(
        &self,
        id: PersonaId,
        field: PersonaField,
        value: &str,
    ) -> Result<bool, RepositoryError> {
        let column = field.column();
        let sql = format!(
            "UPDATE personas SET {column} = ?, updated_at = ? WHERE id = ? AND {column} IS NULL"
        );
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(Utc::now().to_rfc3339())
            .bind(id.0)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists = sqlx::query("SELECT 1 FROM personas WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound);
        }
        Ok(false)
    }
}

impl IndexMarkerRepository for SqlitePersonaRepository {
    async fn marker_exists(&self, id: PersonaId) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT 1 FROM index_markers WHERE persona_id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn record_index_built(&self, id: PersonaId, chunk_count: u64) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO index_markers (persona_id, chunk_count, built_at)
               VALUES (?, ?, ?)
               ON CONFLICT(persona_id) DO NOTHING"#,
        )
        .bind(id.0)
        .bind(chunk_count as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| {
            if e.to_string().contains("FOREIGN KEY") {
                RepositoryError::NotFound
            } else {
                RepositoryError::Query(e.to_string())
            }
        })?;
        Ok(())
    }

    async fn clear_marker(&self, id: PersonaId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM index_markers WHERE persona_id = ?")
            .bind(id.0)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}
