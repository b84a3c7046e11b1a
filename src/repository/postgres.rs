use async_trait::async_trait;
use tokio_postgres::{Client, NoTls, Row, error::SqlState};

use super::{RecordService, embedded::migrations};
use crate::{
    error::NoteError,
    models::{NewNote, Note, NoteId},
};

/// Record service backed by the `notes` table.
///
/// Deleting an id that does not exist succeeds.
pub struct PgRecordService {
    client: Client,
}

impl PgRecordService {
    pub async fn connect(database_dsn: &str) -> Result<Self, tokio_postgres::Error> {
        let (client, con) = tokio_postgres::connect(database_dsn, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = con.await {
                tracing::error!("connection error: {}", e);
            }
        });

        Ok(Self { client })
    }

    pub async fn migrate(&mut self) -> Result<(), refinery::Error> {
        let migrations_report = migrations::runner().run_async(&mut self.client).await?;

        for migration in migrations_report.applied_migrations() {
            tracing::info!(
                "Migration Applied -  Name: {}, Version: {}",
                migration.name(),
                migration.version()
            );
        }

        tracing::info!("DB migrations finished!");

        Ok(())
    }
}

fn note_from_row(row: &Row) -> Note {
    Note {
        id: NoteId::new(row.get::<_, String>("id")),
        name: row.get("name"),
        description: row.get("description"),
        image_key: row.get("image_key"),
        image_url: None,
    }
}

fn is_constraint_violation(code: &SqlState) -> bool {
    *code == SqlState::CHECK_VIOLATION
        || *code == SqlState::NOT_NULL_VIOLATION
        || *code == SqlState::UNIQUE_VIOLATION
}

fn classify(e: tokio_postgres::Error) -> NoteError {
    if let Some(db) = e.as_db_error()
        && is_constraint_violation(db.code())
    {
        return NoteError::Validation(db.message().to_string());
    }
    e.into()
}

#[async_trait]
impl RecordService for PgRecordService {
    async fn list_all(&self) -> Result<Vec<Note>, NoteError> {
        let rows = self
            .client
            .query(
                "SELECT id, name, description, image_key FROM notes ORDER BY created_at, id",
                &[],
            )
            .await?;

        Ok(rows.iter().map(note_from_row).collect())
    }

    async fn create(&self, note: NewNote) -> Result<Note, NoteError> {
        let row = self
            .client
            .query_one(
                "INSERT INTO notes (name, description, image_key) VALUES ($1, $2, $3) \
                 RETURNING id, name, description, image_key",
                &[&note.name, &note.description, &note.image_key],
            )
            .await
            .map_err(classify)?;

        Ok(note_from_row(&row))
    }

    async fn delete_by_id(&self, id: &NoteId) -> Result<(), NoteError> {
        let rows = self
            .client
            .execute("DELETE FROM notes WHERE id = $1", &[&id.as_str()])
            .await?;

        if rows == 0 {
            tracing::debug!("note {} was already absent from the record store", id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_constraint_codes_when_classifying_then_they_are_violations() {
        assert!(is_constraint_violation(&SqlState::CHECK_VIOLATION));
        assert!(is_constraint_violation(&SqlState::NOT_NULL_VIOLATION));
        assert!(is_constraint_violation(&SqlState::UNIQUE_VIOLATION));
    }

    #[test]
    fn given_transport_codes_when_classifying_then_they_are_not_violations() {
        assert!(!is_constraint_violation(&SqlState::CONNECTION_FAILURE));
        assert!(!is_constraint_violation(&SqlState::UNDEFINED_TABLE));
    }
}
