pub mod blob;
mod embedded;
pub mod postgres;

pub use blob::{BlobAccessError, FsBlobStorage};
pub use postgres::PgRecordService;

use async_trait::async_trait;

use crate::{
    error::NoteError,
    models::{Attachment, NewNote, Note, NoteId},
};

/// Structured-record service persisting notes.
#[async_trait]
pub trait RecordService: Send + Sync {
    /// All notes in service-defined order.
    async fn list_all(&self) -> Result<Vec<Note>, NoteError>;

    /// Persists a note and returns it with its assigned id.
    ///
    /// Constraint violations fail with [`NoteError::Validation`].
    async fn create(&self, note: NewNote) -> Result<Note, NoteError>;

    /// Deletes a note. Implementations document whether a missing id is an error.
    async fn delete_by_id(&self, id: &NoteId) -> Result<(), NoteError>;
}

/// Blob storage keyed by string, issuing time-limited retrieval URLs.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Fails with [`NoteError::NotFound`] when nothing is stored under `key`.
    async fn resolve_retrieval_url(&self, key: &str) -> Result<String, NoteError>;

    /// Stores the payload, overwriting any object already at `key`.
    async fn upload(&self, key: &str, attachment: &Attachment) -> Result<(), NoteError>;

    async fn delete(&self, key: &str) -> Result<(), NoteError>;
}
