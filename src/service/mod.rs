//! Note lifecycle: list, create and delete against the record service and
//! blob storage, mirrored into an in-memory sequence of notes.
//!
//! Record-service failures are returned to the caller. Blob-storage failures
//! only degrade the image state and are logged.

use std::{collections::HashSet, sync::Arc};

use futures_util::future::join_all;
use tokio::sync::Mutex;

use crate::{
    error::NoteError,
    models::{Attachment, NewNote, Note, NoteId},
    repository::{BlobStorage, RecordService},
};

/// Backends a [`NoteController`] is constructed with.
#[derive(Clone)]
pub struct Backends {
    pub records: Arc<dyn RecordService>,
    pub blobs: Arc<dyn BlobStorage>,
}

impl Backends {
    pub fn new(records: Arc<dyn RecordService>, blobs: Arc<dyn BlobStorage>) -> Self {
        Self { records, blobs }
    }
}

/// Result of [`NoteController::delete`] when the record deletion went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The id was not in the current sequence. Nothing was touched.
    NotPresent,
}

#[derive(Default)]
struct State {
    notes: Vec<Note>,
    /// Ids removed locally whose record deletion failed.
    diverged: HashSet<NoteId>,
}

pub struct NoteController {
    backends: Backends,
    state: Mutex<State>,
    create_lock: Mutex<()>,
}

impl NoteController {
    pub fn new(backends: Backends) -> Self {
        Self {
            backends,
            state: Mutex::new(State::default()),
            create_lock: Mutex::new(()),
        }
    }

    /// Current sequence as of the last list, minus optimistic deletions.
    pub async fn notes(&self) -> Vec<Note> {
        self.state.lock().await.notes.clone()
    }

    pub async fn find(&self, id: &NoteId) -> Option<Note> {
        self.state
            .lock()
            .await
            .notes
            .iter()
            .find(|note| note.id == *id)
            .cloned()
    }

    /// Ids removed locally whose record deletion failed and that have not
    /// been reconciled by a later [`list`](Self::list).
    pub async fn diverged(&self) -> Vec<NoteId> {
        self.state.lock().await.diverged.iter().cloned().collect()
    }

    /// Fetches every record, resolves image URLs concurrently and publishes
    /// the result in record-service order.
    ///
    /// A failed fetch keeps the prior sequence. A failed URL resolution only
    /// leaves that note without `image_url`.
    pub async fn list(&self) -> Result<Vec<Note>, NoteError> {
        let fetched = self.backends.records.list_all().await?;

        let enriched = join_all(fetched.into_iter().map(|note| self.enrich(note))).await;

        let mut state = self.state.lock().await;
        for id in state.diverged.drain() {
            if enriched.iter().any(|note| note.id == id) {
                tracing::warn!(
                    "note {} reappeared after a failed delete; local view resynced",
                    id
                );
            }
        }
        state.notes.clone_from(&enriched);

        tracing::debug!("published {} notes", enriched.len());

        Ok(enriched)
    }

    async fn enrich(&self, mut note: Note) -> Note {
        let Some(key) = note.blob_key().map(str::to_owned) else {
            return note;
        };

        match self.backends.blobs.resolve_retrieval_url(&key).await {
            Ok(url) => note.image_url = Some(url),
            Err(NoteError::NotFound(_)) => {
                tracing::warn!("image '{}' of note {} is missing from storage", key, note.id);
            }
            Err(e) => {
                tracing::warn!("failed to resolve image '{}' of note {}: {}", key, note.id, e);
            }
        }

        note
    }

    /// Creates a note, uploading `file` first under the note's name.
    ///
    /// The name must not belong to any stored note, checked against the
    /// record service before anything is uploaded. An upload failure is
    /// logged and the record is written without an image. A record-write
    /// failure is returned and the blob uploaded by this call is removed.
    /// On success the sequence is refreshed with [`list`](Self::list).
    pub async fn create(
        &self,
        name: &str,
        description: &str,
        file: Option<Attachment>,
    ) -> Result<Note, NoteError> {
        self.validate(name, description).await?;

        // Held until the record is written so no other create can claim the
        // same blob key in between.
        let creating = self.create_lock.lock().await;

        let stored = self.backends.records.list_all().await?;
        if stored.iter().any(|note| note.name == name) {
            return Err(NoteError::Validation(format!(
                "a note named '{name}' already exists"
            )));
        }

        let mut new_note = NewNote::new(name, description);

        if let Some(file) = file {
            match self.backends.blobs.upload(name, &file).await {
                Ok(()) => new_note.image_key = Some(name.to_string()),
                Err(e) => {
                    tracing::warn!(
                        "failed to upload image '{}' for note '{}', saving without image: {}",
                        file.file_name,
                        name,
                        e
                    );
                }
            }
        }

        let uploaded = new_note.image_key.clone();
        let created = match self.backends.records.create(new_note).await {
            Ok(created) => created,
            Err(e) => {
                if let Some(key) = uploaded
                    && let Err(cleanup) = self.backends.blobs.delete(&key).await
                {
                    tracing::warn!(
                        "failed to remove image '{}' after note '{}' was rejected: {}",
                        key,
                        name,
                        cleanup
                    );
                }
                return Err(e);
            }
        };
        drop(creating);
        tracing::info!("created note {} '{}'", created.id, created.name);

        if let Err(e) = self.list().await {
            tracing::warn!("failed to refresh notes after creating {}: {}", created.id, e);
        }

        Ok(created)
    }

    /// Rejects empty fields and names already in the current sequence,
    /// without touching any backend.
    async fn validate(&self, name: &str, description: &str) -> Result<(), NoteError> {
        if name.trim().is_empty() {
            return Err(NoteError::Validation("name must not be empty".to_string()));
        }
        if description.trim().is_empty() {
            return Err(NoteError::Validation(
                "description must not be empty".to_string(),
            ));
        }

        let taken = self
            .state
            .lock()
            .await
            .notes
            .iter()
            .any(|note| note.name == name);
        if taken {
            return Err(NoteError::Validation(format!(
                "a note named '{name}' already exists"
            )));
        }

        Ok(())
    }

    /// Removes the note from the local sequence, then deletes its blob
    /// (best-effort) and its record.
    ///
    /// The local removal stands even when a backend call fails. A failed
    /// record deletion is returned and the id is remembered as diverged until
    /// the next [`list`](Self::list).
    pub async fn delete(
        &self,
        id: &NoteId,
        blob_key: Option<&str>,
    ) -> Result<DeleteOutcome, NoteError> {
        {
            let mut state = self.state.lock().await;
            let Some(position) = state.notes.iter().position(|note| note.id == *id) else {
                tracing::debug!("note {} is not in the current view, skipping delete", id);
                return Ok(DeleteOutcome::NotPresent);
            };
            state.notes.remove(position);
        }

        if let Some(key) = blob_key.filter(|key| !key.is_empty()) {
            if let Err(e) = self.backends.blobs.delete(key).await {
                tracing::warn!("failed to delete image '{}' of note {}: {}", key, id, e);
            }
        }

        if let Err(e) = self.backends.records.delete_by_id(id).await {
            self.state.lock().await.diverged.insert(id.clone());
            return Err(e);
        }

        tracing::info!("deleted note {}", id);

        Ok(DeleteOutcome::Deleted)
    }
}
