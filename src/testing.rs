//! Recording test doubles for [`RecordService`] and [`BlobStorage`].
//!
//! Both doubles write into one shared call log so tests can assert the order
//! of calls across the two services.
//!
//! ```
//! use notes_app::testing::MockBackends;
//!
//! let mocks = MockBackends::builder()
//!     .with_note("1", "a", "d1", Some("a"))
//!     .with_url("a", "https://x/a.png")
//!     .build();
//! let backends = mocks.backends();
//! ```

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    error::NoteError,
    models::{Attachment, NewNote, Note, NoteId},
    repository::{BlobStorage, RecordService},
    service::Backends,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListAll,
    Create(NewNote),
    DeleteById(NoteId),
    ResolveUrl(String),
    Upload(String),
    DeleteBlob(String),
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

pub struct MockRecordService {
    log: CallLog,
    notes: Mutex<Vec<Note>>,
    next_id: AtomicU64,
    fail_list: bool,
    fail_create: bool,
    fail_delete: bool,
}

impl MockRecordService {
    /// Notes currently held by the double.
    pub fn stored(&self) -> Vec<Note> {
        self.notes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl RecordService for MockRecordService {
    async fn list_all(&self) -> Result<Vec<Note>, NoteError> {
        self.log.push(Call::ListAll);
        if self.fail_list {
            return Err(NoteError::unavailable("list_all failed"));
        }
        Ok(self.stored())
    }

    async fn create(&self, note: NewNote) -> Result<Note, NoteError> {
        self.log.push(Call::Create(note.clone()));
        if self.fail_create {
            return Err(NoteError::unavailable("create failed"));
        }

        let created = Note {
            id: NoteId::new(self.next_id.fetch_add(1, Ordering::SeqCst).to_string()),
            name: note.name,
            description: note.description,
            image_key: note.image_key,
            image_url: None,
        };
        self.notes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(created.clone());
        Ok(created)
    }

    async fn delete_by_id(&self, id: &NoteId) -> Result<(), NoteError> {
        self.log.push(Call::DeleteById(id.clone()));
        if self.fail_delete {
            return Err(NoteError::unavailable("delete_by_id failed"));
        }
        self.notes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|note| note.id != *id);
        Ok(())
    }
}

pub struct MockBlobStorage {
    log: CallLog,
    urls: Mutex<HashMap<String, String>>,
    delays: HashMap<String, Duration>,
    failing_resolve: HashSet<String>,
    fail_upload: bool,
    fail_delete: bool,
}

#[async_trait]
impl BlobStorage for MockBlobStorage {
    async fn resolve_retrieval_url(&self, key: &str) -> Result<String, NoteError> {
        self.log.push(Call::ResolveUrl(key.to_string()));
        if let Some(delay) = self.delays.get(key) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_resolve.contains(key) {
            return Err(NoteError::unavailable(format!("resolve {key} failed")));
        }
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| NoteError::NotFound(key.to_string()))
    }

    async fn upload(&self, key: &str, _attachment: &Attachment) -> Result<(), NoteError> {
        self.log.push(Call::Upload(key.to_string()));
        if self.fail_upload {
            return Err(NoteError::unavailable("upload failed"));
        }
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), format!("https://blobs.test/{key}"));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), NoteError> {
        self.log.push(Call::DeleteBlob(key.to_string()));
        if self.fail_delete {
            return Err(NoteError::unavailable("blob delete failed"));
        }
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Both doubles plus their shared call log.
pub struct MockBackends {
    pub records: Arc<MockRecordService>,
    pub blobs: Arc<MockBlobStorage>,
    pub log: CallLog,
}

impl MockBackends {
    pub fn builder() -> MockBackendsBuilder {
        MockBackendsBuilder::default()
    }

    pub fn backends(&self) -> Backends {
        Backends::new(self.records.clone(), self.blobs.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.calls()
    }
}

/// Fluent configuration for [`MockBackends`].
#[derive(Default)]
pub struct MockBackendsBuilder {
    notes: Vec<Note>,
    urls: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    failing_resolve: HashSet<String>,
    fail_list: bool,
    fail_create: bool,
    fail_record_delete: bool,
    fail_upload: bool,
    fail_blob_delete: bool,
}

impl MockBackendsBuilder {
    /// Seed a stored record, returned by `list_all` in insertion order.
    #[must_use]
    pub fn with_note(
        mut self,
        id: &str,
        name: &str,
        description: &str,
        image_key: Option<&str>,
    ) -> Self {
        self.notes.push(Note {
            id: NoteId::new(id),
            name: name.to_string(),
            description: description.to_string(),
            image_key: image_key.map(str::to_string),
            image_url: None,
        });
        self
    }

    /// Make `resolve_retrieval_url(key)` return `url`.
    #[must_use]
    pub fn with_url(mut self, key: &str, url: &str) -> Self {
        self.urls.insert(key.to_string(), url.to_string());
        self
    }

    /// Delay resolution of `key`, to shuffle completion order.
    #[must_use]
    pub fn with_resolve_delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    #[must_use]
    pub fn failing_resolve(mut self, key: &str) -> Self {
        self.failing_resolve.insert(key.to_string());
        self
    }

    #[must_use]
    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    #[must_use]
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    #[must_use]
    pub fn failing_record_delete(mut self) -> Self {
        self.fail_record_delete = true;
        self
    }

    #[must_use]
    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    #[must_use]
    pub fn failing_blob_delete(mut self) -> Self {
        self.fail_blob_delete = true;
        self
    }

    pub fn build(self) -> MockBackends {
        let log = CallLog::default();
        let records = MockRecordService {
            log: log.clone(),
            notes: Mutex::new(self.notes),
            next_id: AtomicU64::new(100),
            fail_list: self.fail_list,
            fail_create: self.fail_create,
            fail_delete: self.fail_record_delete,
        };
        let blobs = MockBlobStorage {
            log: log.clone(),
            urls: Mutex::new(self.urls),
            delays: self.delays,
            failing_resolve: self.failing_resolve,
            fail_upload: self.fail_upload,
            fail_delete: self.fail_blob_delete,
        };

        MockBackends {
            records: Arc::new(records),
            blobs: Arc::new(blobs),
            log,
        }
    }
}
