use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::models::Note;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NoteResponse {
    /// Note ID
    pub id: String,
    /// Note name, also the storage key of its image
    pub name: String,
    /// Note description
    pub description: String,
    /// Storage key of the attached image
    pub image_key: Option<String>,
    /// Time-limited link to the attached image
    pub image_url: Option<String>,
}

impl From<Note> for NoteResponse {
    fn from(note: Note) -> Self {
        Self {
            id: note.id.to_string(),
            name: note.name,
            description: note.description,
            image_key: note.image_key,
            image_url: note.image_url,
        }
    }
}

/// Multipart form accepted by `POST /notes`.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct CreateNoteForm {
    /// Note name
    pub name: String,
    /// Note description
    pub description: String,
    /// Optional image file
    #[schema(value_type = Option<String>, format = Binary)]
    pub image: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BlobLinkQuery {
    /// Unix timestamp after which the link is rejected
    pub expires: i64,
    /// Hex HMAC-SHA256 signature of the link
    pub signature: String,
}
