use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use axum_macros::debug_handler;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use std::sync::Arc;

use crate::{
    dto::{BlobLinkQuery, CreateNoteForm, NoteResponse},
    error::NoteError,
    models::{Attachment, NoteId},
    repository::{BlobAccessError, FsBlobStorage},
    service::{DeleteOutcome, NoteController},
};

#[derive(Clone)]
pub struct AppState {
    pub notes: Arc<NoteController>,
    pub blobs: Arc<FsBlobStorage>,
}

#[derive(OpenApi)]
#[openapi(
    paths(list_notes, create_note, delete_note, get_blob),
    components(schemas(NoteResponse, CreateNoteForm)),
    tags(
        (name = "notes", description = "Notes with image attachments"),
        (name = "blobs", description = "Signed image retrieval")
    )
)]
pub struct ApiDoc;

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/notes", get(list_notes).post(create_note))
        .route("/notes/{id}", delete(delete_note))
        .route("/blobs/{key}", get(get_blob))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Response {
    (StatusCode::OK, "Hello world!").into_response()
}

#[utoipa::path(
    get,
    path = "/notes",
    responses(
        (status = 200, description = "Refreshed list of notes", body = Vec<NoteResponse>),
        (status = 502, description = "Record service unavailable")
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn list_notes(State(state): State<AppState>) -> Response {
    match state.notes.list().await {
        Ok(notes) => {
            let body: Vec<NoteResponse> = notes.into_iter().map(NoteResponse::from).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            tracing::error!("failed to list notes: {}", e);
            (StatusCode::BAD_GATEWAY, "Failed to list notes").into_response()
        }
    }
}

struct NoteForm {
    name: String,
    description: String,
    image: Option<Attachment>,
}

async fn read_form(mut multipart: Multipart) -> Result<NoteForm, MultipartError> {
    let mut form = NoteForm {
        name: String::new(),
        description: String::new(),
        image: None,
    };

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("name") => form.name = field.text().await?,
            Some("description") => form.description = field.text().await?,
            Some("image") => {
                let file_name = field.file_name().unwrap_or("image").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                // An untouched file input still sends an empty part.
                if !bytes.is_empty() {
                    form.image = Some(Attachment {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

#[utoipa::path(
    post,
    path = "/notes",
    request_body(content = CreateNoteForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Note created successfully", body = NoteResponse),
        (status = 400, description = "Missing, empty or duplicate field"),
        (status = 500, description = "Internal server error")
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn create_note(State(state): State<AppState>, multipart: Multipart) -> Response {
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(e) => {
            tracing::error!("failed to read note form: {}", e);
            return (StatusCode::BAD_REQUEST, "Malformed form data").into_response();
        }
    };

    match state
        .notes
        .create(&form.name, &form.description, form.image)
        .await
    {
        Ok(note) => (StatusCode::CREATED, Json(NoteResponse::from(note))).into_response(),
        Err(NoteError::Validation(message)) => {
            tracing::warn!("rejected note '{}': {}", form.name, message);
            (StatusCode::BAD_REQUEST, message).into_response()
        }
        Err(e) => {
            tracing::error!("failed to create note entry: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create note").into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/notes/{id}",
    params(
        ("id" = String, Path, description = "Note ID")
    ),
    responses(
        (status = 204, description = "Note deleted successfully"),
        (status = 404, description = "Note not found"),
        (status = 500, description = "Record deletion failed; note hidden until the next listing")
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn delete_note(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = NoteId::new(id);
    let blob_key = state.notes.find(&id).await.and_then(|note| note.image_key);

    match state.notes.delete(&id, blob_key.as_deref()).await {
        Ok(DeleteOutcome::Deleted) => StatusCode::NO_CONTENT.into_response(),
        Ok(DeleteOutcome::NotPresent) => (StatusCode::NOT_FOUND, "Note not found").into_response(),
        Err(e) => {
            tracing::error!("failed to delete note entry {}: {}", id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete note").into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/blobs/{key}",
    params(
        ("key" = String, Path, description = "Blob storage key"),
        BlobLinkQuery
    ),
    responses(
        (status = 200, description = "Image contents"),
        (status = 403, description = "Invalid signature"),
        (status = 404, description = "Image not found"),
        (status = 410, description = "Link expired")
    ),
    tag = "blobs"
)]
#[debug_handler]
pub async fn get_blob(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(link): Query<BlobLinkQuery>,
) -> Response {
    match state
        .blobs
        .open_signed(&key, link.expires, &link.signature)
        .await
    {
        Ok(blob) => {
            let content_type = blob
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string());
            // Raster images render inline; anything else, SVG included, downloads.
            let inline = content_type.starts_with("image/") && !content_type.contains("svg");
            let disposition = if inline {
                "inline".to_string()
            } else {
                format!(
                    "attachment; filename=\"{}\"",
                    blob.file_name.replace(['"', '\\', '\r', '\n'], "_")
                )
            };
            (
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                blob.bytes,
            )
                .into_response()
        }
        Err(BlobAccessError::BadSignature) => {
            (StatusCode::FORBIDDEN, "Invalid signature").into_response()
        }
        Err(BlobAccessError::Expired) => (StatusCode::GONE, "Link expired").into_response(),
        Err(BlobAccessError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, "Image not found").into_response()
        }
        Err(BlobAccessError::Io(e)) => {
            tracing::error!("failed to read image '{}': {}", key, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read image").into_response()
        }
    }
}
