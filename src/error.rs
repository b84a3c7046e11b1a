/// Failure of one of the backing services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed blob metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NoteError {
    /// Missing, empty or conflicting input. Raised before any backend call
    /// by the controller, or by the record service on a constraint violation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Blob lookup miss.
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl NoteError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Service(ServiceError::Unavailable(message.into()))
    }
}

impl From<tokio_postgres::Error> for NoteError {
    fn from(e: tokio_postgres::Error) -> Self {
        Self::Service(ServiceError::Database(e))
    }
}

impl From<std::io::Error> for NoteError {
    fn from(e: std::io::Error) -> Self {
        Self::Service(ServiceError::Io(e))
    }
}

impl From<serde_json::Error> for NoteError {
    fn from(e: serde_json::Error) -> Self {
        Self::Service(ServiceError::Metadata(e))
    }
}
