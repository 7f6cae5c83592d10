//! Error types for the upload engine

use std::io;
use std::path::{Path, PathBuf};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Upload-engine result type
pub type Result<T> = std::result::Result<T, UploadError>;

/// Upload error types
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Invalid name: {0}")]
    NamingFormat(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Upload incomplete for {session_key}: {present} of {expected} slices present")]
    Incomplete {
        session_key: String,
        present: usize,
        expected: usize,
    },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Storage error at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl UploadError {
    /// Wrap an I/O failure together with the path it happened on
    pub fn storage(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Storage {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Underlying I/O error kind, if this is a storage failure
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Storage { source, .. } => Some(source.kind()),
            _ => None,
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NamingFormat(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::Incomplete { .. } => StatusCode::CONFLICT,
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::Storage { source, .. } => match source.kind() {
                io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
                io::ErrorKind::StorageFull => StatusCode::INSUFFICIENT_STORAGE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::NamingFormat(_) => "NAMING_FORMAT",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::Incomplete { .. } => "INCOMPLETE_UPLOAD",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::Storage { .. } => "STORAGE_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "Upload request failed");
        } else {
            tracing::debug!(error = %self, "Upload request rejected");
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}
