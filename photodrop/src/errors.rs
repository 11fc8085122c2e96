use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

use crate::api::models::uploads::ErrorResponse;

#[derive(ThisError, Debug)]
pub enum Error {
    /// The multipart form carried no `file` field
    #[error("No file uploaded")]
    MissingFile,

    /// Declared content type of the file is not allowed
    #[error("Rejected content type {content_type:?}")]
    InvalidFileType { content_type: Option<String> },

    /// File (or the whole request body) exceeds the configured limit
    #[error("File exceeds {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    /// A file arrived under a field name other than `file`, or `file` was repeated
    #[error("Unexpected field {field:?}")]
    UnexpectedField { field: String },

    /// Malformed request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Filesystem failure while persisting the upload
    #[error("Failed to {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn io(operation: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Error::Io { operation, source }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingFile | Error::InvalidFileType { .. } | Error::UnexpectedField { .. } | Error::BadRequest { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Io { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::MissingFile => "No file uploaded".to_string(),
            Error::InvalidFileType { .. } => "Only image files are allowed".to_string(),
            Error::PayloadTooLarge { .. } => "File too large".to_string(),
            Error::UnexpectedField { .. } => "Unexpected field".to_string(),
            Error::BadRequest { message } => message.clone(),
            Error::Io { .. } | Error::Other(_) => "Failed to upload file".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Io { .. } | Error::Other(_) => {
                tracing::error!("Error in file upload: {:#}", self);
            }
            Error::PayloadTooLarge { .. } | Error::InvalidFileType { .. } => {
                tracing::info!("Upload rejected: {}", self);
            }
            Error::MissingFile | Error::UnexpectedField { .. } | Error::BadRequest { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = ErrorResponse {
            error: self.user_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Type alias for handler results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::{Value, json};

    async fn body_json(error: Error) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_missing_file_response() {
        let (status, body) = body_json(Error::MissingFile).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "No file uploaded" }));
    }

    #[tokio::test]
    async fn test_validation_errors_map_to_client_statuses() {
        let (status, body) = body_json(Error::InvalidFileType {
            content_type: Some("text/plain".to_string()),
        })
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Only image files are allowed");

        let (status, body) = body_json(Error::PayloadTooLarge { limit: 10 }).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "File too large");
    }

    #[tokio::test]
    async fn test_internal_errors_do_not_leak_details() {
        let err = Error::io("write upload")(std::io::Error::other("disk on fire at /var/secret"));
        assert!(err.to_string().contains("disk on fire"));

        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Failed to upload file" }));

        let (status, body) = body_json(anyhow::anyhow!("boom").into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to upload file");
    }
}
