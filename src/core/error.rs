use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::shared::constants::{
    CODE_BAD_REQUEST, CODE_BATCH_UPLOAD_FAILED, CODE_DATABASE_ERROR, CODE_EMPTY_FILE,
    CODE_FILE_TOO_LARGE, CODE_FILE_TYPE_NOT_ALLOWED, CODE_INTERNAL_ERROR, CODE_NOT_FOUND,
    CODE_REQUEST_TOO_LARGE, CODE_STORAGE_ERROR, CODE_UNAUTHORIZED, CODE_VALIDATION_ERROR,
};
use crate::shared::types::ApiResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("File is empty")]
    EmptyFile,

    #[error("File type not allowed: {0}")]
    FileTypeNotAllowed(String),

    #[error("File too large: {size} bytes exceeds limit of {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Request body exceeds limit of {limit} bytes")]
    RequestTooLarge { limit: u64 },

    #[error("All files in the batch failed to upload")]
    BatchUploadFailed(Vec<String>),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Storage(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_)
            | AppError::EmptyFile
            | AppError::BatchUploadFailed(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::FileTypeNotAllowed(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::FileTooLarge { .. } | AppError::RequestTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => CODE_DATABASE_ERROR,
            AppError::NotFound(_) => CODE_NOT_FOUND,
            AppError::Validation(_) => CODE_VALIDATION_ERROR,
            AppError::EmptyFile => CODE_EMPTY_FILE,
            AppError::FileTypeNotAllowed(_) => CODE_FILE_TYPE_NOT_ALLOWED,
            AppError::FileTooLarge { .. } => CODE_FILE_TOO_LARGE,
            AppError::RequestTooLarge { .. } => CODE_REQUEST_TOO_LARGE,
            AppError::BatchUploadFailed(_) => CODE_BATCH_UPLOAD_FAILED,
            AppError::Storage(_) => CODE_STORAGE_ERROR,
            AppError::BadRequest(_) => CODE_BAD_REQUEST,
            AppError::Unauthorized(_) => CODE_UNAUTHORIZED,
            AppError::Internal(_) => CODE_INTERNAL_ERROR,
        }
    }

    /// Message safe to show to the caller. Server-side failures never expose
    /// their internal detail (paths, SQL, OS errors).
    pub fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Database error occurred".to_string(),
            AppError::Storage(_) => "Failed to store file".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::BadRequest(msg)
            | AppError::Unauthorized(msg) => msg.clone(),
            AppError::EmptyFile => "File must not be empty".to_string(),
            AppError::FileTypeNotAllowed(content_type) => {
                format!("File type '{}' is not allowed", content_type)
            }
            AppError::FileTooLarge { max, .. } => format!(
                "File too large. Maximum size is {} bytes ({} MB)",
                max,
                max / 1024 / 1024
            ),
            AppError::RequestTooLarge { limit } => format!(
                "Request too large. Maximum request size is {} bytes",
                limit
            ),
            AppError::BatchUploadFailed(errors) => {
                format!("All files failed to upload: {}", errors.join("; "))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Database(e) => tracing::error!("Database error: {:?}", e),
            AppError::Storage(msg) => tracing::error!("Storage error: {}", msg),
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            _ => {}
        }

        let status = self.status();
        let code = self.code();
        let message = self.client_message();
        let errors = match self {
            AppError::Validation(msg) => Some(vec![msg]),
            AppError::BatchUploadFailed(errors) => Some(errors),
            _ => None,
        };

        let body = Json(ApiResponse::<()>::error(code, Some(message), errors));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_hide_internal_detail() {
        let err = AppError::Storage("write /srv/uploads/7/2025/01/01/x.pdf: EACCES".to_string());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), CODE_STORAGE_ERROR);
        assert!(!err.client_message().contains("/srv/uploads"));
    }

    #[test]
    fn test_upload_validation_statuses() {
        assert_eq!(AppError::EmptyFile.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::FileTypeNotAllowed("text/html".to_string()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            AppError::FileTooLarge { size: 11, max: 10 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        let err = AppError::RequestTooLarge { limit: 2048 };
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.code(), CODE_REQUEST_TOO_LARGE);
        assert!(err.client_message().contains("2048"));
        assert_eq!(
            AppError::Unauthorized("Authentication required".to_string()).code(),
            CODE_UNAUTHORIZED
        );
    }
}
