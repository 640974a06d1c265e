use axum::{
    extract::{multipart::MultipartError, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Everything a handler can answer with besides success.
///
/// The display string is what clients see in `{"detail": ...}`, so it never
/// carries internal error text for server side failures.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Model not found")]
    ModelNotFound,
    #[error("No file uploaded")]
    MissingFile,
    #[error("Invalid upload: {0}")]
    BadUpload(String),
    #[error("Uploaded file is too large")]
    PayloadTooLarge,
    #[error("Processing error")]
    Processing,
    #[error("Error during processing image: {0}")]
    BatchItem(String),
    #[error("Failed to read history")]
    History,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ModelNotFound | ApiError::MissingFile | ApiError::BadUpload(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Processing | ApiError::BatchItem(_) | ApiError::History => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::BadUpload(e.body_text())
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::BadUpload(e.body_text())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(ApiError::ModelNotFound.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::MissingFile.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::PayloadTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ApiError::Processing.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ApiError::BatchItem("b.png".into()).to_string(),
            "Error during processing image: b.png"
        );
    }
}
