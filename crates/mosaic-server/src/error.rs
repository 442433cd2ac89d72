use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mosaic_core::{CommitError, DeleteError, PlacementId, ServiceError};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid placement: {0}")]
    InvalidProposal(String),

    #[error("Overlaps an existing tile")]
    OverlapConflict(PlacementId),

    #[error("Not authorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("Image exceeds maximum of {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Unsupported image format")]
    UnsupportedMediaType,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidGeometry(_) | ApiError::InvalidProposal(_) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::OverlapConflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error kind included in every error body.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidGeometry(_) => "invalid_geometry",
            ApiError::InvalidProposal(_) => "invalid_proposal",
            ApiError::OverlapConflict(_) => "overlap_conflict",
            ApiError::Unauthorized => "unauthorized",
            ApiError::NotFound => "not_found",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::UnsupportedMediaType => "unsupported_media_type",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl From<CommitError> for ApiError {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::InvalidGeometry(e) => ApiError::InvalidGeometry(e.to_string()),
            CommitError::InvalidProposal(msg) => ApiError::InvalidProposal(msg),
            CommitError::OverlapConflict(id) => ApiError::OverlapConflict(id),
        }
    }
}

impl From<DeleteError> for ApiError {
    fn from(err: DeleteError) -> Self {
        match err {
            DeleteError::Unauthorized => ApiError::Unauthorized,
            DeleteError::NotFound(_) => ApiError::NotFound,
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Commit(e) => e.into(),
            ServiceError::Delete(e) => e.into(),
            ServiceError::UnsupportedImage => ApiError::UnsupportedMediaType,
            ServiceError::ImageNotFound(_) => ApiError::NotFound,
            ServiceError::Storage(e) => ApiError::Internal(e.to_string()),
            e @ ServiceError::ClearIncomplete { .. } => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::OverlapConflict(id) => json!({
                "error": self.to_string(),
                "kind": self.kind(),
                "conflicting_id": id,
            }),
            ApiError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                json!({ "error": self.to_string(), "kind": self.kind() })
            }
            _ => json!({ "error": self.to_string(), "kind": self.kind() }),
        };
        (status, Json(body)).into_response()
    }
}
