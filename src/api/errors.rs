//! API Error Handling
//!
//! Room errors mapped onto HTTP status codes, tagged with the request id.

use crate::errors::{ErrorCategory, RoomError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

/// Failure body; mirrors the `{success, message, code}` envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub request_id: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    BadRequest(String),
    Room(RoomError),
}

impl ApiError {
    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn room(request_id: String, error: RoomError) -> Self {
        Self {
            kind: ApiErrorKind::Room(error),
            request_id,
        }
    }

    pub fn status(&self) -> StatusCode {
        match &self.kind {
            ApiErrorKind::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiErrorKind::Room(e) => status_for(e),
        }
    }
}

/// HTTP status for a room error
pub fn status_for(error: &RoomError) -> StatusCode {
    match error {
        RoomError::RoomNotFound(_) | RoomError::InvalidCard(_) => StatusCode::NOT_FOUND,
        RoomError::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,
        other => match other.category() {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::StateConflict => StatusCode::CONFLICT,
            ErrorCategory::Concurrency => StatusCode::TOO_MANY_REQUESTS,
            ErrorCategory::Store => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::BadRequest(msg) => write!(f, "[{}] Bad Request: {}", self.request_id, msg),
            ApiErrorKind::Room(e) => write!(f, "[{}] {}: {}", self.request_id, e.code(), e),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match &self.kind {
            ApiErrorKind::BadRequest(msg) => ("BAD_REQUEST".to_string(), msg.clone()),
            ApiErrorKind::Room(e) => {
                if e.category() == ErrorCategory::Store {
                    error!(request_id = %self.request_id, error = %e, "store failure");
                }
                (e.code().to_string(), e.public_message())
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            request_id: self.request_id,
            code,
            message,
        });

        (status, body).into_response()
    }
}
