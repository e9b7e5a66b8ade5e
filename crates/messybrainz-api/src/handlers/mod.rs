// SPDX-License-Identifier: GPL-3.0-or-later
pub mod clusters;
pub mod recordings;
pub mod submit;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use messybrainz_application::{ClusterError, ResolutionError};
use messybrainz_domain::RecordingId;
use serde::Serialize;
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// A failed request, rendered as `{"error": ...}` with a matching status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(id: RecordingId) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("recording {id} not found"))
    }

    fn unavailable(source: &dyn std::error::Error) -> Self {
        error!(target: "api", error = %source, "storage failure");
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "storage is unavailable, try again later")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        debug!(target: "api", status = %self.status, error = %self.message, "request failed");
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

impl From<ResolutionError> for ApiError {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::InvalidInput { reason, .. } => Self::bad_request(reason),
            ResolutionError::UnknownId(id) => Self::not_found(id),
            ResolutionError::Storage(source) => Self::unavailable(&source),
        }
    }
}

impl From<ClusterError> for ApiError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::UnknownId(id) => Self::not_found(id),
            ClusterError::Storage(source) => Self::unavailable(&source),
        }
    }
}

/// Parse a path or body id, rejecting anything that is not a UUID.
pub(crate) fn parse_recording_id(value: &str) -> Result<RecordingId, ApiError> {
    value
        .trim()
        .parse::<RecordingId>()
        .map_err(|_| ApiError::bad_request(format!("{value:?} is not a valid recording id")))
}
