// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Engine error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Engine error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("A recording session is already active")]
    AlreadyRecording,

    #[error("No recording session is active")]
    NotRecording,

    #[error("Remote store unreachable: {0}")]
    TransientNetwork(String),

    #[error("Remote store rejected request: {0}")]
    NonTransientRemote(String),

    #[error("Local store corrupted: {0}")]
    LocalStoreCorruption(String),

    #[error("Position at {timestamp} is older than the last recorded position")]
    OutOfOrderPosition { timestamp: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Coarse error class shown to users instead of raw transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Geometry,
    Session,
    TransientNetwork,
    NonTransientRemote,
    LocalStore,
    Request,
    Internal,
}

impl AppError {
    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientNetwork(_))
    }

    /// Whether the recorder must stop capturing after this error.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, AppError::LocalStoreCorruption(_))
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::InvalidGeometry(_) => ErrorClass::Geometry,
            AppError::AlreadyRecording | AppError::NotRecording => ErrorClass::Session,
            AppError::TransientNetwork(_) => ErrorClass::TransientNetwork,
            AppError::NonTransientRemote(_) => ErrorClass::NonTransientRemote,
            AppError::LocalStoreCorruption(_) => ErrorClass::LocalStore,
            AppError::OutOfOrderPosition { .. }
            | AppError::NotFound(_)
            | AppError::BadRequest(_) => ErrorClass::Request,
            AppError::Internal(_) => ErrorClass::Internal,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::BadRequest(errors.to_string())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::InvalidGeometry(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_geometry",
                Some(msg.clone()),
            ),
            AppError::AlreadyRecording => (StatusCode::CONFLICT, "already_recording", None),
            AppError::NotRecording => (StatusCode::CONFLICT, "not_recording", None),
            AppError::TransientNetwork(msg) => {
                tracing::warn!(error = %msg, "Remote store unreachable");
                (StatusCode::SERVICE_UNAVAILABLE, "offline", None)
            }
            AppError::NonTransientRemote(msg) => {
                (StatusCode::BAD_GATEWAY, "remote_rejected", Some(msg.clone()))
            }
            AppError::LocalStoreCorruption(msg) => {
                tracing::error!(error = %msg, "Local store corruption");
                (StatusCode::INTERNAL_SERVER_ERROR, "local_store_error", None)
            }
            AppError::OutOfOrderPosition { .. } => {
                (StatusCode::BAD_REQUEST, "out_of_order", Some(self.to_string()))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for engine operations and handlers
pub type Result<T> = std::result::Result<T, AppError>;
