//! Centralized error types for the SyncSong core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to machine-readable codes carried by `error` envelopes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Error returned by the session registry for a rejected operation.
///
/// Registry errors are only ever delivered to the connection that caused
/// them; they never interrupt other members or end the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Unknown session code.
    #[error("{0}")]
    NotFound(String),

    /// Caller lacks the authority for the operation.
    #[error("{0}")]
    Forbidden(String),

    /// Malformed message, track, or reorder payload.
    #[error("{0}")]
    InvalidInput(String),

    /// A control request was forwarded but the host connection is gone.
    #[error("{0}")]
    HostUnavailable(String),

    /// The connection has not created or joined a session.
    #[error("Not in a valid session")]
    NotInSession,

    /// Internal error (code exhaustion and similar).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ErrorCode for SyncError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidInput(_) => "invalid_input",
            Self::HostUnavailable(_) => "host_unavailable",
            Self::NotInSession => "not_in_session",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl SyncError {
    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InvalidInput(_) | Self::NotInSession => StatusCode::BAD_REQUEST,
            Self::HostUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for registry operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
