// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified error taxonomy shared across the HTTP surfaces of every service
//! in this workspace (§7 of the spec). Mirrors the closed-enum-mapped-to-
//! HTTP-status shape used elsewhere in this codebase (`MuxError`): a small
//! fixed set of variants, each with an HTTP status and a machine-readable
//! code string, so clients can branch on `error.code` without parsing
//! messages.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppError {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    IdempotencyConflict,
    Expired,
    Internal,
}

impl AppError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::IdempotencyConflict => StatusCode::CONFLICT,
            Self::Expired => StatusCode::GONE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            Self::Expired => "EXPIRED",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    /// Build an axum response with the given human-readable message.
    pub fn with_message(&self, message: impl Into<String>) -> AppErrorResponse {
        AppErrorResponse { error: *self, message: message.into() }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for AppError {}

/// An `AppError` paired with a human-readable message, ready to become an
/// axum response. Internal error detail (DB errors, I/O errors) is logged
/// via `tracing` at the point this is constructed from an `anyhow::Error`
/// and never placed in `message` for the `Internal` variant, so it never
/// reaches the client.
#[derive(Debug, Clone)]
pub struct AppErrorResponse {
    pub error: AppError,
    pub message: String,
}

impl AppErrorResponse {
    pub fn internal(source: impl fmt::Display) -> Self {
        tracing::error!(error = %source, "internal error");
        Self { error: AppError::Internal, message: "internal error".to_owned() }
    }
}

impl IntoResponse for AppErrorResponse {
    fn into_response(self) -> Response {
        let body = ErrorResponse { error: self.error.to_error_body(self.message) };
        (self.error.http_status(), Json(body)).into_response()
    }
}

impl From<AppError> for AppErrorResponse {
    fn from(error: AppError) -> Self {
        Self { error, message: error.as_str().to_owned() }
    }
}

/// Top-level error response envelope returned on every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
