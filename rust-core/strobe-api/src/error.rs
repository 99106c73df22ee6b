// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe API - Error types and HTTP status mapping

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use strobe_shard::ShardError;
use strobe_wire::ProtocolError;
use thiserror::Error;

/// Seconds a shed client is asked to wait.
const RETRY_AFTER_SECS: &str = "1";

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed query frame.
    #[error("{0}")]
    Protocol(#[from] ProtocolError),

    /// Malformed JSON or line body.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Query or ingest limit reached; retry later.
    #[error("overloaded: {0}")]
    Overloaded(String),

    /// The shard is not serving this kind of request.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The document belongs to another shard.
    #[error("{0}")]
    WrongShard(String),

    /// The document already exists.
    #[error("{0}")]
    Conflict(String),

    /// Server-side failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Protocol(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Overloaded(_) | ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::WrongShard(_) => StatusCode::MISDIRECTED_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable code, also used as a metrics label.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Protocol(_) => "PROTOCOL_ERROR",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Overloaded(_) => "OVERLOADED",
            ApiError::Unavailable(_) => "UNAVAILABLE",
            ApiError::WrongShard(_) => "WRONG_SHARD",
            ApiError::Conflict(_) => "DUPLICATE_DOCUMENT",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<ShardError> for ApiError {
    fn from(err: ShardError) -> Self {
        match err {
            ShardError::Protocol(err) => ApiError::Protocol(err),
            ShardError::Overloaded { .. } => ApiError::Overloaded(err.to_string()),
            ShardError::NotWritable(_) | ShardError::NotReadable(_) => {
                ApiError::Unavailable(err.to_string())
            }
            ShardError::WrongShard { .. } => ApiError::WrongShard(err.to_string()),
            ShardError::DuplicateDocument(_) => ApiError::Conflict(err.to_string()),
            ShardError::Durability(_)
            | ShardError::Recovery(_)
            | ShardError::Config(_)
            | ShardError::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable message.
    pub error: String,
    /// Machine-readable code.
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        if matches!(self, ApiError::Overloaded(_)) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}
