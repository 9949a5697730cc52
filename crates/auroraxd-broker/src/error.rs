// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Unified error hierarchy for the HTTP surface, mirroring each variant to
/// an HTTP status and (where the variant can also arise on a WebSocket) the
/// matching close code from [`auroraxd_protocol::close_codes`].
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            BrokerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            BrokerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            BrokerError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            BrokerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerError::Unauthorized(_) => "unauthorized",
            BrokerError::BadRequest(_) => "bad_request",
            BrokerError::SessionNotFound(_) => "session_not_found",
            BrokerError::Internal(_) => "internal_error",
        }
    }

    /// WebSocket close code a protocol-phase instance of this error maps to.
    pub fn ws_close_code(&self) -> u16 {
        match self {
            BrokerError::Unauthorized(_) => auroraxd_protocol::close_codes::POLICY_VIOLATION,
            BrokerError::BadRequest(_) => auroraxd_protocol::close_codes::INVALID_HELLO,
            BrokerError::SessionNotFound(_) => auroraxd_protocol::close_codes::POLICY_VIOLATION,
            BrokerError::Internal(_) => auroraxd_protocol::close_codes::INTERNAL_ERROR,
        }
    }

    pub fn to_error_body(&self) -> ErrorResponse {
        ErrorResponse { error: ErrorBody { code: self.as_str().to_owned(), message: self.to_string() } }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let body = self.to_error_body();
        (status, axum::Json(body)).into_response()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("auroraxd is already running for this workspace (pid {pid}, lock {lock_path})")]
    AlreadyRunning { pid: u32, lock_path: std::path::PathBuf },

    #[error("I/O error acquiring workspace lock: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize lock/discovery metadata: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("no free port found after {attempts} attempts")]
    NoFreePort { attempts: u32 },
}
