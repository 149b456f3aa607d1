/*
 * Copyright Nitro Agility S.r.l.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *      https://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Error types.

use axum::http::StatusCode;
use thiserror::Error as ThisError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Token broker error types
#[derive(Debug, ThisError)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Secret backend unreachable, timed out, or answered with a non-2xx status.
    ///
    /// The backend body is never inspected; only the status code is kept.
    #[error("secret backend unavailable during {operation}: {reason}")]
    Unavailable {
        operation: &'static str,
        status: Option<u16>,
        reason: String,
    },

    /// Missing or malformed caller input
    #[error("validation error: {0}")]
    Validation(String),

    /// No token was presented
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The presented token was rejected by the backend
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The privileged credential was rejected at startup
    #[error("invalid renewal credential: {0}")]
    InvalidRenewalCredential(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an `Unavailable` error for a transport failure (no status).
    pub fn transport(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Error::Unavailable {
            operation,
            status: None,
            reason: err.to_string(),
        }
    }

    /// Build an `Unavailable` error for a non-success status code.
    pub fn status(operation: &'static str, status: u16) -> Self {
        Error::Unavailable {
            operation,
            status: Some(status),
            reason: format!("HTTP {}", status),
        }
    }

    /// Backend status code, if the backend answered at all.
    pub fn backend_status(&self) -> Option<u16> {
        match self {
            Error::Unavailable { status, .. } => *status,
            _ => None,
        }
    }

    /// HTTP status surfaced to inbound callers.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
