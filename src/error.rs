//! # Error Handling
//!
//! Two error layers live here:
//!
//! - [`BridgeError`] covers faults on the translation bridge itself: wire
//!   framing problems, upstream transport/engine failures, and session
//!   teardown conditions. These never cross the HTTP boundary directly;
//!   the WebSocket actor decides what (if anything) is surfaced to the
//!   client as an `error` envelope.
//! - [`AppError`] covers the REST surface (config, sessions, health) and
//!   converts to JSON HTTP responses via `ResponseError`.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Faults on the realtime translation bridge.
///
/// Propagation policy: every variant terminates (at most) the session it
/// occurred on, never the process or other sessions. `Framing` does not
/// even terminate the session; the offending frame is logged and dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Malformed or truncated upstream wire frame. The single frame is
    /// dropped; the session continues.
    Framing(String),

    /// The upstream transport could not be established. Surfaced to the
    /// client as an `error` envelope; the session moves to Failed.
    UpstreamUnavailable(String),

    /// The engine rejected the session with a failure message, which is
    /// surfaced to the client verbatim.
    UpstreamRejected(String),

    /// The Finishing grace period elapsed without an upstream
    /// acknowledgement. The session is forced Closed; nothing is surfaced
    /// since the client already asked to stop.
    SessionTimeout,

    /// The browser connection went away. Triggers a best-effort upstream
    /// finish, then teardown; there is no client left to notify.
    ClientDisconnected,
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Framing(msg) => write!(f, "framing error: {}", msg),
            BridgeError::UpstreamUnavailable(msg) => {
                write!(f, "upstream unavailable: {}", msg)
            }
            BridgeError::UpstreamRejected(msg) => write!(f, "upstream rejected session: {}", msg),
            BridgeError::SessionTimeout => write!(f, "session finish grace period elapsed"),
            BridgeError::ClientDisconnected => write!(f, "client disconnected"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl BridgeError {
    /// Convenience constructor for truncation faults in the wire codec.
    pub fn truncated(what: &str, offset: usize) -> Self {
        BridgeError::Framing(format!("truncated {} at offset {}", what, offset))
    }
}

/// Errors for the HTTP surface.
#[derive(Debug)]
pub enum AppError {
    /// Server-side problems (500)
    Internal(String),

    /// Client sent invalid or malformed data (400)
    BadRequest(String),

    /// Requested resource was not found (404)
    NotFound(String),

    /// Configuration file or environment variable problems (500)
    ConfigError(String),

    /// Input failed validation rules (400)
    ValidationError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "not_found",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            AppError::ValidationError(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
