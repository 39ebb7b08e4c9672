//! Error types and the one place request errors become responses.
//!
//! Two families live here:
//!
//! - [`HandlerError`]: what a handler or middleware returns. It is either a
//!   client error with a status and a message that is safe to show, or an
//!   internal failure whose details stay in the server log.
//! - [`Error`]: process-level failures: binding the listener, loading
//!   configuration, connecting to the store, shutting down.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error};

use crate::config::ConfigError;
use crate::response::{ContentType, ResponseSink};
use crate::status::Status;
use crate::store::StoreError;

/// Boxed source of an internal failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ── HandlerError ──────────────────────────────────────────────────────────────

/// A classified request error.
///
/// Anything that is not explicitly a client error converts into
/// [`HandlerError::Internal`] and is answered with a plain `500`.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Caller-facing failure, serialized as `{"error": message}`.
    #[error("{message}")]
    Client { status: u16, message: String },

    /// Everything else.
    #[error(transparent)]
    Internal(BoxError),
}

impl HandlerError {
    pub fn client(status: impl Into<u16>, message: impl Into<String>) -> Self {
        Self::Client { status: status.into(), message: message.into() }
    }

    pub fn internal(err: impl Into<BoxError>) -> Self {
        Self::Internal(err.into())
    }

    /// The status [`write_error`] answers this error with.
    pub fn status(&self) -> u16 {
        match self {
            Self::Client { status, .. } => *status,
            Self::Internal(_) => Status::InternalServerError.into(),
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::internal(e)
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(e: std::io::Error) -> Self {
        Self::internal(e)
    }
}

impl From<StoreError> for HandlerError {
    fn from(e: StoreError) -> Self {
        Self::internal(e)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// Writes the client-visible response for `err`.
///
/// Called exactly once per request by [`respond`](crate::handler::respond).
/// If the response has already started (short-circuiting middleware wrote its
/// own status) this is a no-op, so a response is never written twice.
pub fn write_error(w: &mut dyn ResponseSink, err: &HandlerError) {
    if let Some(status) = w.status() {
        debug!(status, error = %err, "response already started, not translating error");
        return;
    }

    match err {
        HandlerError::Client { status, message } => {
            let body = match serde_json::to_vec(&ErrorBody { error: message }) {
                Ok(body) => body,
                Err(e) => {
                    error!(error = %e, "could not serialize error response");
                    return;
                }
            };
            ContentType::Json.apply(w);
            w.write_header(*status);
            if let Err(e) = w.write(&body) {
                error!(error = %e, "could not write error response");
            }
        }
        HandlerError::Internal(source) => {
            ContentType::Text.apply(w);
            w.write_header(Status::InternalServerError.into());
            if let Err(e) = w.write(source.to_string().as_bytes()) {
                error!(error = %e, "could not write error");
            }
        }
    }
}

// ── Error ─────────────────────────────────────────────────────────────────────

/// The error type returned by kvgate's process-level operations.
///
/// Request failures are [`HandlerError`]s and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot start store: {0}")]
    Store(#[from] StoreError),

    #[error("cannot open log file: {0}")]
    Logging(#[from] tracing_appender::rolling::InitError),

    #[error("{0} is not initialised")]
    NotInitialised(&'static str),

    #[error("listener is already serving")]
    AlreadyServing,

    #[error("shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),
}

#[cfg(test)]
mod tests {
    use http::header::CONTENT_TYPE;

    use super::*;
    use crate::response::ResponseWriter;

    #[test]
    fn client_error_is_json_envelope() {
        let mut w = ResponseWriter::new();
        write_error(&mut w, &HandlerError::client(Status::NotFound, "could not find k"));
        assert_eq!(w.status_code(), 404);
        assert_eq!(w.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(w.body(), br#"{"error":"could not find k"}"#);
    }

    #[test]
    fn internal_error_is_plain_500() {
        let mut w = ResponseWriter::new();
        write_error(&mut w, &StoreError::internal("connection reset").into());
        assert_eq!(w.status_code(), 500);
        assert_eq!(w.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        // the store's cause stays server side
        assert_eq!(w.body(), b"internal error");
    }

    #[test]
    fn started_response_is_left_alone() {
        let mut w = ResponseWriter::new();
        w.write_header(401);
        write_error(&mut w, &HandlerError::client(Status::Unauthorized, "No Authorization header"));
        assert_eq!(w.status_code(), 401);
        assert!(w.body().is_empty());
        assert!(w.headers().get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn status_of_unclassified_error_is_500() {
        let err: HandlerError = serde_json::from_slice::<serde_json::Value>(b"{").unwrap_err().into();
        assert_eq!(err.status(), 500);
        assert_eq!(HandlerError::client(401u16, "x").status(), 401);
    }
}
