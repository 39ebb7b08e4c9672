//! The response sink handlers write into.
//!
//! Handlers never build a response value. They write a status, headers and
//! body bytes into a [`ResponseSink`], and the server converts the buffered
//! [`ResponseWriter`] into a hyper response once the whole middleware chain
//! has returned. Middleware can decorate the sink (see
//! [`StatusRecorder`](crate::middleware::timing::StatusRecorder)) without the
//! handler noticing.

use std::io;

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use http_body_util::Full;
use serde::Serialize;
use tracing::debug;

use crate::error::HandlerError;
use crate::status::Status;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content types kvgate writes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Json, // application/json
    Text, // text/plain; charset=utf-8
}

impl ContentType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Text => "text/plain; charset=utf-8",
        }
    }

    /// Sets the `content-type` header on `w`, replacing any previous value.
    pub fn apply(self, w: &mut dyn ResponseSink) {
        w.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(self.as_str()));
    }
}

// ── ResponseSink ──────────────────────────────────────────────────────────────

/// Where a handler writes its response.
///
/// Mirrors the usual "header, then body" contract: the first call to
/// [`write_header`](ResponseSink::write_header) commits the status; a
/// [`write`](ResponseSink::write) before any status commits `200`. Later
/// status writes are ignored.
pub trait ResponseSink: Send {
    fn headers_mut(&mut self) -> &mut HeaderMap;

    fn write_header(&mut self, status: u16);

    fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    /// The committed status, or `None` if the response has not started.
    fn status(&self) -> Option<u16>;
}

/// Serializes `value` and writes it as a JSON response with `status`.
///
/// Serialization happens before anything is written, so a failure leaves
/// the sink untouched and the error translator free to respond.
pub fn json<T: Serialize + ?Sized>(
    w: &mut dyn ResponseSink,
    status: impl Into<u16>,
    value: &T,
) -> Result<(), HandlerError> {
    let body = serde_json::to_vec(value)?;
    ContentType::Json.apply(w);
    w.write_header(status.into());
    w.write(&body)?;
    Ok(())
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// The buffered [`ResponseSink`] the server hands to each request.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    status: Option<u16>,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A response that is only a status line.
    pub fn with_status(status: Status) -> Self {
        let mut w = Self::new();
        w.write_header(status.into());
        w
    }

    /// The status that will be sent: the committed one, or `200` if the
    /// handler never wrote anything.
    pub fn status_code(&self) -> u16 {
        self.status.unwrap_or(200)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let status = http::StatusCode::from_u16(self.status_code())
            .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
        let mut res = http::Response::new(Full::new(self.body.freeze()));
        *res.status_mut() = status;
        *res.headers_mut() = self.headers;
        res
    }
}

impl ResponseSink for ResponseWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: u16) {
        match self.status {
            None => self.status = Some(status),
            Some(current) => debug!(current, ignored = status, "superfluous write_header call"),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.status.is_none() {
            self.status = Some(200);
        }
        self.body.extend_from_slice(buf);
        Ok(())
    }

    fn status(&self) -> Option<u16> {
        self.status
    }
}
