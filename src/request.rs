//! Incoming HTTP request type.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;

use crate::error::BoxError;
use crate::method::Method;

/// An incoming HTTP request with its body fully read.
///
/// Handlers receive it by value; it is owned by exactly one middleware chain
/// for the duration of the call.
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Option<String>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
}

/// Largest request body read into memory.
pub(crate) const MAX_BODY_BYTES: usize = 1 << 20;

/// Why a hyper request could not be turned into a [`Request`].
#[derive(Debug)]
pub(crate) enum RequestError {
    Method,
    TooLarge,
    TimedOut,
    Body(BoxError),
}

impl Request {
    /// Builds a request by hand. The server uses [`Request::from_hyper`];
    /// this is for tests and for calling a [`Router`](crate::Router) directly.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
        }
    }

    /// Adds a header. Invalid names or values are dropped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Reads the whole body, at most `max_body` bytes and within `read_timeout`.
    pub(crate) async fn from_hyper<B>(
        req: http::Request<B>,
        max_body: usize,
        read_timeout: Duration,
    ) -> Result<Self, RequestError>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let method = Method::try_from(&parts.method).map_err(|()| RequestError::Method)?;
        let body = tokio::time::timeout(read_timeout, Limited::new(body, max_body).collect())
            .await
            .map_err(|_| RequestError::TimedOut)?
            .map_err(|e| {
                if e.is::<LengthLimitError>() {
                    RequestError::TooLarge
                } else {
                    RequestError::Body(e)
                }
            })?
            .to_bytes();

        Ok(Self {
            method,
            path: parts.uri.path().to_owned(),
            query: parts.uri.query().map(str::to_owned),
            headers: parts.headers,
            body,
            params: HashMap::new(),
        })
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query(&self) -> Option<&str> { self.query.as_deref() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup. Values that are not visible ASCII
    /// read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/lookup/{key}`, `req.param("key")` on `/lookup/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}
