//! Request timing.
//!
//! Measures each request end to end and reports method, path, final status,
//! latency and (if any) the handler error to a [`RequestObserver`]. The
//! default observer, [`LogObserver`], turns that into one structured
//! `tracing` event per request.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::HeaderMap;
use tracing::info;

use crate::handler::{BoxFuture, BoxedHandler, Handler, HandlerResult};
use crate::method::Method;
use crate::request::Request;
use crate::response::ResponseSink;

/// What the timing middleware saw for one request.
#[derive(Clone, Debug)]
pub struct RequestRecord {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub status: u16,
    pub elapsed: Duration,
    pub error: Option<String>,
}

/// Receives one [`RequestRecord`] per request.
pub trait RequestObserver: Send + Sync + 'static {
    fn observe(&self, record: &RequestRecord);
}

/// Emits every record as an info-level event.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl RequestObserver for LogObserver {
    fn observe(&self, r: &RequestRecord) {
        match &r.error {
            None => info!(
                method = %r.method,
                path = %r.path,
                query = r.query.as_deref().unwrap_or(""),
                status = r.status,
                took = ?r.elapsed,
                "timer"
            ),
            Some(error) => info!(
                method = %r.method,
                path = %r.path,
                query = r.query.as_deref().unwrap_or(""),
                status = r.status,
                took = ?r.elapsed,
                error = %error,
                "timer"
            ),
        }
    }
}

/// Timing middleware reporting to [`LogObserver`].
pub fn timing(inner: BoxedHandler) -> BoxedHandler {
    Arc::new(Timing { inner, observer: Arc::new(LogObserver) })
}

/// Timing middleware reporting to `observer`.
pub fn timing_with(
    observer: Arc<dyn RequestObserver>,
) -> impl Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static {
    move |inner: BoxedHandler| -> BoxedHandler { Arc::new(Timing { inner, observer: Arc::clone(&observer) }) }
}

struct Timing {
    inner: BoxedHandler,
    observer: Arc<dyn RequestObserver>,
}

impl Handler for Timing {
    fn call<'a>(&'a self, w: &'a mut dyn ResponseSink, req: Request) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let start = Instant::now();
            let method = req.method();
            let path = req.path().to_owned();
            let query = req.query().map(str::to_owned);

            let mut recorder = StatusRecorder::new(w);
            let result = self.inner.call(&mut recorder, req).await;

            // An error nobody wrote yet is answered by the translator with
            // its own status; nothing written at all goes out as 200.
            let status = recorder
                .recorded()
                .or_else(|| result.as_ref().err().map(|e| e.status()))
                .unwrap_or(200);

            self.observer.observe(&RequestRecord {
                method,
                path,
                query,
                status,
                elapsed: start.elapsed(),
                error: result.as_ref().err().map(ToString::to_string),
            });

            result
        })
    }
}

/// A [`ResponseSink`] decorator that remembers the status written through it.
///
/// Every call is forwarded unchanged. Only the first status is recorded; a
/// body write before any status records `200`.
pub struct StatusRecorder<'a> {
    inner: &'a mut dyn ResponseSink,
    status: Option<u16>,
}

impl<'a> StatusRecorder<'a> {
    pub fn new(inner: &'a mut dyn ResponseSink) -> Self {
        Self { inner, status: None }
    }

    /// The status written through this recorder, if any.
    pub fn recorded(&self) -> Option<u16> {
        self.status
    }
}

impl ResponseSink for StatusRecorder<'_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: u16) {
        self.status.get_or_insert(status);
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.status.get_or_insert(200);
        self.inner.write(buf)
    }

    fn status(&self) -> Option<u16> {
        self.inner.status()
    }
}
