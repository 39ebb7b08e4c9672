//! The handler contract and type erasure.
//!
//! # Contract
//!
//! A handler receives the response sink and the request and either
//! completes with `Ok(())`, having written the full response, or returns a
//! [`HandlerError`] and writes nothing further. It never translates its own
//! errors: that happens once, in [`respond`], after the whole middleware chain
//! has returned.
//!
//! # How handlers are stored
//!
//! The router holds handlers of different concrete types, and middleware
//! wraps them in further types, so everything is stored as a trait object:
//!
//! ```text
//! LookupEndpoint { store, .. }            ← route handler
//!        ↓ Stack::apply
//! Timing { Auth { LookupEndpoint } }      ← middleware layers
//!        ↓ stored as BoxedHandler = Arc<dyn Handler>
//! handler.call(&mut w, req)  at request time
//!        ↓
//! Box::pin(async { … })                   ← BoxFuture borrowing `w`
//! ```
//!
//! The per-request cost is one `Arc` clone plus one virtual call per layer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{HandlerError, write_error};
use crate::request::Request;
use crate::response::ResponseSink;

/// A heap-allocated, type-erased future.
///
/// `'a` lets the future borrow the response sink for the duration of the
/// call; `Send` lets tokio move it across worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What every handler resolves to.
pub type HandlerResult = Result<(), HandlerError>;

/// A unit of request handling: a route endpoint or a middleware layer.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, w: &'a mut dyn ResponseSink, req: Request) -> BoxFuture<'a, HandlerResult>;
}

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

/// Turns a closure into a [`BoxedHandler`].
///
/// ```rust
/// use kvgate::HandlerError;
/// use kvgate::handler::handler_fn;
///
/// let hello = handler_fn(|w, _req| {
///     Box::pin(async move {
///         w.write(b"hello")?;
///         Ok::<_, HandlerError>(())
///     })
/// });
/// ```
pub fn handler_fn<F>(f: F) -> BoxedHandler
where
    F: for<'a> Fn(&'a mut dyn ResponseSink, Request) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnHandler(f))
}

/// Newtype wrapper that holds a closure and implements [`Handler`].
struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut dyn ResponseSink, Request) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(&'a self, w: &'a mut dyn ResponseSink, req: Request) -> BoxFuture<'a, HandlerResult> {
        (self.0)(w, req)
    }
}

/// Runs `handler` to completion and translates its error, if any.
///
/// This is the outermost boundary of every request and the only caller of
/// [`write_error`].
pub async fn respond(handler: &dyn Handler, w: &mut dyn ResponseSink, req: Request) {
    if let Err(err) = handler.call(&mut *w, req).await {
        write_error(w, &err);
    }
}
