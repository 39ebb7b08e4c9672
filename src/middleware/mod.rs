//! Middleware layer.
//!
//! A middleware is a pure transformer from handler to handler. Cross-cutting
//! concerns (request timing, authentication-header inspection) are written
//! as middleware and folded around each route once, at wiring time:
//!
//! ```text
//! Stack::new().with("timing", timing).with("auth", auth_inspector).apply(h)
//!
//!   request ─▶ timing ─▶ auth ─▶ h
//!   result  ◀─ timing ◀─ auth ◀─ h
//! ```
//!
//! The first middleware declared is the outermost layer: it runs first on the
//! way in and last on the way out.

pub mod auth;
pub mod timing;

use std::sync::Arc;

use crate::handler::BoxedHandler;

pub use auth::auth_inspector;
pub use timing::{LogObserver, RequestObserver, RequestRecord, timing};

/// Wraps a handler with additional behaviour.
///
/// Implemented for every `Fn(BoxedHandler) -> BoxedHandler`, so plain
/// functions such as [`timing`] are middleware as-is.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, inner: BoxedHandler) -> BoxedHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, inner: BoxedHandler) -> BoxedHandler {
        self(inner)
    }
}

/// A named, ordered sequence of middleware.
#[derive(Clone, Default)]
pub struct Stack {
    layers: Vec<(&'static str, Arc<dyn Middleware>)>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `middleware` as the next, more inner, layer.
    pub fn with(mut self, name: &'static str, middleware: impl Middleware) -> Self {
        self.layers.push((name, Arc::new(middleware)));
        self
    }

    /// Layer names, outermost first.
    pub fn names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|(name, _)| *name).collect()
    }

    /// Folds the stack around `handler`.
    pub fn apply(&self, handler: BoxedHandler) -> BoxedHandler {
        self.layers
            .iter()
            .rev()
            .fold(handler, |inner, (_, middleware)| middleware.wrap(inner))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::HandlerError;
    use crate::handler::{BoxFuture, Handler, HandlerResult, handler_fn, respond};
    use crate::method::Method;
    use crate::request::Request;
    use crate::response::{ResponseSink, ResponseWriter};

    type Trace = Arc<Mutex<Vec<String>>>;

    struct Tagged {
        tag: &'static str,
        trace: Trace,
        inner: BoxedHandler,
    }

    impl Handler for Tagged {
        fn call<'a>(&'a self, w: &'a mut dyn ResponseSink, req: Request) -> BoxFuture<'a, HandlerResult> {
            Box::pin(async move {
                self.trace.lock().unwrap().push(format!("enter {}", self.tag));
                let result = self.inner.call(w, req).await;
                self.trace.lock().unwrap().push(format!("leave {}", self.tag));
                result
            })
        }
    }

    fn tagged(tag: &'static str, trace: &Trace) -> impl Middleware {
        let trace = Arc::clone(trace);
        move |inner: BoxedHandler| -> BoxedHandler { Arc::new(Tagged { tag, trace: Arc::clone(&trace), inner }) }
    }

    #[tokio::test]
    async fn first_declared_is_outermost() {
        let trace = Trace::default();
        let inner_trace = Arc::clone(&trace);
        let handler = handler_fn(move |_w, _req| {
            let trace = Arc::clone(&inner_trace);
            Box::pin(async move {
                trace.lock().unwrap().push("handler".into());
                Ok::<_, HandlerError>(())
            })
        });

        let stack = Stack::new()
            .with("a", tagged("a", &trace))
            .with("b", tagged("b", &trace));
        assert_eq!(stack.names(), ["a", "b"]);

        let mut w = ResponseWriter::new();
        respond(&*stack.apply(handler), &mut w, Request::new(Method::Get, "/")).await;

        assert_eq!(
            *trace.lock().unwrap(),
            ["enter a", "enter b", "handler", "leave b", "leave a"]
        );
    }

    #[tokio::test]
    async fn empty_stack_is_identity() {
        let handler = handler_fn(|w, _req| {
            Box::pin(async move {
                w.write_header(202);
                Ok::<_, HandlerError>(())
            })
        });
        let mut w = ResponseWriter::new();
        respond(&*Stack::new().apply(handler), &mut w, Request::new(Method::Get, "/")).await;
        assert_eq!(w.status_code(), 202);
    }
}
