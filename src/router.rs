//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. The router does not
//! apply middleware itself; routes are registered already wrapped (see
//! [`routes`](crate::routes)).

use std::collections::HashMap;
use std::sync::Arc;

use http::HeaderValue;
use http::header::ALLOW;
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, respond};
use crate::method::Method;
use crate::request::Request;
use crate::response::{ResponseSink, ResponseWriter};
use crate::status::Status;

/// The application router.
///
/// Build it once at startup; hand it to [`Server::bind`](crate::Server::bind).
/// Each registration returns `self` so calls chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered. Routes are fixed at startup, so this is a wiring bug.
    pub fn on(mut self, method: Method, path: &str, handler: BoxedHandler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: BoxedHandler) -> Self {
        self.on(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: BoxedHandler) -> Self {
        self.on(Method::Post, path, handler)
    }

    pub(crate) fn lookup(
        &self,
        method: Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(&method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    /// Methods with a route matching `path`, in wire-name order.
    pub(crate) fn allowed(&self, path: &str) -> Vec<Method> {
        let mut methods: Vec<Method> = self.routes.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| *method)
            .collect();
        methods.sort_by_key(|m| m.as_str());
        methods
    }

    /// Routes one request and runs it to a finished response.
    ///
    /// Unknown paths get an empty `404` and known paths with another method
    /// an empty `405` listing the allowed ones, both without touching any
    /// handler.
    pub async fn dispatch(&self, mut req: Request) -> ResponseWriter {
        let Some((handler, params)) = self.lookup(req.method(), req.path()) else {
            let allowed = self.allowed(req.path());
            if allowed.is_empty() {
                return ResponseWriter::with_status(Status::NotFound);
            }
            let mut w = ResponseWriter::with_status(Status::MethodNotAllowed);
            let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                w.headers_mut().insert(ALLOW, value);
            }
            return w;
        };
        req.params = params;

        let mut w = ResponseWriter::new();
        respond(&*handler, &mut w as &mut dyn ResponseSink, req).await;
        w
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::handler::handler_fn;

    fn echo_key() -> BoxedHandler {
        handler_fn(|w, req| {
            Box::pin(async move {
                w.write(req.param("key").unwrap_or("-").as_bytes())?;
                Ok::<_, HandlerError>(())
            })
        })
    }

    #[tokio::test]
    async fn extracts_path_params() {
        let router = Router::new().get("/lookup/{key}", echo_key());
        let w = router.dispatch(Request::new(Method::Get, "/lookup/abc")).await;
        assert_eq!(w.status_code(), 200);
        assert_eq!(w.body(), b"abc");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let router = Router::new().get("/lookup/{key}", echo_key());
        let w = router.dispatch(Request::new(Method::Get, "/nope")).await;
        assert_eq!(w.status_code(), 404);
        assert!(w.headers().get(ALLOW).is_none());
    }

    #[tokio::test]
    async fn wrong_method_is_405_with_allow() {
        let router = Router::new()
            .get("/lookup/{key}", echo_key())
            .post("/lookup/{key}", echo_key());

        let w = router.dispatch(Request::new(Method::Put, "/lookup/a")).await;
        assert_eq!(w.status_code(), 405);
        assert_eq!(w.headers()[ALLOW], "GET, POST");
        assert!(w.body().is_empty());
    }
}
