//! The route table and its endpoints.
//!
//! | Method | Path | |
//! |---|---|---|
//! | GET  | `/version`      | build metadata |
//! | GET  | `/config`       | active configuration, secrets omitted |
//! | GET  | `/lookup/{key}` | read a value |
//! | POST | `/lookup/{key}` | write a value, body `{"value": "…"}` |
//!
//! Every route is wrapped, outermost first, in timing then auth inspection.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::HandlerError;
use crate::handler::{BoxFuture, BoxedHandler, Handler, HandlerResult, handler_fn};
use crate::middleware::{Stack, auth_inspector, timing};
use crate::request::Request;
use crate::response::{ResponseSink, json};
use crate::router::Router;
use crate::status::Status;
use crate::store::{Store, StoreError};
use crate::version::Version;

/// The middleware every route gets.
pub fn default_stack() -> Stack {
    Stack::new().with("timing", timing).with("auth", auth_inspector)
}

/// Builds the full route table.
pub fn router(config: &Config, version: &Version, store: Arc<dyn Store>) -> Router {
    router_with(default_stack(), config, version, store)
}

/// Builds the route table with a custom middleware stack.
pub fn router_with(
    stack: Stack,
    config: &Config,
    version: &Version,
    store: Arc<dyn Store>,
) -> Router {
    info!(middleware = ?stack.names(), "wiring routes");
    let request_timeout = config.timeouts.request();

    Router::new()
        .get("/version", stack.apply(version_endpoint(version.clone())))
        .get("/config", stack.apply(config_endpoint(config.clone())))
        .get(
            "/lookup/{key}",
            stack.apply(Arc::new(LookupEndpoint { store: Arc::clone(&store), request_timeout })),
        )
        .post(
            "/lookup/{key}",
            stack.apply(Arc::new(WriteEndpoint { store, request_timeout })),
        )
}

fn version_endpoint(version: Version) -> BoxedHandler {
    handler_fn(move |w, _req| {
        let result = json(w, Status::Ok, &version);
        Box::pin(async move { result })
    })
}

fn config_endpoint(config: Config) -> BoxedHandler {
    handler_fn(move |w, _req| {
        let result = json(w, Status::Ok, &config);
        Box::pin(async move { result })
    })
}

#[derive(Serialize, Deserialize)]
struct ValueBody {
    value: String,
}

struct LookupEndpoint {
    store: Arc<dyn Store>,
    request_timeout: Duration,
}

impl Handler for LookupEndpoint {
    fn call<'a>(&'a self, w: &'a mut dyn ResponseSink, req: Request) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let key = req.param("key").unwrap_or_default();
            let value = timeout(self.request_timeout, self.store.get(key))
                .await
                .unwrap_or_else(|_| Err(StoreError::timed_out(self.request_timeout)));

            match value {
                Ok(value) => json(w, Status::Ok, &ValueBody { value }),
                Err(StoreError::NotFound) => {
                    Err(HandlerError::client(Status::NotFound, format!("could not find {key}")))
                }
                Err(e) => {
                    warn!(key, error = %e, cause = ?std::error::Error::source(&e), "store lookup failed");
                    Err(e.into())
                }
            }
        })
    }
}

struct WriteEndpoint {
    store: Arc<dyn Store>,
    request_timeout: Duration,
}

impl Handler for WriteEndpoint {
    fn call<'a>(&'a self, w: &'a mut dyn ResponseSink, req: Request) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let key = req.param("key").unwrap_or_default();
            let body: ValueBody = serde_json::from_slice(req.body())?;

            timeout(self.request_timeout, self.store.set(key, &body.value))
                .await
                .unwrap_or_else(|_| Err(StoreError::timed_out(self.request_timeout)))
                .inspect_err(|e| {
                    warn!(key, error = %e, cause = ?std::error::Error::source(e), "store write failed");
                })?;

            w.write_header(Status::Created.into());
            Ok(())
        })
    }
}
