//! Authorization-header inspection.
//!
//! This does not verify credentials. It rejects requests that carry no
//! `Authorization` header and logs the value of those that do.

use std::sync::Arc;

use http::header::AUTHORIZATION;
use tracing::info;

use crate::error::HandlerError;
use crate::handler::{BoxFuture, BoxedHandler, Handler, HandlerResult};
use crate::request::Request;
use crate::response::ResponseSink;
use crate::status::Status;

pub fn auth_inspector(inner: BoxedHandler) -> BoxedHandler {
    Arc::new(AuthInspector { inner })
}

struct AuthInspector {
    inner: BoxedHandler,
}

impl Handler for AuthInspector {
    fn call<'a>(&'a self, w: &'a mut dyn ResponseSink, req: Request) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let Some(value) = req.headers().get(AUTHORIZATION) else {
                // Status goes out now, even if nothing translates the error.
                w.write_header(Status::Unauthorized.into());
                return Err(HandlerError::client(Status::Unauthorized, "No Authorization header"));
            };

            info!(auth = %String::from_utf8_lossy(value.as_bytes()), "auth header");
            self.inner.call(w, req).await
        })
    }
}
