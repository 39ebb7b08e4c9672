//! HTTP status codes as a typed enum.
//!
//! Only the codes kvgate actually sends are named here. Anything that takes a
//! status accepts `impl Into<u16>`, so a raw code works just as well:
//!
//! ```rust
//! use kvgate::{HandlerError, Status};
//!
//! HandlerError::client(Status::NotFound, "could not find foo");
//! HandlerError::client(418u16, "short and stout");
//! ```

/// The status codes used by kvgate's handlers and middleware.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Status {
    // ── 2xx Success ───────────────────────────────────────────────────────────
    Ok,                  // 200
    Created,             // 201

    // ── 4xx Client errors ─────────────────────────────────────────────────────
    BadRequest,          // 400
    Unauthorized,        // 401
    NotFound,            // 404
    MethodNotAllowed,    // 405
    RequestTimeout,      // 408
    PayloadTooLarge,     // 413

    // ── 5xx Server errors ─────────────────────────────────────────────────────
    InternalServerError, // 500
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        match s {
            Status::Ok                  => 200,
            Status::Created             => 201,
            Status::BadRequest          => 400,
            Status::Unauthorized        => 401,
            Status::NotFound            => 404,
            Status::MethodNotAllowed    => 405,
            Status::RequestTimeout      => 408,
            Status::PayloadTooLarge     => 413,
            Status::InternalServerError => 500,
        }
    }
}
