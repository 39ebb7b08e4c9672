//! # kvgate
//!
//! An authenticated key-value HTTP front end over Redis.
//!
//! ## Routes
//!
//! - `GET  /version`: build checksum and timestamp
//! - `GET  /config`: the active configuration, secrets omitted
//! - `GET  /lookup/{key}`: `{"value": "…"}` or `404 {"error": "could not find {key}"}`
//! - `POST /lookup/{key}`: body `{"value": "…"}`, answers `201`
//!
//! Every route passes through request timing and then an `Authorization`
//! header check. A request without the header gets an empty `401`.
//!
//! ## Errors
//!
//! Handlers and middleware return [`HandlerError`] instead of writing error
//! responses. The error is translated exactly once, after the whole chain has
//! returned: client errors become `{"error": message}` with their status,
//! anything else a plain `500`.
//!
//! ## Lifecycle
//!
//! ```rust,no_run
//! use kvgate::{ProcessState, Version, lifecycle};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), kvgate::Error> {
//!     let mut state = ProcessState::new(Version::from_build_env());
//!     lifecycle::run(&mut state, lifecycle::shutdown_signal()).await
//! }
//! ```
//!
//! [`lifecycle::run`] loads configuration, installs logging, connects the
//! store and binds the listener. On SIGTERM or Ctrl-C it drains the listener
//! and then closes the store, each step bounded by its own deadline.

mod error;
mod method;
mod request;
mod response;
mod router;
mod server;
mod status;
mod version;

pub mod config;
pub mod handler;
pub mod lifecycle;
pub mod logging;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod store;

pub use config::Config;
pub use error::{BoxError, Error, HandlerError, write_error};
pub use handler::{BoxedHandler, Handler};
pub use method::Method;
pub use request::Request;
pub use response::{ContentType, ResponseSink, ResponseWriter, json};
pub use router::Router;
pub use server::Server;
pub use state::ProcessState;
pub use status::Status;
pub use store::{MemoryStore, RedisStore, Store, StoreError};
pub use version::Version;
