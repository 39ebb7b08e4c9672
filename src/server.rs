//! HTTP listener and graceful shutdown.
//!
//! # Stopping
//!
//! [`Server::shutdown`] drives the listener through three phases:
//!
//! 1. **Running**: the accept loop takes new connections.
//! 2. **Draining**: the accept loop stops and drops the socket; every open
//!    connection is asked to finish the request it is serving and close.
//! 3. **Abort**: reached only if draining outlives the deadline. Remaining
//!    connection tasks are aborted and their requests abandoned.
//!
//! Phases are broadcast over a `watch` channel so that connection tasks
//! spawned at any time see the current phase.
//!
//! # Slow clients
//!
//! A request head must arrive within `timeouts.readMs`, and its body within
//! the same budget again. A response write that makes no progress for
//! `timeouts.writeMs` closes the connection. Bodies over 1 MiB get `413`.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Sleep;
use tracing::{debug, error, info, warn};

use crate::config::TimeoutConfig;
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::request::{MAX_BODY_BYTES, Request, RequestError};
use crate::response::ResponseWriter;
use crate::router::Router;
use crate::status::Status;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Running,
    Draining,
    Abort,
}

/// The HTTP listener: a bound socket plus the router it serves.
pub struct Server {
    addr: SocketAddr,
    listener: Option<TcpListener>,
    router: Arc<Router>,
    timeouts: TimeoutConfig,
    phase: watch::Sender<Phase>,
    finished: watch::Receiver<bool>,
    finished_tx: Option<watch::Sender<bool>>,
}

impl Server {
    /// Binds `addr` and prepares to serve `router`. No connection is accepted
    /// until [`serve`](Server::serve) runs.
    pub async fn bind(addr: &str, router: Router) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let (phase, _) = watch::channel(Phase::Running);
        let (finished_tx, finished) = watch::channel(false);

        Ok(Self {
            addr,
            listener: Some(listener),
            router: Arc::new(router),
            timeouts: TimeoutConfig::default(),
            phase,
            finished,
            finished_tx: Some(finished_tx),
        })
    }

    /// Sets the read and write limits for connections accepted from now on.
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the accept loop as a future to be spawned on its own task.
    ///
    /// The future resolves once the listener has stopped and every connection
    /// has drained or been aborted. Can be taken only once.
    pub fn serve(&mut self) -> Result<BoxFuture<'static, Result<(), Error>>, Error> {
        let (Some(listener), Some(finished)) = (self.listener.take(), self.finished_tx.take()) else {
            return Err(Error::AlreadyServing);
        };
        let router = Arc::clone(&self.router);
        let phase = self.phase.subscribe();

        info!(addr = %self.addr, "kvgate listening");
        Ok(Box::pin(accept_loop(listener, router, self.timeouts, phase, finished)))
    }

    /// Stops accepting, drains in-flight requests for up to `deadline`, then
    /// abandons whatever is left.
    ///
    /// Returns [`Error::ShutdownTimeout`] if connections had to be abandoned.
    /// Calling it again after it returned is a no-op.
    pub async fn shutdown(&mut self, deadline: Duration) -> Result<(), Error> {
        if self.listener.take().is_some() {
            // never served: dropping the socket is all there is to do
            self.finished_tx.take();
            info!(addr = %self.addr, "listener closed before serving");
            return Ok(());
        }

        self.phase.send_if_modified(|phase| advance(phase, Phase::Draining));
        let mut finished = self.finished.clone();
        let drained = tokio::time::timeout(deadline, finished.wait_for(|done| *done))
            .await
            .is_ok();
        if drained {
            return Ok(());
        }

        self.phase.send_if_modified(|phase| advance(phase, Phase::Abort));
        let _ = finished.wait_for(|done| *done).await;
        Err(Error::ShutdownTimeout(deadline))
    }
}

fn advance(phase: &mut Phase, to: Phase) -> bool {
    let later = match (*phase, to) {
        (Phase::Running, Phase::Draining | Phase::Abort) => true,
        (Phase::Draining, Phase::Abort) => true,
        _ => false,
    };
    if later {
        *phase = to;
    }
    later
}

fn current(phase: &watch::Receiver<Phase>) -> Phase {
    *phase.borrow()
}

/// Resolves once the phase leaves `Running` (or the server is gone).
async fn stopping(phase: &mut watch::Receiver<Phase>) {
    while current(phase) == Phase::Running {
        if phase.changed().await.is_err() {
            return;
        }
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Pause after a failed accept, so a persistent error (out of file
/// descriptors) does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

async fn accept_loop(
    listener: TcpListener,
    router: Arc<Router>,
    timeouts: TimeoutConfig,
    mut phase: watch::Receiver<Phase>,
    finished: watch::Sender<bool>,
) -> Result<(), Error> {
    // JoinSet tracks every connection task so shutdown can wait for them.
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            // Check the phase first so a stop request wins over queued
            // connections.
            biased;

            () = stopping(&mut phase) => {
                info!(in_flight = tasks.len(), "listener stopping, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                };
                tasks.spawn(serve_connection(stream, peer, Arc::clone(&router), timeouts, phase.clone()));
            }

            // Reap finished connection tasks so the JoinSet does not grow
            // without bound on long-running servers.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }
    drop(listener);

    while !tasks.is_empty() {
        if current(&phase) == Phase::Abort {
            warn!(abandoned = tasks.len(), "shutdown deadline passed, abandoning in-flight requests");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            break;
        }
        tokio::select! {
            biased;
            changed = phase.changed() => {
                if changed.is_err() {
                    // the Server is gone; nobody will send Abort
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                }
            }
            _ = tasks.join_next() => {}
        }
    }

    finished.send_replace(true);
    info!("listener stopped");
    Ok(())
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Arc<Router>,
    timeouts: TimeoutConfig,
    mut phase: watch::Receiver<Phase>,
) {
    // TokioIo adapts tokio's AsyncRead/AsyncWrite to the hyper IO traits.
    let io = TokioIo::new(WriteStall::new(stream, timeouts.write()));

    // Called once per request on the connection, not once per connection.
    let read_timeout = timeouts.read();
    let svc = service_fn(move |req| {
        let router = Arc::clone(&router);
        async move { Ok::<_, Infallible>(dispatch(&router, req, read_timeout).await) }
    });

    // `auto::Builder` handles both HTTP/1.1 and HTTP/2.
    let mut builder = ConnBuilder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(timeouts.read());
    let conn = builder.serve_connection(io, svc);
    tokio::pin!(conn);

    let res = tokio::select! {
        res = conn.as_mut() => res,
        () = stopping(&mut phase) => {
            // finish the current request, then close
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };
    if let Err(e) = res {
        debug!(%peer, "connection error: {e}");
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Reads one request, routes it and produces one response.
///
/// Every failure becomes a response here, so hyper never sees an error.
async fn dispatch(
    router: &Router,
    req: hyper::Request<hyper::body::Incoming>,
    read_timeout: Duration,
) -> http::Response<Full<Bytes>> {
    let req = match Request::from_hyper(req, MAX_BODY_BYTES, read_timeout).await {
        Ok(req) => req,
        Err(RequestError::Method) => {
            return ResponseWriter::with_status(Status::MethodNotAllowed).into_inner();
        }
        Err(RequestError::TooLarge) => {
            return ResponseWriter::with_status(Status::PayloadTooLarge).into_inner();
        }
        Err(RequestError::TimedOut) => {
            debug!(?read_timeout, "request body too slow");
            return ResponseWriter::with_status(Status::RequestTimeout).into_inner();
        }
        Err(RequestError::Body(e)) => {
            warn!("could not read request body: {e}");
            return ResponseWriter::with_status(Status::BadRequest).into_inner();
        }
    };

    router.dispatch(req).await.into_inner()
}

// ── Write stall limit ─────────────────────────────────────────────────────────

/// Wraps a stream so that a write, flush or shutdown which stays pending for
/// longer than `limit` fails with [`io::ErrorKind::TimedOut`].
///
/// The clock starts when a call first returns `Pending` and is reset by any
/// call that completes. Reads pass straight through.
struct WriteStall<S> {
    inner: S,
    limit: Duration,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl<S> WriteStall<S> {
    fn new(inner: S, limit: Duration) -> Self {
        Self { inner, limit, deadline: None }
    }

    fn guard<T>(&mut self, cx: &mut Context<'_>, res: Poll<io::Result<T>>) -> Poll<io::Result<T>> {
        if res.is_ready() {
            self.deadline = None;
            return res;
        }
        let limit = self.limit;
        let deadline = self.deadline.get_or_insert_with(|| Box::pin(tokio::time::sleep(limit)));
        match deadline.as_mut().poll(cx) {
            Poll::Ready(()) => {
                self.deadline = None;
                Poll::Ready(Err(io::Error::new(io::ErrorKind::TimedOut, "response write stalled")))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for WriteStall<S> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for WriteStall<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let res = Pin::new(&mut this.inner).poll_write(cx, buf);
        this.guard(cx, res)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let res = Pin::new(&mut this.inner).poll_flush(cx);
        this.guard(cx, res)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let res = Pin::new(&mut this.inner).poll_shutdown(cx);
        this.guard(cx, res)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    use super::*;

    #[tokio::test]
    async fn stalled_write_times_out() {
        // nobody reads the other end, so the pipe fills after 8 bytes
        let (near, _far) = duplex(8);
        let mut w = WriteStall::new(near, Duration::from_millis(50));

        let err = w.write_all(&[0; 64]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn slow_but_moving_writes_succeed() {
        let (near, mut far) = duplex(8);
        let mut w = WriteStall::new(near, Duration::from_millis(200));

        let reader = tokio::spawn(async move {
            let mut got = Vec::new();
            let mut buf = [0; 8];
            loop {
                tokio::time::sleep(Duration::from_millis(20)).await;
                match far.read(&mut buf).await.unwrap() {
                    0 => return got,
                    n => got.extend_from_slice(&buf[..n]),
                }
            }
        });

        w.write_all(&[7; 64]).await.unwrap();
        w.shutdown().await.unwrap();
        assert_eq!(reader.await.unwrap(), vec![7; 64]);
    }
}
