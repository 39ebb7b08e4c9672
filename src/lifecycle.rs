//! Startup, serving and ordered shutdown.
//!
//! ```text
//! init_config → logging → init_store → init_server
//!                                          │
//!            ┌─────────────────────────────┴──────────────┐
//!            ▼                                            ▼
//!      serve (own task)                 wait for shutdown signal
//!            │                                            │
//!            │                          stop_server (own deadline)
//!            │ ◀─ drains, then returns ─────────┤
//!            │                          stop_store  (own deadline)
//!            ▼                                            ▼
//!            └──────────────── join both ─────────────────┘
//! ```
//!
//! A failing serve loop is logged but does not start the shutdown sequence;
//! only the shutdown future does.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//! Keep the sum of the shutdown step timeouts below that.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::Error;
use crate::handler::BoxFuture;
use crate::logging;
use crate::state::ProcessState;

/// Starts everything in `state`, serves until `shutdown` resolves, then
/// stops the listener and the store in that order.
///
/// Returns an error only if startup fails; in that case anything already
/// started has been stopped again. Shutdown-step failures are logged.
pub async fn run<F>(state: &mut ProcessState, shutdown: F) -> Result<(), Error>
where
    F: Future<Output = ()>,
{
    let serving = match start(state).await {
        Ok(serve) => tokio::spawn(serve),
        Err(e) => {
            stop_all(state).await;
            return Err(e);
        }
    };

    supervise(state, serving, shutdown).await;
    info!("kvgate stopped");
    Ok(())
}

/// Runs the serve unit and the shutdown unit side by side until both end.
async fn supervise<F>(
    state: &mut ProcessState,
    serving: JoinHandle<Result<(), Error>>,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    let serve_unit = async {
        match serving.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "listener stopped unexpectedly"),
            Err(e) => error!(error = %e, "listener task failed"),
        }
    };

    let shutdown_unit = async {
        shutdown.await;
        info!("shutdown signal received");
        stop_all(state).await;
    };

    tokio::join!(serve_unit, shutdown_unit);
}

/// Runs every init step and hands back the accept loop, not yet spawned.
async fn start(state: &mut ProcessState) -> Result<BoxFuture<'static, Result<(), Error>>, Error> {
    state.init_config()?;
    if let Some(config) = &state.config {
        if let Some(guard) = logging::init(config, &state.version)? {
            state.log_guard = Some(guard);
        }
    }
    state.init_store().await?;
    state.init_server().await?;
    state.server.as_mut().ok_or(Error::NotInitialised("listener"))?.serve()
}

/// Listener first, then store, each with a fresh deadline.
async fn stop_all(state: &mut ProcessState) {
    let step = state
        .config
        .as_ref()
        .map(|c| c.timeouts.shutdown_step())
        .unwrap_or_else(|| crate::config::TimeoutConfig::default().shutdown_step());

    if let Err(e) = state.stop_server(step).await {
        error!(error = %e, "stopping listener");
    }
    if let Err(e) = state.stop_store(step).await {
        error!(error = %e, cause = ?std::error::Error::source(&e), "stopping store");
    }
}

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by `kubectl` and the
/// Kubernetes control plane) and **SIGINT** (Ctrl-C, for local dev).
/// On Windows only Ctrl-C is available.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    // `pending()` never resolves, so on non-Unix platforms the SIGTERM arm
    // is effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
