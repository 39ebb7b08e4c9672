//! Startup, live traffic and ordered shutdown over a real socket.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use kvgate::{MemoryStore, ProcessState, lifecycle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use common::{SlowStore, send, state, test_config};

/// Starts `state` on its own task. Dropping or firing the returned sender
/// triggers shutdown; the task hands the state back once `run` returns.
async fn start(
    mut state: ProcessState,
) -> (std::net::SocketAddr, oneshot::Sender<()>, JoinHandle<(Result<(), kvgate::Error>, ProcessState)>) {
    state.init_server().await.unwrap();
    let addr = state.server.as_ref().unwrap().local_addr();

    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let result = lifecycle::run(&mut state, async {
            let _ = rx.await;
        })
        .await;
        (result, state)
    });
    (addr, tx, handle)
}

#[tokio::test]
async fn serves_and_stops_cleanly() {
    let store = Arc::new(MemoryStore::new());
    let (addr, stop, handle) = start(state(test_config()).with_store(store)).await;

    let (status, body) = send(addr, "POST", "/lookup/k", Some("Bearer t"), Some(r#"{"value":"v"}"#))
        .await
        .unwrap();
    assert_eq!(status, 201, "{body}");

    let (status, body) = send(addr, "GET", "/lookup/k", Some("Bearer t"), None).await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(body, r#"{"value":"v"}"#);

    let (status, _) = send(addr, "GET", "/lookup/k", None, None).await.unwrap();
    assert_eq!(status, 401);

    let (status, body) = send(addr, "GET", "/elsewhere", Some("Bearer t"), None).await.unwrap();
    assert_eq!(status, 404);
    assert!(body.is_empty());

    for (method, path) in [("BREW", "/lookup/k"), ("PUT", "/lookup/k"), ("DELETE", "/lookup/k"), ("POST", "/version")] {
        let (status, body) = send(addr, method, path, Some("Bearer t"), None).await.unwrap();
        assert_eq!(status, 405, "{method} {path}");
        assert!(body.is_empty());
    }

    stop.send(()).unwrap();
    let (result, state) = handle.await.unwrap();
    result.unwrap();
    assert!(state.server.is_none());
    assert!(state.store.is_none());

    // the listener is gone
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn in_flight_request_drains_before_store_closes() {
    let (store, events) = SlowStore::new(Duration::from_millis(300));
    let mut config = test_config();
    config.timeouts.shutdown_step_ms = 5_000;
    let (addr, stop, handle) = start(state(config).with_store(store)).await;

    let client = tokio::spawn(send(addr, "GET", "/lookup/k", Some("Bearer t"), None));
    tokio::time::sleep(Duration::from_millis(100)).await;
    stop.send(()).unwrap();

    let (status, body) = client.await.unwrap().unwrap();
    assert_eq!(status, 200);
    assert_eq!(body, r#"{"value":"slow"}"#);

    let (result, _) = handle.await.unwrap();
    result.unwrap();
    assert_eq!(*events.lock().unwrap(), ["get started", "get finished", "close"]);
}

#[tokio::test]
async fn request_past_the_deadline_is_abandoned() {
    let (store, events) = SlowStore::new(Duration::from_secs(30));
    let mut config = test_config();
    config.timeouts.request_ms = 60_000;
    config.timeouts.shutdown_step_ms = 200;
    let (addr, stop, handle) = start(state(config).with_store(store)).await;

    let client = tokio::spawn(send(addr, "GET", "/lookup/k", Some("Bearer t"), None));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let began = Instant::now();
    stop.send(()).unwrap();
    let (result, state) = handle.await.unwrap();

    // the listener step failing is logged, not returned
    result.unwrap();
    assert!(began.elapsed() < Duration::from_secs(5));
    assert!(state.server.is_none());
    assert!(state.store.is_none());

    assert!(client.await.unwrap().is_none());
    assert_eq!(*events.lock().unwrap(), ["get started", "close"]);
}

#[tokio::test]
async fn store_step_gets_its_own_deadline() {
    // the listener step uses its whole budget, closing the store needs most
    // of a fresh one
    let (store, events) =
        SlowStore::with_close_delay(Duration::from_secs(30), Duration::from_millis(150));
    let mut config = test_config();
    config.timeouts.request_ms = 60_000;
    config.timeouts.shutdown_step_ms = 200;
    let (addr, stop, handle) = start(state(config).with_store(store)).await;

    let client = tokio::spawn(send(addr, "GET", "/lookup/k", Some("Bearer t"), None));
    tokio::time::sleep(Duration::from_millis(100)).await;

    stop.send(()).unwrap();
    let (result, state) = handle.await.unwrap();
    result.unwrap();
    assert!(client.await.unwrap().is_none());
    assert!(state.store.is_none());
    assert_eq!(*events.lock().unwrap(), ["get started", "close"]);
}

#[tokio::test]
async fn stalled_request_head_is_dropped() {
    let mut config = test_config();
    config.timeouts.read_ms = 200;
    let (addr, stop, handle) = start(state(config).with_store(Arc::new(MemoryStore::new()))).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"GET /version HTTP/1.1\r\nHost: x\r\n").await.unwrap();

    let mut buf = Vec::new();
    let closed = tokio::time::timeout(Duration::from_secs(3), stream.read_to_end(&mut buf)).await;
    assert!(closed.is_ok(), "connection still open after the read timeout");

    let began = Instant::now();
    stop.send(()).unwrap();
    handle.await.unwrap().0.unwrap();
    assert!(began.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn oversized_body_is_413() {
    let (addr, stop, handle) = start(state(test_config()).with_store(Arc::new(MemoryStore::new()))).await;

    let body = "a".repeat((1 << 20) + 1);
    let (status, _) = send(addr, "POST", "/lookup/k", Some("Bearer t"), Some(&body)).await.unwrap();
    assert_eq!(status, 413);

    stop.send(()).unwrap();
    handle.await.unwrap().0.unwrap();
}

#[tokio::test]
async fn failed_startup_stops_what_was_started() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = test_config();
    config.port = taken.local_addr().unwrap().port();

    let (store, events) = SlowStore::new(Duration::ZERO);
    let mut state = state(config).with_store(store);

    let result = lifecycle::run(&mut state, std::future::pending()).await;
    assert!(matches!(result, Err(kvgate::Error::Io(_))));
    assert!(state.store.is_none());
    assert_eq!(*events.lock().unwrap(), ["close"]);
}
