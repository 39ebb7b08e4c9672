//! Shared helpers for the integration tests: a one-shot HTTP client and
//! stores that record what happens to them.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use kvgate::config::Backend;
use kvgate::handler::BoxFuture;
use kvgate::{Config, ProcessState, Store, StoreError, Version};

pub fn test_config() -> Config {
    let mut config = Config { host: "127.0.0.1".into(), port: 0, log_path: None, ..Config::default() };
    config.store.backend = Backend::Memory;
    config
}

pub fn version() -> Version {
    Version::new("abc123", Utc::now())
}

pub fn state(config: Config) -> ProcessState {
    ProcessState::new(version()).with_config(config)
}

/// Sends one request and reads the whole reply.
///
/// Returns `None` if the server closed the connection without answering.
pub async fn send(
    addr: SocketAddr,
    method: &str,
    path: &str,
    auth: Option<&str>,
    body: Option<&str>,
) -> Option<(u16, String)> {
    let method = reqwest::Method::from_bytes(method.as_bytes()).unwrap();
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let mut req = client.request(method, format!("http://{addr}{path}"));
    if let Some(auth) = auth {
        req = req.header(reqwest::header::AUTHORIZATION, auth);
    }
    if let Some(body) = body {
        req = req.body(body.to_owned());
    }

    let res = req.send().await.ok()?;
    let status = res.status().as_u16();
    let body = res.text().await.ok()?;
    Some((status, body))
}

/// A store that holds one fixed value, answers after `delay`, takes
/// `close_delay` to close and records the order of calls.
pub struct SlowStore {
    delay: Duration,
    close_delay: Duration,
    events: Arc<Mutex<Vec<&'static str>>>,
}

impl SlowStore {
    pub fn new(delay: Duration) -> (Arc<Self>, Arc<Mutex<Vec<&'static str>>>) {
        Self::with_close_delay(delay, Duration::ZERO)
    }

    pub fn with_close_delay(
        delay: Duration,
        close_delay: Duration,
    ) -> (Arc<Self>, Arc<Mutex<Vec<&'static str>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        (Arc::new(Self { delay, close_delay, events: Arc::clone(&events) }), events)
    }

    fn record(&self, event: &'static str) {
        self.events.lock().unwrap().push(event);
    }
}

impl Store for SlowStore {
    fn get<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<String, StoreError>> {
        Box::pin(async move {
            self.record("get started");
            tokio::time::sleep(self.delay).await;
            self.record("get finished");
            Ok("slow".to_owned())
        })
    }

    fn set<'a>(&'a self, _key: &'a str, _value: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.record("set");
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            tokio::time::sleep(self.close_delay).await;
            self.record("close");
            Ok(())
        })
    }
}

/// A store that fails every call with an internal error.
pub struct BrokenStore;

impl Store for BrokenStore {
    fn get<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<String, StoreError>> {
        Box::pin(async { Err(StoreError::internal("connection refused")) })
    }

    fn set<'a>(&'a self, _key: &'a str, _value: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async { Err(StoreError::internal("connection refused")) })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async { Ok(()) })
    }
}
