//! The backing key-value store.
//!
//! Handlers see the store only through the [`Store`] trait. Two backends
//! exist: [`RedisStore`] for real deployments and [`MemoryStore`] for local
//! runs and tests. Every error is collapsed into [`StoreError::NotFound`] or
//! [`StoreError::Internal`]; the underlying cause is kept as the error source
//! for the server log and never reaches a client.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::BoxError;
use crate::handler::BoxFuture;

/// Store failure, as classified for callers.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,

    #[error("internal error")]
    Internal(#[source] Option<BoxError>),
}

impl StoreError {
    pub fn internal(cause: impl Into<BoxError>) -> Self {
        Self::Internal(Some(cause.into()))
    }

    pub(crate) fn timed_out(after: Duration) -> Self {
        Self::internal(format!("store call timed out after {after:?}"))
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        Self::internal(e)
    }
}

/// A key-value store.
///
/// Calls are not bounded internally; callers wrap them in
/// `tokio::time::timeout` with their own budget.
pub trait Store: Send + Sync + 'static {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<String, StoreError>>;

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Releases the connection. Calls made after `close` fail with
    /// [`StoreError::Internal`].
    fn close(&self) -> BoxFuture<'_, Result<(), StoreError>>;
}

// ── Redis ─────────────────────────────────────────────────────────────────────

/// Redis-backed store.
///
/// Holds a [`ConnectionManager`], which reconnects on its own; closing drops
/// it.
pub struct RedisStore {
    conn: RwLock<Option<ConnectionManager>>,
}

impl RedisStore {
    /// Connects to the Redis server described by `config` and checks it with
    /// a `PING`, all within `timeout`.
    pub async fn connect(config: &StoreConfig, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::open(redis_url(config)?.as_str())?;

        let conn = tokio::time::timeout(timeout, async {
            let mut conn = ConnectionManager::new(client).await?;
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, StoreError>(conn)
        })
        .await
        .map_err(|_| StoreError::timed_out(timeout))??;

        info!(host = %config.host, port = config.port, "connected to redis");
        Ok(Self { conn: RwLock::new(Some(conn)) })
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| StoreError::internal("redis connection is closed"))
    }
}

fn redis_url(config: &StoreConfig) -> Result<url::Url, StoreError> {
    let mut url = url::Url::parse("redis://localhost/0").map_err(StoreError::internal)?;
    url.set_host(Some(&config.host)).map_err(StoreError::internal)?;
    url.set_port(Some(config.port))
        .map_err(|()| StoreError::internal("invalid redis port"))?;
    if !config.password.is_empty() {
        url.set_password(Some(&config.password))
            .map_err(|()| StoreError::internal("invalid redis password"))?;
    }
    Ok(url)
}

impl Store for RedisStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<String, StoreError>> {
        Box::pin(async move {
            let mut conn = self.connection().await?;
            let value: Option<String> = conn.get(key).await?;
            value.ok_or(StoreError::NotFound)
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut conn = self.connection().await?;
            let _: () = conn.set(key, value).await?;
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            if self.conn.write().await.take().is_some() {
                info!("redis connection closed");
            }
            Ok(())
        })
    }
}

// ── Memory ────────────────────────────────────────────────────────────────────

/// In-process store backed by a `HashMap`.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<Option<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { entries: Mutex::new(Some(HashMap::new())) }
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, String>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| StoreError::internal("memory store lock poisoned"))?;
        match guard.as_mut() {
            Some(entries) => f(entries),
            None => Err(StoreError::internal("memory store is closed")),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

impl Store for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<String, StoreError>> {
        let result = self.with_entries(|m| m.get(key).cloned().ok_or(StoreError::NotFound));
        Box::pin(async move { result })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        let result = self.with_entries(|m| {
            m.insert(key.to_owned(), value.to_owned());
            Ok(())
        });
        debug!(key, "memory store set");
        Box::pin(async move { result })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        let result = self
            .entries
            .lock()
            .map(|mut guard| *guard = None)
            .map_err(|_| StoreError::internal("memory store lock poisoned"));
        Box::pin(async move { result })
    }
}
