//! Process state: the resources the lifecycle orchestrator owns.
//!
//! Each `init_*` step fills one field and is a no-op if the field is already
//! set, so tests (or the binary) can pre-populate any of them. Each `stop_*`
//! step empties one field and is a no-op if it is already empty. Nothing
//! outside this type closes the store or the listener.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing_appender::non_blocking::WorkerGuard;
use tracing::info;

use crate::config::{Backend, Config};
use crate::error::Error;
use crate::routes;
use crate::server::Server;
use crate::store::{MemoryStore, RedisStore, Store, StoreError};
use crate::version::Version;

pub struct ProcessState {
    pub config: Option<Config>,
    pub version: Version,
    pub store: Option<Arc<dyn Store>>,
    pub server: Option<Server>,
    /// Flushes the log file on drop.
    pub log_guard: Option<WorkerGuard>,
}

impl ProcessState {
    pub fn new(version: Version) -> Self {
        Self { config: None, version, store: None, server: None, log_guard: None }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn init_config(&mut self) -> Result<(), Error> {
        if self.config.is_some() {
            return Ok(());
        }
        self.config = Some(Config::from_env()?);
        Ok(())
    }

    pub async fn init_store(&mut self) -> Result<(), Error> {
        if self.store.is_some() {
            return Ok(());
        }
        let config = self.config.as_ref().ok_or(Error::NotInitialised("config"))?;

        let store: Arc<dyn Store> = match config.store.backend {
            Backend::Redis => {
                Arc::new(RedisStore::connect(&config.store, config.timeouts.connect()).await?)
            }
            Backend::Memory => {
                info!("using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };
        self.store = Some(store);
        Ok(())
    }

    pub async fn init_server(&mut self) -> Result<(), Error> {
        if self.server.is_some() {
            return Ok(());
        }
        let config = self.config.as_ref().ok_or(Error::NotInitialised("config"))?;
        let store = self.store.as_ref().ok_or(Error::NotInitialised("store"))?;

        let router = routes::router(config, &self.version, Arc::clone(store));
        let server = Server::bind(&config.listen_addr(), router).await?;
        self.server = Some(server.with_timeouts(config.timeouts));
        Ok(())
    }

    /// Stops the listener, draining for at most `deadline`.
    pub async fn stop_server(&mut self, deadline: Duration) -> Result<(), Error> {
        let Some(mut server) = self.server.take() else {
            return Ok(());
        };
        server.shutdown(deadline).await
    }

    /// Closes the store connection, waiting at most `deadline`.
    pub async fn stop_store(&mut self, deadline: Duration) -> Result<(), Error> {
        let Some(store) = self.store.take() else {
            return Ok(());
        };
        timeout(deadline, store.close())
            .await
            .unwrap_or_else(|_| Err(StoreError::timed_out(deadline)))?;
        info!("store closed");
        Ok(())
    }
}
