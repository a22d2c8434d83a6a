//! Metric persistence for the rtmon server.
//!
//! Three interchangeable backends implement [`Storage`] with identical
//! semantics: counters accumulate deltas, gauges keep the last value.
//!
//! - [`memory::MemoryStore`] keeps everything in process.
//! - [`file::FileStore`] adds whole-state JSON snapshots on top of it.
//! - [`sql::SqlStore`] pushes accumulation into database upserts.
//!
//! The backend is picked once at startup by [`open_storage`].

pub mod error;
pub mod file;
pub mod memory;
pub mod sql;


use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub use error::{Result, StorageError};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use sql::SqlStore;

pub type CounterMap = HashMap<String, i64>;
pub type GaugeMap = HashMap<String, f64>;

/// Persistence backend for counters and gauges.
///
/// Implementations are shared by every HTTP handler, so they must be
/// `Send + Sync` and serialize their own mutations.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Overwrites the gauge with `value`.
    async fn store_gauge(&self, name: &str, value: f64) -> Result<()>;

    /// Returns the last stored value, or [`StorageError::NotFound`].
    async fn get_gauge(&self, name: &str) -> Result<f64>;

    /// Adds `delta` to the counter, creating it when absent.
    async fn store_counter(&self, name: &str, delta: i64) -> Result<()>;

    /// Returns the running total, or [`StorageError::NotFound`].
    async fn get_counter(&self, name: &str) -> Result<i64>;

    /// Applies a whole batch. Counter names must already be unique.
    async fn store_all(&self, counters: &CounterMap, gauges: &GaugeMap) -> Result<()>;

    async fn get_all(&self) -> Result<(CounterMap, GaugeMap)>;

    /// Liveness check for the `/ping` endpoint.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Whether `err` is worth retrying. Backends without transient failure
    /// modes never retry.
    fn is_transient(&self, _err: &StorageError) -> bool {
        false
    }
}

/// Backend selection, resolved once from server configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    Memory,
    File {
        path: PathBuf,
        interval: Duration,
        restore: bool,
    },
    Sql {
        dsn: String,
    },
}

/// An opened backend plus the background task it may own.
pub struct OpenedStorage {
    pub storage: Arc<dyn Storage>,
    /// The file flusher, joined at shutdown so the final snapshot lands.
    pub background: Option<JoinHandle<()>>,
}

pub async fn open_storage(config: &StorageConfig, shutdown: watch::Receiver<bool>) -> Result<OpenedStorage> {
    match config {
        StorageConfig::Memory => {
            tracing::info!("Using in-memory storage");
            Ok(OpenedStorage {
                storage: Arc::new(MemoryStore::new()),
                background: None,
            })
        }
        StorageConfig::File {
            path,
            interval,
            restore,
        } => {
            let store = Arc::new(FileStore::open(path.clone(), *interval, *restore).await?);
            let background = store.spawn_flusher(shutdown);
            tracing::info!(
                path = %path.display(),
                interval_secs = interval.as_secs(),
                restore = *restore,
                "Using file storage"
            );
            Ok(OpenedStorage {
                storage: store,
                background,
            })
        }
        StorageConfig::Sql { dsn } => {
            let store = SqlStore::connect(dsn).await?;
            Ok(OpenedStorage {
                storage: Arc::new(store),
                background: None,
            })
        }
    }
}
