use async_trait::async_trait;
use rtmon_common::shutdown;
use rtmon_common::types::SnapshotDocument;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::memory::{MemoryStore, MetricState};
use crate::{CounterMap, GaugeMap, Storage};

/// [`MemoryStore`] plus a JSON snapshot of the whole state on disk.
///
/// With a zero interval every mutation rewrites the snapshot before the call
/// returns. Otherwise [`FileStore::spawn_flusher`] rewrites it on a timer and
/// once more at shutdown.
pub struct FileStore {
    memory: MemoryStore,
    path: PathBuf,
    interval: Duration,
}

impl FileStore {
    pub async fn open(path: PathBuf, interval: Duration, restore: bool) -> Result<Self> {
        let state = if restore {
            restore_state(&path).await
        } else {
            MetricState::default()
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(Self {
            memory: MemoryStore::with_state(state),
            path,
            interval,
        })
    }

    fn is_sync(&self) -> bool {
        self.interval.is_zero()
    }

    /// Writes the current state to disk.
    pub async fn flush(&self) -> Result<()> {
        let state = self.memory.lock().await;
        write_snapshot(&self.path, &state).await
    }

    /// Starts the periodic writer. Returns `None` in synchronous mode, where
    /// every mutation already persists.
    pub fn spawn_flusher(self: &Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        if self.is_sync() {
            return None;
        }
        let store = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + store.interval, store.interval);
            tracing::debug!(path = %store.path.display(), "Snapshot flusher started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = store.flush().await {
                            tracing::error!(path = %store.path.display(), error = %e, "Periodic snapshot failed");
                        }
                    }
                    _ = shutdown::wait(&mut shutdown_rx) => {
                        match store.flush().await {
                            Ok(()) => tracing::info!(path = %store.path.display(), "Final snapshot written"),
                            Err(e) => tracing::error!(path = %store.path.display(), error = %e, "Final snapshot failed"),
                        }
                        break;
                    }
                }
            }
        }))
    }

    /// Applies `mutate` and, in synchronous mode, persists under the same
    /// lock. A failed write is logged; the in-memory change stays.
    async fn mutate<F>(&self, mutate: F)
    where
        F: FnOnce(&mut MetricState),
    {
        let mut state = self.memory.lock().await;
        mutate(&mut state);
        if self.is_sync() {
            if let Err(e) = write_snapshot(&self.path, &state).await {
                tracing::error!(path = %self.path.display(), error = %e, "Synchronous snapshot failed");
            }
        }
    }
}

async fn restore_state(path: &Path) -> MetricState {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "No snapshot to restore, starting empty");
            return MetricState::default();
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read snapshot, starting empty");
            return MetricState::default();
        }
    };

    let doc: SnapshotDocument = match serde_json::from_slice(&bytes) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to parse snapshot, starting empty");
            return MetricState::default();
        }
    };

    let (counters, gauges, errors) = doc.into_maps();
    for e in errors {
        tracing::warn!(path = %path.display(), error = %e, "Skipped invalid snapshot record");
    }
    tracing::info!(
        path = %path.display(),
        counters = counters.len(),
        gauges = gauges.len(),
        "Restored snapshot"
    );
    MetricState { counters, gauges }
}

/// Replaces the snapshot wholesale via a temporary file and rename.
async fn write_snapshot(path: &Path, state: &MetricState) -> Result<()> {
    let bytes = serde_json::to_vec(&state.to_snapshot())?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl Storage for FileStore {
    async fn store_gauge(&self, name: &str, value: f64) -> Result<()> {
        self.mutate(|s| s.set_gauge(name, value)).await;
        Ok(())
    }

    async fn get_gauge(&self, name: &str) -> Result<f64> {
        self.memory.get_gauge(name).await
    }

    async fn store_counter(&self, name: &str, delta: i64) -> Result<()> {
        self.mutate(|s| s.add_counter(name, delta)).await;
        Ok(())
    }

    async fn get_counter(&self, name: &str) -> Result<i64> {
        self.memory.get_counter(name).await
    }

    async fn store_all(&self, counters: &CounterMap, gauges: &GaugeMap) -> Result<()> {
        self.mutate(|s| s.apply(counters, gauges)).await;
        Ok(())
    }

    async fn get_all(&self) -> Result<(CounterMap, GaugeMap)> {
        self.memory.get_all().await
    }
}
