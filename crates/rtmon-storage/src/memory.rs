use async_trait::async_trait;
use rtmon_common::types::{MetricKind, SnapshotDocument};
use tokio::sync::{Mutex, MutexGuard};

use crate::error::{Result, StorageError};
use crate::{CounterMap, GaugeMap, Storage};

/// Plain counter and gauge maps. Not synchronized; owners lock around it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MetricState {
    pub counters: CounterMap,
    pub gauges: GaugeMap,
}

impl MetricState {
    pub fn add_counter(&mut self, name: &str, delta: i64) {
        let total = self.counters.entry(name.to_string()).or_insert(0);
        *total = total.wrapping_add(delta);
    }

    pub fn set_gauge(&mut self, name: &str, value: f64) {
        self.gauges.insert(name.to_string(), value);
    }

    pub fn apply(&mut self, counters: &CounterMap, gauges: &GaugeMap) {
        for (name, delta) in counters {
            self.add_counter(name, *delta);
        }
        for (name, value) in gauges {
            self.set_gauge(name, *value);
        }
    }

    pub fn counter(&self, name: &str) -> Result<i64> {
        self.counters
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::not_found(MetricKind::Counter, name))
    }

    pub fn gauge(&self, name: &str) -> Result<f64> {
        self.gauges
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::not_found(MetricKind::Gauge, name))
    }

    pub fn to_snapshot(&self) -> SnapshotDocument {
        SnapshotDocument::from_maps(&self.counters, &self.gauges)
    }
}

/// In-process backend. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MetricState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: MetricState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Exclusive access for callers that must pair a mutation with more work
    /// under the same lock, such as writing a snapshot.
    pub async fn lock(&self) -> MutexGuard<'_, MetricState> {
        self.state.lock().await
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn store_gauge(&self, name: &str, value: f64) -> Result<()> {
        self.lock().await.set_gauge(name, value);
        Ok(())
    }

    async fn get_gauge(&self, name: &str) -> Result<f64> {
        self.lock().await.gauge(name)
    }

    async fn store_counter(&self, name: &str, delta: i64) -> Result<()> {
        self.lock().await.add_counter(name, delta);
        Ok(())
    }

    async fn get_counter(&self, name: &str) -> Result<i64> {
        self.lock().await.counter(name)
    }

    async fn store_all(&self, counters: &CounterMap, gauges: &GaugeMap) -> Result<()> {
        self.lock().await.apply(counters, gauges);
        Ok(())
    }

    async fn get_all(&self) -> Result<(CounterMap, GaugeMap)> {
        let state = self.lock().await;
        Ok((state.counters.clone(), state.gauges.clone()))
    }
}
