use rtmon_collector::MetricSource;
use rtmon_common::shutdown;
use rtmon_common::types::{MetricBatch, RawMetricSnapshot};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

use crate::collector::Collector;

/// A report request; the poller answers with its accumulator.
pub type ReportRequest = oneshot::Sender<MetricBatch>;

/// Reporter-side handle for pulling the accumulated batch.
#[derive(Clone)]
pub struct PollerHandle {
    requests: mpsc::Sender<ReportRequest>,
}

impl PollerHandle {
    /// Takes everything accumulated since the previous call. Returns `None`
    /// once the poller has stopped.
    pub async fn take_batch(&self) -> Option<MetricBatch> {
        let (reply, response) = oneshot::channel();
        self.requests.send(reply).await.ok()?;
        response.await.ok()
    }
}

/// Polls every source on one cadence and accumulates the results.
///
/// The accumulator is owned by the poller task alone. The reporter only
/// receives it through [`PollerHandle::take_batch`], which swaps in an
/// empty batch, so nothing collected between reports is dropped.
pub struct Poller {
    interval: Duration,
    sources: Vec<Box<dyn MetricSource>>,
    requests: mpsc::Receiver<ReportRequest>,
}

struct CollectorLink {
    trigger: mpsc::Sender<()>,
    snapshots: mpsc::Receiver<RawMetricSnapshot>,
}

impl Poller {
    pub fn new(interval: Duration, sources: Vec<Box<dyn MetricSource>>) -> (Self, PollerHandle) {
        let (tx, requests) = mpsc::channel(1);
        (
            Self {
                interval,
                sources,
                requests,
            },
            PollerHandle { requests: tx },
        )
    }

    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut links = Vec::with_capacity(self.sources.len());
        let mut handles = Vec::with_capacity(self.sources.len());
        for source in std::mem::take(&mut self.sources) {
            let (trigger, trigger_rx) = mpsc::channel(1);
            let (collector, snapshots) = Collector::new(source, trigger_rx);
            handles.push(tokio::spawn(collector.run(shutdown_rx.clone())));
            links.push(CollectorLink { trigger, snapshots });
        }

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            collectors = links.len(),
            "Poller started"
        );

        let mut accumulator = MetricBatch::new();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut requests_open = true;

        loop {
            tokio::select! {
                _ = shutdown::wait(&mut shutdown_rx) => break,
                _ = ticker.tick() => {
                    if !poll_once(&mut links, &mut accumulator, &mut shutdown_rx).await {
                        break;
                    }
                }
                request = self.requests.recv(), if requests_open => match request {
                    Some(reply) => {
                        let batch = std::mem::take(&mut accumulator);
                        tracing::debug!(metrics = batch.len(), "Handing batch to reporter");
                        let _ = reply.send(batch);
                    }
                    None => requests_open = false,
                },
            }
        }

        drop(links);
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Collector task failed");
            }
        }
        tracing::info!("Poller stopped");
    }
}

/// Triggers every collector, then waits for all of them. Returns `false`
/// when shutdown interrupts the round.
async fn poll_once(
    links: &mut [CollectorLink],
    accumulator: &mut MetricBatch,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    for link in links.iter() {
        if link.trigger.send(()).await.is_err() {
            return false;
        }
    }
    for link in links.iter_mut() {
        let snapshot = tokio::select! {
            _ = shutdown::wait(shutdown_rx) => return false,
            snapshot = link.snapshots.recv() => snapshot,
        };
        match snapshot {
            Some(snapshot) => accumulator.merge_snapshot(snapshot),
            None => return false,
        }
    }
    true
}
