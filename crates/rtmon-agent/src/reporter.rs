use anyhow::{Context, Result};
use rtmon_common::shutdown;
use rtmon_common::types::MetricBatch;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::chain::SecurityChain;
use crate::poller::PollerHandle;
use crate::transport::Transport;

type WorkQueue = Arc<Mutex<mpsc::Receiver<MetricBatch>>>;

/// Pulls batches from the poller on its own cadence and hands them to a
/// fixed pool of `rate_limit` senders.
///
/// The work queue holds at most one batch. When every sender is busy the
/// reporter blocks on the push, which in turn delays its next tick.
pub struct Reporter {
    interval: Duration,
    rate_limit: usize,
    poller: PollerHandle,
    chain: Arc<SecurityChain>,
    transport: Arc<dyn Transport>,
}

impl Reporter {
    pub fn new(
        interval: Duration,
        rate_limit: usize,
        poller: PollerHandle,
        chain: SecurityChain,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            interval,
            rate_limit: rate_limit.max(1),
            poller,
            chain: Arc::new(chain),
            transport,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let (queue_tx, queue_rx) = mpsc::channel::<MetricBatch>(1);
        let queue: WorkQueue = Arc::new(Mutex::new(queue_rx));

        let workers: Vec<JoinHandle<()>> = (0..self.rate_limit)
            .map(|id| {
                tokio::spawn(sender_worker(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&self.chain),
                    Arc::clone(&self.transport),
                ))
            })
            .collect();

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            senders = self.rate_limit,
            stages = ?self.chain.stage_names(),
            "Reporter started"
        );

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown::wait(&mut shutdown_rx) => break,
                _ = ticker.tick() => {}
            }

            let batch = tokio::select! {
                _ = shutdown::wait(&mut shutdown_rx) => break,
                batch = self.poller.take_batch() => batch,
            };
            let Some(batch) = batch else {
                tracing::info!("Poller stopped, reporter exiting");
                break;
            };
            if batch.is_empty() {
                tracing::debug!("Nothing collected since last report, skipping");
                continue;
            }

            tokio::select! {
                _ = shutdown::wait(&mut shutdown_rx) => break,
                queued = queue_tx.send(batch) => {
                    if queued.is_err() {
                        break;
                    }
                }
            }
        }

        // Closing the queue lets each sender finish its current batch and exit.
        drop(queue_tx);
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "Sender task failed");
            }
        }
        tracing::info!("Reporter stopped");
    }
}

async fn sender_worker(id: usize, queue: WorkQueue, chain: Arc<SecurityChain>, transport: Arc<dyn Transport>) {
    tracing::debug!(worker = id, "Sender started");
    loop {
        let batch = { queue.lock().await.recv().await };
        let Some(batch) = batch else {
            break;
        };
        let metrics = batch.len();
        match send_batch(&chain, transport.as_ref(), &batch).await {
            Ok(()) => tracing::debug!(worker = id, metrics, "Batch reported"),
            Err(e) => tracing::warn!(worker = id, metrics, error = %e, "Failed to report batch"),
        }
    }
    tracing::debug!(worker = id, "Sender stopped");
}

/// Serializes the batch, runs it through the chain and sends it.
pub async fn send_batch(chain: &SecurityChain, transport: &dyn Transport, batch: &MetricBatch) -> Result<()> {
    let body = serde_json::to_vec(&batch.to_records()).context("failed to encode batch")?;
    let request = chain.apply(body)?;
    transport.send(request).await
}
