use rtmon_collector::MetricSource;
use rtmon_common::shutdown;
use rtmon_common::types::RawMetricSnapshot;
use tokio::sync::{mpsc, watch};

/// Wraps one [`MetricSource`]; reads it once per trigger.
///
/// The output channel has capacity one and the poller consumes every
/// snapshot before triggering again, so a collector never runs ahead.
pub struct Collector {
    source: Box<dyn MetricSource>,
    trigger: mpsc::Receiver<()>,
    output: mpsc::Sender<RawMetricSnapshot>,
}

impl Collector {
    pub fn new(
        source: Box<dyn MetricSource>,
        trigger: mpsc::Receiver<()>,
    ) -> (Self, mpsc::Receiver<RawMetricSnapshot>) {
        let (output, snapshots) = mpsc::channel(1);
        (
            Self {
                source,
                trigger,
                output,
            },
            snapshots,
        )
    }

    /// Runs until shutdown or until the trigger side is dropped.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let name = self.source.name().to_string();
        tracing::debug!(source = %name, "Collector started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown::wait(&mut shutdown_rx) => break,
                trigger = self.trigger.recv() => {
                    if trigger.is_none() {
                        break;
                    }
                }
            }

            let snapshot = match self.source.collect() {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!(source = %name, error = %e, "Collection failed");
                    RawMetricSnapshot::new()
                }
            };

            tokio::select! {
                biased;
                _ = shutdown::wait(&mut shutdown_rx) => break,
                sent = self.output.send(snapshot) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::debug!(source = %name, "Collector stopped");
    }
}
