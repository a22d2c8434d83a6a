use crate::MetricSource;
use anyhow::Result;
use rand::Rng;
use rtmon_common::types::{Metric, RawMetricSnapshot};
use sysinfo::System;

/// Memory, swap, load and uptime gauges plus the poll counter.
///
/// Every call reports `PollCount` with a delta of one, so the server-side
/// total equals the number of polls the agent has made.
pub struct RuntimeSource {
    system: System,
}

impl RuntimeSource {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for RuntimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for RuntimeSource {
    fn name(&self) -> &str {
        "runtime"
    }

    fn collect(&mut self) -> Result<RawMetricSnapshot> {
        self.system.refresh_memory();
        let load = System::load_average();

        Ok(vec![
            Metric::gauge("UsedMemory", self.system.used_memory() as f64),
            Metric::gauge("AvailableMemory", self.system.available_memory() as f64),
            Metric::gauge("TotalSwap", self.system.total_swap() as f64),
            Metric::gauge("UsedSwap", self.system.used_swap() as f64),
            Metric::gauge("Load1", load.one),
            Metric::gauge("Load5", load.five),
            Metric::gauge("Load15", load.fifteen),
            Metric::gauge("Uptime", System::uptime() as f64),
            Metric::gauge("RandomValue", rand::thread_rng().gen::<f64>()),
            Metric::counter("PollCount", 1),
        ])
    }
}
