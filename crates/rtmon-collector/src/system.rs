use crate::MetricSource;
use anyhow::Result;
use rtmon_common::types::{Metric, RawMetricSnapshot};
use sysinfo::System;

/// Host memory totals and per-core CPU utilization (`CPUutilization0..N`).
pub struct SystemSource {
    system: System,
}

impl SystemSource {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between two refreshes; prime the first one.
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for SystemSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for SystemSource {
    fn name(&self) -> &str {
        "system"
    }

    fn collect(&mut self) -> Result<RawMetricSnapshot> {
        self.system.refresh_memory();
        self.system.refresh_cpu_all();

        let mut metrics = vec![
            Metric::gauge("TotalMemory", self.system.total_memory() as f64),
            Metric::gauge("FreeMemory", self.system.free_memory() as f64),
        ];
        for (i, cpu) in self.system.cpus().iter().enumerate() {
            metrics.push(Metric::gauge(format!("CPUutilization{i}"), cpu.cpu_usage() as f64));
        }

        Ok(metrics)
    }
}
