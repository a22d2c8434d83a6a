//! Metric sources for the rtmon agent.
//!
//! Each [`MetricSource`] reads one family of host metrics and returns them
//! as a [`RawMetricSnapshot`]. Sources own disjoint metric names, so the
//! poller can merge their snapshots without ordering concerns.

pub mod runtime;
pub mod system;

use anyhow::Result;
use rtmon_common::types::RawMetricSnapshot;

pub use runtime::RuntimeSource;
pub use system::SystemSource;

/// A producer of named metric values, called once per poll tick.
pub trait MetricSource: Send {
    /// Source name used in logs.
    fn name(&self) -> &str;

    /// Reads the current values.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system API call fails.
    fn collect(&mut self) -> Result<RawMetricSnapshot>;
}

/// The default set of sources the agent polls.
pub fn default_sources() -> Vec<Box<dyn MetricSource>> {
    vec![Box::new(RuntimeSource::new()), Box::new(SystemSource::new())]
}
