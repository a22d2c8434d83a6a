//! The rtmon agent: polls metric sources and reports batches to the server.
//!
//! Data flows `MetricSource -> collector -> Poller -> Reporter -> senders`,
//! all tasks stopping on one shared `watch` shutdown signal.

pub mod agent;
pub mod chain;
pub mod collector;
pub mod config;
pub mod poller;
pub mod reporter;
pub mod transport;

pub use agent::run_agent;
pub use config::AgentConfig;
