//! HTTP handlers. [`json`] serves the agent-facing endpoints, [`text`] the
//! URL-addressed and human-readable ones.

pub mod json;
pub mod text;

use rtmon_common::types::{Metric, MetricKind, MetricValue};

use crate::error::ApiError;
use crate::state::AppState;

/// Applies one metric: counters add, gauges overwrite.
pub(crate) async fn store_metric(state: &AppState, metric: &Metric) -> Result<(), ApiError> {
    let storage = state.storage.as_ref();
    let name = metric.name.as_str();
    match metric.value {
        MetricValue::Counter(delta) => state.with_retry(move || storage.store_counter(name, delta)).await?,
        MetricValue::Gauge(value) => state.with_retry(move || storage.store_gauge(name, value)).await?,
    }
    Ok(())
}

/// Current stored value, or [`ApiError::NotFound`].
pub(crate) async fn fetch_value(state: &AppState, kind: MetricKind, name: &str) -> Result<MetricValue, ApiError> {
    let storage = state.storage.as_ref();
    let value = match kind {
        MetricKind::Counter => MetricValue::Counter(state.with_retry(move || storage.get_counter(name)).await?),
        MetricKind::Gauge => MetricValue::Gauge(state.with_retry(move || storage.get_gauge(name)).await?),
    };
    Ok(value)
}
