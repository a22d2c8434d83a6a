use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rtmon_common::types::{Metric, MetricRecord, MetricValue};
use rtmon_storage::{CounterMap, GaugeMap};

use super::{fetch_value, store_metric};
use crate::error::ApiError;
use crate::state::AppState;

/// `POST /update/`: store one record, answer with the stored state.
pub async fn update(State(state): State<AppState>, body: Bytes) -> Result<Json<MetricRecord>, ApiError> {
    let record: MetricRecord = serde_json::from_slice(&body)?;
    let metric = record.into_metric()?;
    store_metric(&state, &metric).await?;

    let value = fetch_value(&state, metric.kind(), &metric.name).await?;
    Ok(Json(MetricRecord::from(Metric {
        name: metric.name,
        value,
    })))
}

/// `POST /updates/`: store a whole batch in one call.
///
/// Every record is validated first; one bad record rejects the batch.
/// Counters sharing an id are summed, gauges keep the last value.
pub async fn updates(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let records: Vec<MetricRecord> = serde_json::from_slice(&body)?;

    let mut counters = CounterMap::new();
    let mut gauges = GaugeMap::new();
    for record in records {
        let metric = record.into_metric()?;
        match metric.value {
            MetricValue::Counter(delta) => {
                let total = counters.entry(metric.name).or_insert(0);
                *total = total.wrapping_add(delta);
            }
            MetricValue::Gauge(value) => {
                gauges.insert(metric.name, value);
            }
        }
    }

    tracing::debug!(counters = counters.len(), gauges = gauges.len(), "Storing batch");
    let storage = state.storage.as_ref();
    let (c, g) = (&counters, &gauges);
    state.with_retry(move || storage.store_all(c, g)).await?;

    Ok(StatusCode::OK.into_response())
}

/// `POST /value/`: fill the value into a record that names a metric.
pub async fn value(State(state): State<AppState>, body: Bytes) -> Result<Json<MetricRecord>, ApiError> {
    let query: MetricRecord = serde_json::from_slice(&body)?;
    if query.id.is_empty() {
        return Err(ApiError::BadRequest("metric id is empty".to_string()));
    }
    let value = fetch_value(&state, query.kind, &query.id).await?;
    Ok(Json(MetricRecord::from(Metric {
        name: query.id,
        value,
    })))
}
