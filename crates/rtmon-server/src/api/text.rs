use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use rtmon_common::types::{Metric, MetricKind};
use std::fmt::Write;

use super::{fetch_value, store_metric};
use crate::error::ApiError;
use crate::state::AppState;

fn parse_kind(raw: &str) -> Result<MetricKind, ApiError> {
    raw.parse::<MetricKind>().map_err(ApiError::from)
}

/// `POST /update/{kind}/{name}/{value}`
pub async fn update(
    State(state): State<AppState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let kind = parse_kind(&kind)?;
    let value = kind.parse_value(&value)?;
    store_metric(&state, &Metric { name, value }).await?;
    Ok(StatusCode::OK)
}

/// `GET /value/{kind}/{name}`: the bare value as text.
pub async fn value(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let value = fetch_value(&state, kind, &name).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], value.to_string()))
}

/// `GET /`: every stored metric, one `kind/name/value` line each.
pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let storage = state.storage.as_ref();
    let (counters, gauges) = state.with_retry(move || storage.get_all()).await?;

    let mut counters: Vec<_> = counters.into_iter().collect();
    counters.sort();
    let mut gauges: Vec<_> = gauges.into_iter().collect();
    gauges.sort_by(|a, b| a.0.cmp(&b.0));

    let mut body = String::new();
    for (name, total) in counters {
        let _ = writeln!(body, "counter/{name}/{total}");
    }
    for (name, value) in gauges {
        let _ = writeln!(body, "gauge/{name}/{value}");
    }
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body))
}

/// `GET /ping`: storage liveness.
pub async fn ping(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    state.storage.ping().await.map_err(|e| {
        tracing::error!(error = %e, "Storage ping failed");
        ApiError::Internal("storage is not reachable".to_string())
    })?;
    Ok("OK")
}
