use axum::http::{header, Extensions, HeaderMap, StatusCode, Version};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use rtmon_common::shutdown::Shutdown;
use std::future::Future;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::compression::CompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;

use crate::api::{json, text};
use crate::logging;
use crate::state::AppState;

/// Gzip is applied to JSON and HTML bodies only.
fn compressible(_: StatusCode, _: Version, headers: &HeaderMap, _: &Extensions) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|media| matches!(media.trim(), "application/json" | "text/html"))
        .unwrap_or(false)
}

/// Routes and layers, innermost first: content type (JSON routes only),
/// response compression, ingress security, body limit, request logging.
///
/// Compression sits inside the security layer so the response signature
/// covers the bytes on the wire.
pub fn build_http_app(state: AppState) -> Router {
    let json_routes = Router::new()
        .route("/update/", post(json::update))
        .route("/updates/", post(json::updates))
        .route("/value/", post(json::value))
        .route_layer(middleware::from_fn(crate::middleware::require_json));

    let text_routes = Router::new()
        .route("/", get(text::list))
        .route("/update/{kind}/{name}/{value}", post(text::update))
        .route("/value/{kind}/{name}", get(text::value))
        .route("/ping", get(text::ping));

    let max_body_bytes = state.config.max_body_bytes;

    json_routes
        .merge(text_routes)
        .layer(CompressionLayer::new().compress_when(compressible))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::secure_ingress,
        ))
        .with_state(state.clone())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(middleware::from_fn_with_state(state, logging::request_logging))
}

/// Serves `app` until `signal` resolves and in-flight requests have drained,
/// then stops background storage work and joins it.
///
/// `shutdown` is triggered only after the drain, so mutations finishing
/// during it still reach the final file snapshot.
pub async fn serve<S>(
    listener: TcpListener,
    app: Router,
    signal: S,
    shutdown: &Shutdown,
    background: Option<JoinHandle<()>>,
) -> anyhow::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let served = axum::serve(listener, app).with_graceful_shutdown(signal).await;
    shutdown.trigger();

    if let Some(background) = background {
        if let Err(e) = background.await {
            tracing::error!(error = %e, "Snapshot flusher failed");
        }
    }
    served?;
    Ok(())
}
