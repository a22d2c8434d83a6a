#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use rtmon_common::retry::RetryPolicy;
use rtmon_common::shutdown::Shutdown;
use rtmon_server::app;
use rtmon_server::config::ServerConfig;
use rtmon_server::state::AppState;
use rtmon_storage::MemoryStore;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub shutdown: Shutdown,
    pub state: AppState,
    pub app: axum::Router,
}

pub fn build_test_context() -> Result<TestContext> {
    build_test_context_with(|_| {})
}

/// In-memory server state; `configure` may switch on security features
/// before the router is built.
pub fn build_test_context_with<F>(configure: F) -> Result<TestContext>
where
    F: FnOnce(&mut AppState),
{
    let temp_dir = tempfile::tempdir()?;
    let shutdown = Shutdown::new();
    let config = ServerConfig {
        file_storage_path: String::new(),
        ..Default::default()
    };

    let mut state = AppState::new(Arc::new(MemoryStore::new()), config, shutdown.subscribe());
    state.retry = Arc::new(RetryPolicy::none());
    configure(&mut state);
    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        shutdown,
        state,
        app,
    })
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or_else(|_| Value::String(self.text()))
    }
}

pub async fn request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    content_type: Option<&str>,
    body: impl Into<Body>,
    headers: &[(&str, &str)],
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(content_type) = content_type {
        builder = builder.header("Content-Type", content_type);
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let req = builder.body(body.into()).expect("request should build");

    let resp = app.clone().oneshot(req).await.expect("request should be handled");
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read")
        .to_vec();

    TestResponse { status, headers, body }
}

pub async fn request_json(app: &axum::Router, uri: &str, body: Value) -> TestResponse {
    request(app, "POST", uri, Some("application/json"), body.to_string(), &[]).await
}

pub async fn request_no_body(app: &axum::Router, method: &str, uri: &str) -> TestResponse {
    request(app, method, uri, None, Body::empty(), &[]).await
}
