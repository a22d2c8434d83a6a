mod common;

use axum::http::StatusCode;
use common::{build_test_context, request_no_body};

#[tokio::test]
async fn update_and_read_back() -> anyhow::Result<()> {
    let ctx = build_test_context()?;

    let resp = request_no_body(&ctx.app, "POST", "/update/gauge/Alloc/12.5").await;
    assert_eq!(resp.status, StatusCode::OK);
    let resp = request_no_body(&ctx.app, "GET", "/value/gauge/Alloc").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.text(), "12.5");

    request_no_body(&ctx.app, "POST", "/update/counter/PollCount/3").await;
    request_no_body(&ctx.app, "POST", "/update/counter/PollCount/3").await;
    let resp = request_no_body(&ctx.app, "GET", "/value/counter/PollCount").await;
    assert_eq!(resp.text(), "6");
    Ok(())
}

#[tokio::test]
async fn bad_kind_or_value() -> anyhow::Result<()> {
    let ctx = build_test_context()?;

    let resp = request_no_body(&ctx.app, "POST", "/update/histogram/x/1").await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    let resp = request_no_body(&ctx.app, "POST", "/update/counter/x/1.5").await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    let resp = request_no_body(&ctx.app, "POST", "/update/gauge/x/abc").await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    let resp = request_no_body(&ctx.app, "GET", "/value/histogram/x").await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn unknown_metric_is_not_found() -> anyhow::Result<()> {
    let ctx = build_test_context()?;
    let resp = request_no_body(&ctx.app, "GET", "/value/counter/Missing").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn list_is_sorted_by_kind_then_name() -> anyhow::Result<()> {
    let ctx = build_test_context()?;
    request_no_body(&ctx.app, "POST", "/update/gauge/Zeta/1").await;
    request_no_body(&ctx.app, "POST", "/update/gauge/Alloc/2.5").await;
    request_no_body(&ctx.app, "POST", "/update/counter/PollCount/6").await;

    let resp = request_no_body(&ctx.app, "GET", "/").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.text(), "counter/PollCount/6\ngauge/Alloc/2.5\ngauge/Zeta/1\n");
    Ok(())
}

#[tokio::test]
async fn ping_and_trace_id() -> anyhow::Result<()> {
    let ctx = build_test_context()?;
    let resp = request_no_body(&ctx.app, "GET", "/ping").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.text(), "OK");

    let trace = resp.headers.get("x-trace-id").and_then(|v| v.to_str().ok()).unwrap_or_default();
    assert_eq!(trace.len(), 16);
    Ok(())
}
