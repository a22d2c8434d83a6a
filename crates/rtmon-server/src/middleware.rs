use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;
use rtmon_security::SecurityError;
use std::net::IpAddr;

use crate::error::ApiError;
use crate::logging::TraceId;
use crate::state::AppState;

static SIGNATURE_HEADER: HeaderName = HeaderName::from_static("hashsha256");
static REAL_IP_HEADER: HeaderName = HeaderName::from_static("x-real-ip");

fn trace_id(req: &Request) -> String {
    req.extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default()
}

/// Rejects requests whose `Content-Type` media type is not
/// `application/json`. Parameters such as `charset` are ignored.
pub async fn require_json(req: Request, next: Next) -> Result<Response, ApiError> {
    let media_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase());

    if media_type.as_deref() != Some("application/json") {
        return Err(ApiError::UnsupportedContentType);
    }
    Ok(next.run(req).await)
}

/// Server ingress checks, in order:
///
/// 1. With a trusted subnet, `X-Real-IP` must be present and inside it (403).
/// 2. With a key, the `HashSHA256` header must match the raw body (400).
/// 3. With a crypto key, the body is decrypted before the handler sees it (400).
///
/// Steps 2 and 3 apply to body-carrying methods only. Signature checks run
/// on the bytes as received, so tampered ciphertext never reaches the
/// decrypter. With a key, every handler response is signed as well.
pub async fn secure_ingress(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, ApiError> {
    if let Some(subnet) = &state.trusted_subnet {
        let ip = req
            .headers()
            .get(&REAL_IP_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        match ip {
            Some(ip) if subnet.contains(ip) => {}
            _ => {
                tracing::warn!(trace_id = %trace_id(&req), ip = ?ip, subnet = %subnet, "Request rejected: untrusted address");
                return Err(ApiError::Forbidden);
            }
        }
    }

    let has_body = matches!(*req.method(), Method::POST | Method::PUT | Method::PATCH);
    let req = if has_body && (state.signer.is_some() || state.decrypter.is_some()) {
        let trace_id = trace_id(&req);
        let (mut parts, body) = req.into_parts();
        let bytes = to_bytes(body, state.config.max_body_bytes)
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;

        if let Some(signer) = &state.signer {
            let Some(signature) = parts.headers.get(&SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
                tracing::warn!(trace_id = %trace_id, "Request rejected: signature header missing");
                return Err(SecurityError::MissingSignature.into());
            };
            if let Err(e) = signer.verify(&bytes, signature) {
                tracing::warn!(trace_id = %trace_id, error = %e, "Request rejected: bad signature");
                return Err(e.into());
            }
        }

        let bytes = match &state.decrypter {
            Some(decrypter) => match decrypter.decrypt(&bytes) {
                Ok(plain) => Bytes::from(plain),
                Err(e) => {
                    tracing::warn!(trace_id = %trace_id, error = %e, "Request rejected: body does not decrypt");
                    return Err(e.into());
                }
            },
            None => bytes,
        };

        parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        Request::from_parts(parts, Body::from(bytes))
    } else {
        req
    };

    let response = next.run(req).await;

    let Some(signer) = &state.signer else {
        return Ok(response);
    };
    let (mut parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to buffer response: {e}")))?;
    if let Ok(value) = HeaderValue::from_str(&signer.sign(&bytes)) {
        parts.headers.insert(&SIGNATURE_HEADER, value);
    }
    Ok(Response::from_parts(parts, Body::from(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use rtmon_common::shutdown::Shutdown;
    use rtmon_security::{ChunkCipher, Decrypter, Encrypter, HmacSigner, TrustedSubnet};
    use rtmon_storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn echo(body: Bytes) -> Bytes {
        body
    }

    fn state() -> AppState {
        let shutdown = Shutdown::new();
        AppState::new(Arc::new(MemoryStore::new()), ServerConfig::default(), shutdown.subscribe())
    }

    fn router(state: AppState) -> Router {
        Router::new()
            .route("/echo", post(echo))
            .route_layer(axum::middleware::from_fn(require_json))
            .layer(axum::middleware::from_fn_with_state(state.clone(), secure_ingress))
            .with_state(state)
    }

    fn post_req(body: impl Into<Body>, headers: &[(&str, &str)]) -> Request {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/echo")
            .header(header::CONTENT_TYPE, "application/json");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(body.into()).unwrap()
    }

    async fn body_of(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    #[tokio::test]
    async fn content_type_must_be_json() {
        let app = router(state());
        let req = Request::builder()
            .method(Method::POST)
            .uri("/echo")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("{}"))
            .unwrap();
        assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::BAD_REQUEST);

        let req = Request::builder()
            .method(Method::POST)
            .uri("/echo")
            .header(header::CONTENT_TYPE, "Application/JSON; charset=utf-8")
            .body(Body::from("{}"))
            .unwrap();
        assert_eq!(app.oneshot(req).await.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn trusted_subnet() {
        let mut state = state();
        state.trusted_subnet = Some("10.0.0.0/8".parse::<TrustedSubnet>().unwrap());
        let app = router(state);

        let resp = app.clone().oneshot(post_req("{}", &[])).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app.clone().oneshot(post_req("{}", &[("X-Real-IP", "192.168.0.1")])).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app.oneshot(post_req("{}", &[("X-Real-IP", "10.1.2.3")])).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn signature_is_required_and_checked() {
        let signer = HmacSigner::new(b"secret").unwrap();
        let mut state = state();
        state.signer = Some(signer.clone());
        let app = router(state);

        let resp = app.clone().oneshot(post_req("{}", &[])).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let wrong = signer.sign(b"{ }");
        let resp = app.clone().oneshot(post_req("{}", &[("HashSHA256", wrong.as_str())])).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let good = signer.sign(b"{}");
        let resp = app.oneshot(post_req("{}", &[("HashSHA256", good.as_str())])).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let response_sig = resp.headers().get("HashSHA256").unwrap().to_str().unwrap().to_string();
        let body = body_of(resp).await;
        assert_eq!(body, b"{}");
        assert!(signer.verify(&body, &response_sig).is_ok());
    }

    #[tokio::test]
    async fn encrypted_body_reaches_handler_as_plaintext() {
        let cipher = Arc::new(ChunkCipher::from_key_bytes(&[9u8; 32]).unwrap().with_max_payload(8));
        let signer = HmacSigner::new(b"secret").unwrap();
        let mut state = state();
        state.decrypter = Some(cipher.clone());
        state.signer = Some(signer.clone());
        let app = router(state);

        let plaintext = br#"[{"id":"Alloc","type":"gauge","value":1}]"#;
        let ciphertext = cipher.encrypt(plaintext).unwrap();
        let signature = signer.sign(&ciphertext);
        let resp = app
            .clone()
            .oneshot(post_req(ciphertext.clone(), &[("HashSHA256", signature.as_str())]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_of(resp).await, plaintext);

        let mut tampered = ciphertext;
        tampered[0] ^= 0x01;
        let resp = app.oneshot(post_req(tampered, &[("HashSHA256", signature.as_str())])).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    struct CountingDecrypter {
        inner: ChunkCipher,
        calls: AtomicUsize,
    }

    impl Decrypter for CountingDecrypter {
        fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, SecurityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.decrypt(ciphertext)
        }
    }

    #[tokio::test]
    async fn tampered_body_fails_verification_before_decrypt() {
        let cipher = ChunkCipher::from_key_bytes(&[5u8; 32]).unwrap().with_max_payload(8);
        let ciphertext = cipher.encrypt(br#"[{"id":"PollCount","type":"counter","delta":1}]"#).unwrap();
        let decrypter = Arc::new(CountingDecrypter {
            inner: cipher,
            calls: AtomicUsize::new(0),
        });
        let signer = HmacSigner::new(b"secret").unwrap();
        let mut state = state();
        state.decrypter = Some(decrypter.clone());
        state.signer = Some(signer.clone());
        let app = router(state);

        let signature = signer.sign(&ciphertext);
        let last = ciphertext.len() - 1;
        for index in [0, ciphertext.len() / 2, last] {
            let mut tampered = ciphertext.clone();
            tampered[index] ^= 0x80;
            let resp = app
                .clone()
                .oneshot(post_req(tampered, &[("HashSHA256", signature.as_str())]))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: serde_json::Value = serde_json::from_slice(&body_of(resp).await).unwrap();
            assert_eq!(body["err_msg"], "signature mismatch");
        }
        assert_eq!(decrypter.calls.load(Ordering::SeqCst), 0);

        let resp = app.oneshot(post_req(ciphertext, &[("HashSHA256", signature.as_str())])).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(decrypter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_signature_is_reported() {
        let mut state = state();
        state.signer = Some(HmacSigner::new(b"secret").unwrap());
        let app = router(state);

        let resp = app.oneshot(post_req("{}", &[])).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_slice(&body_of(resp).await).unwrap();
        assert_eq!(body["err_msg"], "signature header missing");
    }

    #[tokio::test]
    async fn garbage_ciphertext_is_rejected() {
        let mut state = state();
        state.decrypter = Some(Arc::new(ChunkCipher::from_key_bytes(&[9u8; 32]).unwrap()));
        let app = router(state);

        let resp = app.oneshot(post_req("not encrypted", &[])).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
