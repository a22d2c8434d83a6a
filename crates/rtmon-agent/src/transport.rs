use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::chain::OutgoingRequest;

/// Delivers a prepared request to the server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutgoingRequest) -> Result<()>;
}

/// POSTs JSON batches to `http://{address}/updates/`.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(address: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            url: updates_url(address),
        })
    }
}

fn updates_url(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.contains("://") {
        format!("{address}/updates/")
    } else {
        format!("http://{address}/updates/")
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: OutgoingRequest) -> Result<()> {
        let mut builder = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }

        let response = builder
            .body(request.body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("server answered {status}: {}", body.trim());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_from_address() {
        assert_eq!(updates_url("localhost:8080"), "http://localhost:8080/updates/");
        assert_eq!(updates_url("http://10.0.0.1:9000/"), "http://10.0.0.1:9000/updates/");
    }
}
