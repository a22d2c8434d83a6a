use anyhow::{Context, Result};
use rtmon_collector::{default_sources, MetricSource};
use rtmon_security::{ChunkCipher, Encrypter, HmacSigner};
use std::sync::Arc;
use tokio::sync::watch;

use crate::chain::SecurityChain;
use crate::config::AgentConfig;
use crate::poller::Poller;
use crate::reporter::Reporter;
use crate::transport::{HttpTransport, Transport};

/// Builds the egress chain from the configured key material.
pub fn build_chain(config: &AgentConfig) -> Result<SecurityChain> {
    let encrypter: Option<Arc<dyn Encrypter>> = match &config.crypto_key {
        Some(path) => {
            let cipher = ChunkCipher::load(path)
                .with_context(|| format!("failed to load crypto key {}", path.display()))?;
            Some(Arc::new(cipher))
        }
        None => None,
    };
    let signer = match &config.key {
        Some(key) => Some(HmacSigner::new(key.as_bytes())?),
        None => None,
    };
    Ok(SecurityChain::new(config.real_ip, encrypter, signer))
}

/// Runs the poller and reporter until `shutdown` fires, then joins both.
pub async fn run_agent(config: AgentConfig, shutdown: watch::Receiver<bool>) -> Result<()> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.address, config.request_timeout())?);
    run_with(config, default_sources(), transport, shutdown).await
}

pub async fn run_with(
    config: AgentConfig,
    sources: Vec<Box<dyn MetricSource>>,
    transport: Arc<dyn Transport>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let chain = build_chain(&config)?;
    let (poller, handle) = Poller::new(config.poll_interval(), sources);
    let reporter = Reporter::new(config.report_interval(), config.rate_limit, handle, chain, transport);

    let poller_task = tokio::spawn(poller.run(shutdown.clone()));
    let reporter_task = tokio::spawn(reporter.run(shutdown));

    reporter_task.await.context("reporter task panicked")?;
    poller_task.await.context("poller task panicked")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_follows_config() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("payload.key");
        ChunkCipher::load_or_create(&key_path).unwrap();

        let config = AgentConfig {
            key: Some("secret".into()),
            crypto_key: Some(key_path),
            real_ip: Some("127.0.0.1".parse().unwrap()),
            ..Default::default()
        };
        assert_eq!(build_chain(&config).unwrap().stage_names(), vec!["real-ip", "encrypt", "sign"]);
        assert!(build_chain(&AgentConfig::default()).unwrap().stages().is_empty());
    }

    #[test]
    fn missing_crypto_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig {
            crypto_key: Some(dir.path().join("absent.key")),
            ..Default::default()
        };
        assert!(build_chain(&config).is_err());
    }
}
