use anyhow::{Context, Result};
use rtmon_common::retry::{RetryError, RetryPolicy};
use rtmon_security::{ChunkCipher, Decrypter, HmacSigner, TrustedSubnet};
use rtmon_storage::{open_storage, Storage, StorageError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub retry: Arc<RetryPolicy>,
    pub signer: Option<HmacSigner>,
    pub decrypter: Option<Arc<dyn Decrypter>>,
    pub trusted_subnet: Option<TrustedSubnet>,
    pub shutdown: watch::Receiver<bool>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Bare state around an opened backend; security features off.
    pub fn new(storage: Arc<dyn Storage>, config: ServerConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            storage,
            retry: Arc::new(RetryPolicy::default()),
            signer: None,
            decrypter: None,
            trusted_subnet: None,
            shutdown,
            config: Arc::new(config),
        }
    }

    /// Opens storage and key material as configured. The returned handle is
    /// the file flusher, if any, to be joined after the server stops.
    pub async fn from_config(
        config: ServerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(Self, Option<JoinHandle<()>>)> {
        let opened = open_storage(&config.storage_config(), shutdown.clone())
            .await
            .context("failed to open storage")?;

        let signer = match &config.key {
            Some(key) => Some(HmacSigner::new(key.as_bytes())?),
            None => None,
        };
        let decrypter: Option<Arc<dyn Decrypter>> = match &config.crypto_key {
            Some(path) => {
                let cipher = ChunkCipher::load_or_create(path)
                    .with_context(|| format!("failed to load crypto key {}", path.display()))?;
                Some(Arc::new(cipher))
            }
            None => None,
        };
        let trusted_subnet = match &config.trusted_subnet {
            Some(cidr) => Some(cidr.parse::<TrustedSubnet>()?),
            None => None,
        };

        let mut state = Self::new(opened.storage, config, shutdown);
        state.signer = signer;
        state.decrypter = decrypter;
        state.trusted_subnet = trusted_subnet;
        Ok((state, opened.background))
    }

    /// Runs a storage call under the retry policy, retrying only what the
    /// backend classifies as transient.
    pub async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, RetryError<StorageError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let storage = self.storage.as_ref();
        self.retry.run(&self.shutdown, |e| storage.is_transient(e), op).await
    }
}
