use anyhow::{Context, Result};
use rtmon_storage::StorageConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, `host:port`.
    #[serde(default = "default_address")]
    pub address: String,
    /// Snapshot cadence for file storage; 0 writes on every update.
    #[serde(default = "default_store_interval")]
    pub store_interval_secs: u64,
    /// Snapshot path; empty disables file storage.
    #[serde(default = "default_file_storage_path")]
    pub file_storage_path: String,
    /// Load the snapshot at startup.
    #[serde(default = "default_restore")]
    pub restore: bool,
    /// PostgreSQL DSN; takes precedence over file storage.
    #[serde(default)]
    pub database_dsn: Option<String>,
    /// HMAC key for request verification and response signing.
    #[serde(default)]
    pub key: Option<String>,
    /// Payload key file, generated on first start when missing.
    #[serde(default)]
    pub crypto_key: Option<PathBuf>,
    /// CIDR that `X-Real-IP` must fall into.
    #[serde(default)]
    pub trusted_subnet: Option<String>,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_address() -> String {
    "localhost:8080".to_string()
}

fn default_store_interval() -> u64 {
    300
}

fn default_file_storage_path() -> String {
    "/tmp/metrics-db.json".to_string()
}

fn default_restore() -> bool {
    true
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            store_interval_secs: default_store_interval(),
            file_storage_path: default_file_storage_path(),
            restore: default_restore(),
            database_dsn: None,
            key: None,
            crypto_key: None,
            trusted_subnet: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = Self::from_file(Path::new(path))?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Overrides from `ADDRESS`, `STORE_INTERVAL`, `FILE_STORAGE_PATH`,
    /// `RESTORE`, `DATABASE_DSN`, `KEY`, `CRYPTO_KEY` and `TRUSTED_SUBNET`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ADDRESS") {
            self.address = v;
        }
        if let Some(v) = lookup("STORE_INTERVAL") {
            self.store_interval_secs = v.trim().parse().with_context(|| format!("invalid STORE_INTERVAL: {v}"))?;
        }
        if let Some(v) = lookup("FILE_STORAGE_PATH") {
            self.file_storage_path = v;
        }
        if let Some(v) = lookup("RESTORE") {
            self.restore = v.trim().parse().with_context(|| format!("invalid RESTORE: {v}"))?;
        }
        if let Some(v) = lookup("DATABASE_DSN") {
            self.database_dsn = Some(v).filter(|d| !d.is_empty());
        }
        if let Some(v) = lookup("KEY") {
            self.key = Some(v).filter(|k| !k.is_empty());
        }
        if let Some(v) = lookup("CRYPTO_KEY") {
            self.crypto_key = Some(PathBuf::from(v)).filter(|p| !p.as_os_str().is_empty());
        }
        if let Some(v) = lookup("TRUSTED_SUBNET") {
            self.trusted_subnet = Some(v).filter(|s| !s.is_empty());
        }
        Ok(())
    }

    /// DSN first, then a non-empty file path, then memory.
    pub fn storage_config(&self) -> StorageConfig {
        if let Some(dsn) = &self.database_dsn {
            return StorageConfig::Sql { dsn: dsn.clone() };
        }
        if !self.file_storage_path.trim().is_empty() {
            return StorageConfig::File {
                path: PathBuf::from(&self.file_storage_path),
                interval: Duration::from_secs(self.store_interval_secs),
                restore: self.restore,
            };
        }
        StorageConfig::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.address, "localhost:8080");
        assert_eq!(config.store_interval_secs, 300);
        assert!(config.restore);
        assert_eq!(
            config.storage_config(),
            StorageConfig::File {
                path: PathBuf::from("/tmp/metrics-db.json"),
                interval: Duration::from_secs(300),
                restore: true,
            }
        );
    }

    #[test]
    fn toml_file_with_partial_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "address = \"0.0.0.0:9000\"\nstore_interval_secs = 0\nrestore = false\n").unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.address, "0.0.0.0:9000");
        assert_eq!(config.store_interval_secs, 0);
        assert!(!config.restore);
        assert_eq!(config.file_storage_path, "/tmp/metrics-db.json");
    }

    #[test]
    fn storage_precedence() {
        let mut config = ServerConfig::default();
        config
            .apply_env(env(&[("DATABASE_DSN", "postgres://localhost/metrics")]))
            .unwrap();
        assert!(matches!(config.storage_config(), StorageConfig::Sql { .. }));

        let mut config = ServerConfig::default();
        config.apply_env(env(&[("FILE_STORAGE_PATH", "")])).unwrap();
        assert_eq!(config.storage_config(), StorageConfig::Memory);
    }

    #[test]
    fn env_overrides() {
        let mut config = ServerConfig::default();
        config
            .apply_env(env(&[
                ("ADDRESS", "127.0.0.1:1"),
                ("STORE_INTERVAL", "0"),
                ("RESTORE", "false"),
                ("KEY", "secret"),
                ("CRYPTO_KEY", "/var/lib/rtmon/payload.key"),
                ("TRUSTED_SUBNET", "10.0.0.0/8"),
            ]))
            .unwrap();
        assert_eq!(config.address, "127.0.0.1:1");
        assert_eq!(config.store_interval_secs, 0);
        assert!(!config.restore);
        assert_eq!(config.key.as_deref(), Some("secret"));
        assert_eq!(config.crypto_key, Some(PathBuf::from("/var/lib/rtmon/payload.key")));
        assert_eq!(config.trusted_subnet.as_deref(), Some("10.0.0.0/8"));

        assert!(config.apply_env(env(&[("RESTORE", "maybe")])).is_err());
        assert!(config.apply_env(env(&[("STORE_INTERVAL", "-1")])).is_err());
    }
}
