use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentConfig {
    /// Server `host:port`, or a full base URL.
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// Number of concurrent senders.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    /// HMAC key; when set, every request carries `HashSHA256`.
    #[serde(default)]
    pub key: Option<String>,
    /// Path to the server's payload key; when set, bodies are encrypted.
    #[serde(default)]
    pub crypto_key: Option<PathBuf>,
    /// Sent as `X-Real-IP` for servers with a trusted subnet.
    #[serde(default)]
    pub real_ip: Option<IpAddr>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_address() -> String {
    "localhost:8080".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_rate_limit() -> usize {
    1
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            poll_interval_secs: default_poll_interval(),
            report_interval_secs: default_report_interval(),
            rate_limit: default_rate_limit(),
            key: None,
            crypto_key: None,
            real_ip: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl AgentConfig {
    /// Reads the TOML file (defaults when it does not exist), applies
    /// environment overrides and validates the result.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = Self::from_file(Path::new(path))?;
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
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

    /// Overrides fields from `ADDRESS`, `POLL_INTERVAL`, `REPORT_INTERVAL`,
    /// `RATE_LIMIT`, `KEY`, `CRYPTO_KEY` and `REAL_IP`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ADDRESS") {
            self.address = v;
        }
        if let Some(v) = lookup("POLL_INTERVAL") {
            self.poll_interval_secs = v.trim().parse().with_context(|| format!("invalid POLL_INTERVAL: {v}"))?;
        }
        if let Some(v) = lookup("REPORT_INTERVAL") {
            self.report_interval_secs = v.trim().parse().with_context(|| format!("invalid REPORT_INTERVAL: {v}"))?;
        }
        if let Some(v) = lookup("RATE_LIMIT") {
            self.rate_limit = v.trim().parse().with_context(|| format!("invalid RATE_LIMIT: {v}"))?;
        }
        if let Some(v) = lookup("KEY") {
            self.key = Some(v).filter(|k| !k.is_empty());
        }
        if let Some(v) = lookup("CRYPTO_KEY") {
            self.crypto_key = Some(PathBuf::from(v)).filter(|p| !p.as_os_str().is_empty());
        }
        if let Some(v) = lookup("REAL_IP") {
            self.real_ip = if v.trim().is_empty() {
                None
            } else {
                Some(v.trim().parse().with_context(|| format!("invalid REAL_IP: {v}"))?)
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            anyhow::bail!("address must not be empty");
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be at least 1");
        }
        if self.report_interval_secs == 0 {
            anyhow::bail!("report_interval_secs must be at least 1");
        }
        if self.rate_limit == 0 {
            anyhow::bail!("rate_limit must be at least 1");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
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
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig::from_file(&dir.path().join("agent.toml")).unwrap();
        assert_eq!(config, AgentConfig::default());
        assert_eq!(config.address, "localhost:8080");
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.report_interval(), Duration::from_secs(10));
        assert_eq!(config.rate_limit, 1);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "address = \"10.0.0.1:9000\"\nrate_limit = 4\nkey = \"secret\"\n").unwrap();

        let config = AgentConfig::from_file(&path).unwrap();
        assert_eq!(config.address, "10.0.0.1:9000");
        assert_eq!(config.rate_limit, 4);
        assert_eq!(config.key.as_deref(), Some("secret"));
        assert_eq!(config.poll_interval_secs, 2);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = AgentConfig::default();
        config
            .apply_env(env(&[
                ("ADDRESS", "example:1"),
                ("POLL_INTERVAL", "1"),
                ("REPORT_INTERVAL", "5"),
                ("RATE_LIMIT", "3"),
                ("KEY", "k"),
                ("CRYPTO_KEY", "/etc/rtmon/payload.key"),
                ("REAL_IP", "192.168.1.10"),
            ]))
            .unwrap();

        assert_eq!(config.address, "example:1");
        assert_eq!(config.poll_interval_secs, 1);
        assert_eq!(config.report_interval_secs, 5);
        assert_eq!(config.rate_limit, 3);
        assert_eq!(config.key.as_deref(), Some("k"));
        assert_eq!(config.crypto_key, Some(PathBuf::from("/etc/rtmon/payload.key")));
        assert_eq!(config.real_ip, Some("192.168.1.10".parse().unwrap()));
    }

    #[test]
    fn malformed_env_is_an_error() {
        let mut config = AgentConfig::default();
        assert!(config.apply_env(env(&[("RATE_LIMIT", "many")])).is_err());
        assert!(config.apply_env(env(&[("REAL_IP", "not-an-ip")])).is_err());
    }

    #[test]
    fn validation() {
        let mut config = AgentConfig::default();
        assert!(config.validate().is_ok());
        config.rate_limit = 0;
        assert!(config.validate().is_err());

        let config = AgentConfig {
            poll_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
