//! skyscale.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SkyscaleConfig {
    pub server: ServerConfig,
    pub lock: LockSettings,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            data_dir: PathBuf::from("/var/lib/skyscale"),
        }
    }
}

/// Lease lock settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LockSettings {
    /// Row key in the lease table; replicas sharing a name compete.
    pub name: String,
    /// Owner identity. `None` means the daemon generates one at startup.
    pub owner: Option<String>,
    /// Lease lifetime (e.g., "15s").
    pub ttl: String,
    /// Poll interval for acquire/refresh (e.g., "5s").
    pub retry_interval: String,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            name: "scalingengine_lock".to_string(),
            owner: None,
            ttl: "15s".to_string(),
            retry_interval: "5s".to_string(),
        }
    }
}

/// Scaling history retention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Entries older than this are pruned (e.g., "30d").
    pub cutoff: String,
    /// How often the pruner runs while this replica holds the lock.
    pub refresh_interval: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            cutoff: "30d".to_string(),
            refresh_interval: "1h".to_string(),
        }
    }
}

impl LockSettings {
    pub fn ttl(&self) -> anyhow::Result<Duration> {
        Ok(parse_duration(&self.ttl)?)
    }

    pub fn retry_interval(&self) -> anyhow::Result<Duration> {
        Ok(parse_duration(&self.retry_interval)?)
    }
}

impl HistoryConfig {
    pub fn cutoff(&self) -> anyhow::Result<Duration> {
        Ok(parse_duration(&self.cutoff)?)
    }

    pub fn refresh_interval(&self) -> anyhow::Result<Duration> {
        Ok(parse_duration(&self.refresh_interval)?)
    }
}

impl SkyscaleConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SkyscaleConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check that every duration parses and that the lease can be
    /// refreshed at least once before it expires.
    pub fn validate(&self) -> anyhow::Result<()> {
        let ttl = self.lock.ttl()?;
        let retry = self.lock.retry_interval()?;
        if ttl.is_zero() {
            anyhow::bail!("lock.ttl must be greater than zero");
        }
        if retry.is_zero() {
            anyhow::bail!("lock.retry_interval must be greater than zero");
        }
        if retry >= ttl {
            anyhow::bail!(
                "lock.retry_interval ({}) must be shorter than lock.ttl ({})",
                self.lock.retry_interval,
                self.lock.ttl
            );
        }
        if self.lock.name.trim().is_empty() {
            anyhow::bail!("lock.name must not be empty");
        }

        self.history.cutoff()?;
        if self.history.refresh_interval()?.is_zero() {
            anyhow::bail!("history.refresh_interval must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: SkyscaleConfig = toml::from_str("").unwrap();
        assert_eq!(config, SkyscaleConfig::default());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.lock.ttl().unwrap(), Duration::from_secs(15));
        config.validate().unwrap();
    }

    #[test]
    fn parse_full() {
        let toml_str = r#"
[server]
port = 9000
data_dir = "/tmp/skyscale"

[lock]
name = "engine"
owner = "replica-a"
ttl = "30s"
retry_interval = "10s"

[history]
cutoff = "7d"
refresh_interval = "30m"
"#;
        let config: SkyscaleConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.lock.owner.as_deref(), Some("replica-a"));
        assert_eq!(config.lock.retry_interval().unwrap(), Duration::from_secs(10));
        assert_eq!(config.history.cutoff().unwrap(), Duration::from_secs(7 * 86_400));
        config.validate().unwrap();
    }

    #[test]
    fn retry_interval_must_be_shorter_than_ttl() {
        let mut config = SkyscaleConfig::default();
        config.lock.ttl = "5s".to_string();
        config.lock.retry_interval = "5s".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("shorter than lock.ttl"));
    }

    #[test]
    fn invalid_duration_is_rejected() {
        let mut config = SkyscaleConfig::default();
        config.history.cutoff = "forever".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skyscale.toml");

        let mut config = SkyscaleConfig::default();
        config.lock.name = "operator_lock".to_string();
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = SkyscaleConfig::from_file(&path).unwrap();
        assert_eq!(loaded.lock.name, "operator_lock");
    }
}
