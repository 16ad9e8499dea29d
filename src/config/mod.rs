//! Service configuration.
//!
//! Loaded from a YAML file (default `conf.yaml`):
//!
//! ```yaml
//! server:
//!   port: 8080
//! meta:
//!   kind: mysql
//!   host: 127.0.0.1
//!   port: 3306
//!   username: root
//!   password: secret
//!   database: binlog_sync
//! checkpoint:
//!   tick: 1s
//!   interval: 5s
//! sink:
//!   max_connections: 5
//!   write_timeout: 30s
//! ```

pub mod duration;

pub use duration::parse_duration;

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use meta_store::NewTask;
use mysql_sink::PoolSettings;
use serde::Deserialize;
use sync_core::DataSource;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub sink: SinkConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(text).context("Failed to parse YAML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.checkpoint.tick.is_zero() {
            anyhow::bail!("checkpoint.tick must be greater than zero");
        }
        if self.checkpoint.interval < self.checkpoint.tick {
            anyhow::bail!("checkpoint.interval must not be shorter than checkpoint.tick");
        }
        if self.sink.max_connections == 0 {
            anyhow::bail!("sink.max_connections must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where task metadata lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MetaConfig {
    Mysql(DataSource),
    /// Lost on restart; seeded from `tasks`.
    Memory {
        #[serde(default)]
        tasks: Vec<NewTask>,
    },
}

impl Default for MetaConfig {
    fn default() -> Self {
        MetaConfig::Memory { tasks: Vec::new() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    /// How often the checkpoint loop wakes up
    #[serde(default = "default_tick", deserialize_with = "duration::deserialize")]
    pub tick: Duration,
    /// Minimum time between two persisted positions
    #[serde(default = "default_interval", deserialize_with = "duration::deserialize")]
    pub interval: Duration,
}

fn default_tick() -> Duration {
    Duration::from_secs(1)
}

fn default_interval() -> Duration {
    Duration::from_secs(5)
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            tick: default_tick(),
            interval: default_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub write_timeout: Option<Duration>,
}

fn default_max_connections() -> usize {
    5
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            write_timeout: None,
        }
    }
}

impl SinkConfig {
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.max_connections,
            write_timeout: self.write_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.checkpoint.tick, Duration::from_secs(1));
        assert_eq!(config.checkpoint.interval, Duration::from_secs(5));
        assert_eq!(config.sink.max_connections, 5);
        assert!(config.sink.write_timeout.is_none());
        assert!(matches!(config.meta, MetaConfig::Memory { ref tasks } if tasks.is_empty()));
    }

    #[test]
    fn test_mysql_meta_and_durations() {
        let config = Config::from_yaml(
            r#"
server:
  port: 9090
meta:
  kind: mysql
  host: db.internal
  username: sync
  password: pw
  database: meta
checkpoint:
  tick: 500ms
  interval: 10
sink:
  max_connections: 2
  write_timeout: 1m
"#,
        )
        .unwrap();
        assert_eq!(config.server.bind_address(), "0.0.0.0:9090");
        let MetaConfig::Mysql(ds) = &config.meta else {
            panic!("expected mysql meta config");
        };
        assert_eq!(ds.port, 3306);
        assert_eq!(ds.database.as_deref(), Some("meta"));
        assert_eq!(config.checkpoint.tick, Duration::from_millis(500));
        assert_eq!(config.checkpoint.interval, Duration::from_secs(10));
        assert_eq!(
            config.sink.pool_settings(),
            PoolSettings {
                max_connections: 2,
                write_timeout: Some(Duration::from_secs(60)),
            }
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_yaml("checkpoint:\n  tick: 0s\n").is_err());
        assert!(Config::from_yaml("checkpoint:\n  tick: 10s\n  interval: 5s\n").is_err());
        assert!(Config::from_yaml("sink:\n  max_connections: 0\n").is_err());
        assert!(Config::from_yaml("checkpoint:\n  tick: soon\n").is_err());
    }
}
