//! Configuration handling for the LiveLens server

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which dispatcher the server runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// One tree broadcast to every viewer
    Shared,
    /// An isolated tree per viewer
    #[default]
    PerConnection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub strategy: StrategyKind,

    /// Directory served for every path not claimed by the server
    #[serde(default)]
    pub static_dir: Option<PathBuf>,

    /// How often expired blobs are purged
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            strategy: StrategyKind::default(),
            static_dir: None,
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

impl ServerConfig {
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8080 }
fn default_purge_interval_secs() -> u64 { 10 }

/// Load configuration from file or use defaults
pub fn load_config(path: Option<PathBuf>) -> Result<ServerConfig> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            let config = toml::from_str(&content)
                .with_context(|| format!("Invalid config {}", path.display()))?;
            Ok(config)
        }
        None => Ok(ServerConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.address(), "127.0.0.1:8080");
        assert_eq!(config.strategy, StrategyKind::PerConnection);
        assert!(config.static_dir.is_none());
        assert_eq!(load_config(None).unwrap(), config);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ServerConfig = toml::from_str("port = 9000\nstrategy = \"shared\"").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.strategy, StrategyKind::Shared);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.purge_interval_secs, 10);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host = \"0.0.0.0\"\nstatic_dir = \"public\"").unwrap();

        let config = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.static_dir, Some(PathBuf::from("public")));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load_config(Some(PathBuf::from("/nonexistent/livelens.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_purge_interval_is_never_zero() {
        let config = ServerConfig {
            purge_interval_secs: 0,
            ..ServerConfig::default()
        };
        assert_eq!(config.purge_interval(), Duration::from_secs(1));
    }
}
