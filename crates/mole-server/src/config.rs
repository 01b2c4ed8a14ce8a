//! Server configuration
//!
//! Layered lowest to highest: built-in defaults, an optional TOML file,
//! `MOLE_*` environment variables, then command-line flags (applied by the
//! binary).

use mole_rendezvous::RendezvousConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration loading failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
    /// The config file is not valid TOML for [`ServerConfig`]
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// File that failed
        path: PathBuf,
        /// Underlying parse error
        source: toml::de::Error,
    },
    /// A value is out of range or unparseable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Slot timings as written in the config file, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendezvousSection {
    /// Slot time-to-live
    pub slot_ttl_secs: u64,
    /// Sweeper period
    pub sweep_period_secs: u64,
    /// Grace past expiry before eviction
    pub sweep_grace_secs: u64,
    /// Upper bound on a blocked delivery
    pub deliver_timeout_secs: u64,
}

impl Default for RendezvousSection {
    fn default() -> Self {
        let defaults = RendezvousConfig::default();
        Self {
            slot_ttl_secs: defaults.slot_ttl.as_secs(),
            sweep_period_secs: defaults.sweep_period.as_secs(),
            sweep_grace_secs: defaults.sweep_grace.as_secs(),
            deliver_timeout_secs: defaults.deliver_timeout.as_secs(),
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to
    pub bind_address: String,
    /// Public base URL used in rendered links
    pub base_url: String,
    /// Public base URL for WebSocket connections
    pub ws_base_url: String,
    /// Directory served under `/static`
    pub static_dir: PathBuf,
    /// Slot timings
    pub rendezvous: RendezvousSection,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            base_url: "http://localhost:8080/".to_string(),
            ws_base_url: "ws://localhost:8080/".to_string(),
            static_dir: PathBuf::from("static"),
            rendezvous: RendezvousSection::default(),
        }
    }
}

impl ServerConfig {
    /// Load from `path`, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `MOLE_*` overrides from the process environment
    pub fn merge_with_env(&mut self) {
        self.merge_with_vars(|key| std::env::var(key).ok());
    }

    /// Apply `MOLE_*` overrides from an arbitrary variable source
    pub fn merge_with_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(value) = var("MOLE_BIND_ADDRESS") {
            self.bind_address = value;
        }
        if let Some(value) = var("MOLE_BASE_URL") {
            self.base_url = value;
        }
        if let Some(value) = var("MOLE_WS_BASE_URL") {
            self.ws_base_url = value;
        }
        if let Some(value) = var("MOLE_STATIC_DIR") {
            self.static_dir = PathBuf::from(value);
        }
    }

    /// Parsed bind address
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_address
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("bind_address {:?}: {e}", self.bind_address)))
    }

    /// Slot timings for the rendezvous core
    pub fn rendezvous_config(&self) -> RendezvousConfig {
        let section = &self.rendezvous;
        RendezvousConfig {
            slot_ttl: Duration::from_secs(section.slot_ttl_secs),
            sweep_period: Duration::from_secs(section.sweep_period_secs),
            sweep_grace: Duration::from_secs(section.sweep_grace_secs),
            deliver_timeout: Duration::from_secs(section.deliver_timeout_secs),
        }
    }

    /// Validate every field
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        for (name, url) in [("base_url", &self.base_url), ("ws_base_url", &self.ws_base_url)] {
            if !url.contains("://") {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be an absolute URL, got {url:?}"
                )));
            }
        }
        self.rendezvous_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = ServerConfig::load(Path::new("/nonexistent/mole.toml")).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mole.toml");
        std::fs::write(
            &path,
            "base_url = \"https://mole.party/\"\n[rendezvous]\nslot_ttl_secs = 120\n",
        )
        .unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.base_url, "https://mole.party/");
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.rendezvous.slot_ttl_secs, 120);
        assert_eq!(config.rendezvous.sweep_period_secs, 60);
        assert_eq!(
            config.rendezvous_config().slot_ttl,
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_bad_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mole.toml");
        std::fs::write(&path, "bind_address = [").unwrap();

        assert_matches!(ServerConfig::load(&path), Err(ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let vars: HashMap<&str, &str> = [
            ("MOLE_BIND_ADDRESS", "127.0.0.1:9000"),
            ("MOLE_WS_BASE_URL", "wss://mole.party/"),
        ]
        .into_iter()
        .collect();

        let mut config = ServerConfig::default();
        config.merge_with_vars(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.ws_base_url, "wss://mole.party/");
        assert_eq!(config.base_url, "http://localhost:8080/");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ServerConfig {
            bind_address: "not an address".to_string(),
            ..ServerConfig::default()
        };
        assert_matches!(config.validate(), Err(ConfigError::Invalid(_)));

        config.bind_address = "127.0.0.1:0".to_string();
        config.rendezvous.sweep_period_secs = 0;
        assert_matches!(config.validate(), Err(ConfigError::Invalid(_)));

        config.rendezvous.sweep_period_secs = 60;
        config.base_url = "mole.party".to_string();
        assert_matches!(config.validate(), Err(ConfigError::Invalid(_)));
    }
}
