//! Server configuration loaded from `config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::quest::EngineSettings;

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "QUEST_SERVER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Directory holding `quests/` and `items/`
    pub data_dir: PathBuf,
    /// Used when `RUST_LOG` is not set
    pub log_filter: String,
    /// Outbound frames queued per connected player
    pub notification_buffer: usize,
    pub kill_event_buffer: usize,
    pub journal_sound: String,
    pub comm_duration_secs: f32,
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:2567".to_string(),
            data_dir: PathBuf::from("data"),
            log_filter: "quest_engine_server=info".to_string(),
            notification_buffer: 64,
            kill_event_buffer: 256,
            journal_sound: "sound/ui_journal_updated.snd".to_string(),
            comm_duration_secs: 10.0,
            shutdown_grace_ms: 1000,
        }
    }
}

impl ServerConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `$QUEST_SERVER_CONFIG`, or `config.toml` in the working directory
    pub fn config_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            journal_sound: self.journal_sound.clone(),
            comm_duration_secs: self.comm_duration_secs,
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }

    /// Logged once tracing is up, since config is read before it
    pub fn log_summary(&self, path: &Path) {
        if path.exists() {
            info!("Loaded config from {:?}", path);
        } else {
            info!("No config at {:?}, using defaults", path);
        }
        info!(
            "Data directory {:?}, notification buffer {}, kill event buffer {}",
            self.data_dir, self.notification_buffer, self.kill_event_buffer
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.engine_settings().shutdown_grace, Duration::from_secs(1));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
bind_addr = "127.0.0.1:9000"
comm_duration_secs = 6.5
"#,
        )
        .unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.comm_duration_secs, 6.5);
        assert_eq!(config.notification_buffer, 64);
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "notification_buffer = \"lots\"").unwrap();

        let err = ServerConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
