use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_ENV: &str = "UI_BRIDGE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read bridge config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Root node forwarded with every UI call.
    pub root_id: u32,
    /// Upper bound on runner tasks executed by one pump.
    pub max_tasks_per_pump: usize,
    /// Upper bound on QuickJS promise jobs executed by one pump.
    pub max_jobs_per_pump: usize,
    /// How long `run_until_idle` waits for the next result before giving up.
    pub idle_timeout_ms: u64,
    /// Fallback tracing filter when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            root_id: 1,
            max_tasks_per_pump: 1000,
            max_jobs_per_pump: 1000,
            idle_timeout_ms: 5_000,
            log_filter: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load the config at `config_path`, falling back to defaults when no
    /// path is given or the file does not exist.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = match config_path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)?;
                serde_yaml::from_str::<Self>(&contents)?
            }
            _ => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Path from `UI_BRIDGE_CONFIG`, else `bridge.yaml` in the user's config
    /// directory.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        ProjectDirs::from("org", "UiBridge", "ui-bridge")
            .map(|dirs| dirs.config_dir().join("bridge.yaml"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tasks_per_pump == 0 {
            return Err(ConfigError::Zero {
                field: "max_tasks_per_pump",
            });
        }
        if self.max_jobs_per_pump == 0 {
            return Err(ConfigError::Zero {
                field: "max_jobs_per_pump",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_default() {
        let config = BridgeConfig::load(None).unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = BridgeConfig::load(Some(PathBuf::from("/nonexistent/bridge.yaml"))).unwrap();
        assert_eq!(config.max_tasks_per_pump, 1000);
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "root_id: 7\nmax_tasks_per_pump: 16\nlog_filter: debug").unwrap();
        let config = BridgeConfig::load(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.root_id, 7);
        assert_eq!(config.max_tasks_per_pump, 16);
        assert_eq!(config.max_jobs_per_pump, 1000);
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn rejects_zero_limits() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "max_jobs_per_pump: 0").unwrap();
        let err = BridgeConfig::load(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, ConfigError::Zero { field: "max_jobs_per_pump" }));
    }
}
