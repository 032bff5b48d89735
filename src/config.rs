//! Configuration management
//!
//! Config file is stored next to the executable as `wmp.toml` unless a
//! path is given on the command line.

use crate::constants::{
    DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_INFO_IDLE_MS,
    DEFAULT_INFO_MAX_LINES, DEFAULT_KEEPALIVE_INTERVAL_MS, DEFAULT_MAX_LINE_LENGTH,
    DEFAULT_WMP_PORT,
};
use crate::error::{Result, WmpError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Config file name
pub const CONFIG_FILE: &str = "wmp.toml";

// =============================================================================
// Application Configuration
// =============================================================================

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub logging: LoggingConfig,
}

// =============================================================================
// Connection Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Device address (IP or hostname)
    pub host: String,

    /// TCP port of the WMP server
    pub port: u16,

    /// Keep-alive ping period (0 = disabled)
    pub keepalive_interval_ms: u64,

    pub connect_timeout_ms: u64,

    /// Per-command reply timeout (0 = wait until reply or close)
    pub command_timeout_ms: u64,

    /// Longest accepted inbound line, terminator excluded
    pub max_line_length: usize,

    /// Silence after which an `INFO` reply is complete
    pub info_idle_ms: u64,

    /// Line count after which an `INFO` reply is complete
    pub info_max_lines: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Debug-level output (overridden by `RUST_LOG`)
    pub verbose: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "192.168.100.246".to_string(),
            port: DEFAULT_WMP_PORT,
            keepalive_interval_ms: DEFAULT_KEEPALIVE_INTERVAL_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            info_idle_ms: DEFAULT_INFO_IDLE_MS,
            info_max_lines: DEFAULT_INFO_MAX_LINES,
        }
    }
}

impl Config {
    /// Reject settings the client cannot run with
    pub fn validate(&self) -> Result<()> {
        let c = &self.connection;
        if c.host.trim().is_empty() {
            return Err(WmpError::ConfigValidation {
                field: "connection.host",
                reason: "must not be empty".into(),
            });
        }
        if c.port == 0 {
            return Err(WmpError::ConfigValidation {
                field: "connection.port",
                reason: "must be non-zero".into(),
            });
        }
        if c.max_line_length == 0 {
            return Err(WmpError::ConfigValidation {
                field: "connection.max_line_length",
                reason: "must be non-zero".into(),
            });
        }
        if c.info_max_lines == 0 {
            return Err(WmpError::ConfigValidation {
                field: "connection.info_max_lines",
                reason: "must be non-zero".into(),
            });
        }
        Ok(())
    }
}

/// Default config file path: next to the executable
pub fn config_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|e| WmpError::ConfigRead {
        path: PathBuf::from("executable"),
        source: e,
    })?;
    let exe_dir = exe.parent().ok_or_else(|| WmpError::ConfigValidation {
        field: "exe_path",
        reason: "no parent directory".into(),
    })?;
    Ok(exe_dir.join(CONFIG_FILE))
}

/// Load and validate config from `path`
pub fn load_from(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|e| WmpError::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: Config = toml::from_str(&content).map_err(|e| WmpError::ConfigValidation {
        field: "config",
        reason: format!("invalid TOML in {}: {}", path.display(), e),
    })?;

    config.validate()?;
    Ok(config)
}

/// Load config from `path`, or defaults if missing or invalid
pub fn load(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }

    match load_from(path) {
        Ok(config) => config,
        Err(e) => {
            warn!("{}, using defaults", e);
            Config::default()
        }
    }
}

/// Save config to `path`
pub fn save(config: &Config, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config).map_err(|e| WmpError::ConfigValidation {
        field: "config",
        reason: e.to_string(),
    })?;
    fs::write(path, content).map_err(|e| WmpError::ConfigWrite {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_connection_config_values() {
        let config = ConnectionConfig::default();

        assert_eq!(config.port, 3310);
        assert_eq!(config.keepalive_interval_ms, 30_000);
        assert_eq!(config.command_timeout_ms, 0);
        assert_eq!(config.max_line_length, 1024);
        assert_eq!(config.info_idle_ms, 500);
        assert_eq!(config.info_max_lines, 64);
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[connection]
host = "10.1.2.3"
keepalive_interval_ms = 0
"#;
        let config: Config = toml::from_str(toml_str).unwrap();

        assert_eq!(config.connection.host, "10.1.2.3");
        assert_eq!(config.connection.keepalive_interval_ms, 0);
        assert_eq!(config.connection.port, DEFAULT_WMP_PORT);
        assert!(!config.logging.verbose);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.connection.port = 0;
        assert!(matches!(
            config.validate(),
            Err(WmpError::ConfigValidation {
                field: "connection.port",
                ..
            })
        ));

        let mut config = Config::default();
        config.connection.host = "  ".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.connection.max_line_length = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.connection.info_max_lines = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let mut config = Config::default();
        config.connection.host = "wmp.local".into();
        config.connection.command_timeout_ms = 2000;
        config.logging.verbose = true;
        save(&config, &path).unwrap();

        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_save_into_missing_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join(CONFIG_FILE);

        let result = save(&Config::default(), &path);
        assert!(matches!(result, Err(WmpError::ConfigWrite { .. })));
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempdir().unwrap();
        let result = load_from(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(WmpError::ConfigRead { .. })));
    }

    #[test]
    fn test_load_falls_back_on_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[connection]\nport = \"not a number\"\n").unwrap();

        assert!(matches!(
            load_from(&path),
            Err(WmpError::ConfigValidation { .. })
        ));
        assert_eq!(load(&path), Config::default());
    }

    #[test]
    fn test_load_falls_back_on_invalid_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[connection]\nport = 0\n").unwrap();

        assert_eq!(load(&path), Config::default());
    }
}
