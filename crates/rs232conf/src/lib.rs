//! Configuration loading for rs232-reader.
//!
//! Kept dependency-light so both the recorder library and the CLI can use it.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/rs232-reader/config.toml` (system)
//! 2. `~/.config/rs232-reader/config.toml` (user)
//! 3. `./rs232-reader.toml` or the path given with `--config` (local)
//! 4. Environment variables (`RS232_*`)
//!
//! Command-line flags are applied on top by the binary.
//!
//! # Example Config
//!
//! ```toml
//! [serial]
//! device_path = "/dev/ttyUSB0"
//! baud_rate = 115200
//! parity = "none"
//! stop_bits = 1
//! data_bits = 8
//! read_timeout = "100ms"
//!
//! [session]
//! work_dir = "~/captures"
//! timeout = "5s"
//!
//! [logging]
//! verbose = true
//! ```

pub mod duration;
pub mod loader;
pub mod sections;
pub mod serial;

pub use duration::{format_duration, parse_duration};
pub use loader::{discover_config_files_with_override, expand_path, ConfigSources};
pub use sections::{LoggingConfig, SerialConfig, SessionConfig};
pub use serial::{DataBits, Parity, StopBits};

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {key} (from {origin}): {message}")]
    Invalid {
        key: String,
        origin: String,
        message: String,
    },

    #[error("Failed to render config: {0}")]
    Render(String),
}

/// Complete rs232-reader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct ReaderConfig {
    pub serial: SerialConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

impl ReaderConfig {
    /// Load configuration from all standard sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration, letting `config_path` replace the local override.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and variables contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = ReaderConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::load_file_into(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources)?;

        Ok((config, sources))
    }

    /// Render as TOML in the same layout the loader reads.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let body = toml::to_string(self).map_err(|e| ConfigError::Render(e.to_string()))?;
        Ok(format!("# rs232-reader configuration\n\n{body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = ReaderConfig::default();
        assert_eq!(config.serial.device_path, "/dev/ttyS0");
        assert_eq!(config.serial.baud_rate, 38400);
        assert_eq!(config.session.work_dir, PathBuf::from("/opt/rs232-reader"));
        assert_eq!(config.session.timeout, Duration::from_secs(5));
        assert!(!config.logging.verbose);
        assert!(!config.logging.debug);
    }

    #[test]
    fn test_to_toml() {
        let config = ReaderConfig::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[serial]"));
        assert!(toml.contains("[session]"));
        assert!(toml.contains("[logging]"));
        assert!(toml.contains("timeout = \"5s\""));
        assert!(toml.contains("parity = \"none\""));
        assert!(toml.contains("stop_bits = 1"));
    }

    #[test]
    fn test_to_toml_reads_back() {
        let mut config = ReaderConfig::default();
        config.serial.baud_rate = 9600;
        config.serial.parity = Parity::Even;
        config.session.timeout = Duration::from_millis(1500);

        let rendered = config.to_toml().unwrap();
        let mut reloaded = ReaderConfig::default();
        loader::apply_toml(&mut reloaded, &rendered, Path::new("rendered.toml")).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[serial]\nbaud_rate = 115200\n").unwrap();

        let (config, sources) = ReaderConfig::load_with_sources_from(Some(&path)).unwrap();
        assert_eq!(config.serial.baud_rate, 115200);
        assert!(sources.files.contains(&path));
    }
}
