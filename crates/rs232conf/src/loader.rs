//! Config file discovery, loading, and environment variable overlay.
//!
//! Each layer is applied onto the running config in place, so a file only
//! has to mention the keys it wants to change.

use crate::{parse_duration, ConfigError, ReaderConfig};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const APP_DIR: &str = "rs232-reader";
const LOCAL_FILE: &str = "rs232-reader.toml";

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli). Only existing
/// files are returned.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc").join(APP_DIR).join("config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join(APP_DIR).join("config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from(LOCAL_FILE);
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and apply it onto `config`.
pub fn load_file_into(config: &mut ReaderConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Apply the keys present in a TOML document onto `config`.
pub fn apply_toml(config: &mut ReaderConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let origin = path.display().to_string();

    if let Some(serial) = table.get("serial").and_then(|v| v.as_table()) {
        if let Some(v) = serial.get("device_path").and_then(|v| v.as_str()) {
            config.serial.device_path = v.to_string();
        }
        if let Some(v) = serial.get("baud_rate") {
            config.serial.baud_rate = int_value(v, "serial.baud_rate", &origin)?;
        }
        if let Some(v) = serial.get("parity") {
            config.serial.parity = parsed_value(v, "serial.parity", &origin)?;
        }
        if let Some(v) = serial.get("stop_bits") {
            config.serial.stop_bits = parsed_value(v, "serial.stop_bits", &origin)?;
        }
        if let Some(v) = serial.get("data_bits") {
            config.serial.data_bits = parsed_value(v, "serial.data_bits", &origin)?;
        }
        if let Some(v) = serial.get("read_timeout") {
            config.serial.read_timeout = duration_value(v, "serial.read_timeout", &origin)?;
        }
    }

    if let Some(session) = table.get("session").and_then(|v| v.as_table()) {
        if let Some(v) = session.get("work_dir").and_then(|v| v.as_str()) {
            config.session.work_dir = expand_path(v);
        }
        if let Some(v) = session.get("timeout") {
            config.session.timeout = duration_value(v, "session.timeout", &origin)?;
        }
        if let Some(v) = session.get("progress_bytes") {
            config.session.progress_bytes = int_value(v, "session.progress_bytes", &origin)?;
        }
        if let Some(v) = session.get("file_suffix").and_then(|v| v.as_str()) {
            config.session.file_suffix = v.to_string();
        }
    }

    if let Some(logging) = table.get("logging").and_then(|v| v.as_table()) {
        if let Some(v) = logging.get("level").and_then(|v| v.as_str()) {
            config.logging.level = v.to_string();
        }
        if let Some(v) = logging.get("verbose").and_then(|v| v.as_bool()) {
            config.logging.verbose = v;
        }
        if let Some(v) = logging.get("debug").and_then(|v| v.as_bool()) {
            config.logging.debug = v;
        }
    }

    Ok(())
}

/// Accept either a TOML integer or a string holding one.
fn int_value<T>(value: &toml::Value, key: &str, origin: &str) -> Result<T, ConfigError>
where
    T: TryFrom<i64> + FromStr,
{
    let parsed = match value {
        toml::Value::Integer(i) => T::try_from(*i).ok(),
        toml::Value::String(s) => s.trim().parse::<T>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| invalid(key, origin, format!("expected a non-negative integer, got {value}")))
}

/// Values whose `FromStr` impl does the validation (parity, bit counts).
fn parsed_value<T>(value: &toml::Value, key: &str, origin: &str) -> Result<T, ConfigError>
where
    T: FromStr<Err = String>,
{
    let text = match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        other => return Err(invalid(key, origin, format!("unexpected value {other}"))),
    };
    text.parse().map_err(|message| invalid(key, origin, message))
}

/// Durations are strings like "5s"; a bare integer means seconds.
fn duration_value(
    value: &toml::Value,
    key: &str,
    origin: &str,
) -> Result<std::time::Duration, ConfigError> {
    match value {
        toml::Value::String(s) => parse_duration(s).map_err(|message| invalid(key, origin, message)),
        toml::Value::Integer(i) if *i >= 0 => Ok(std::time::Duration::from_secs(*i as u64)),
        other => Err(invalid(key, origin, format!("expected a duration, got {other}"))),
    }
}

fn invalid(key: &str, origin: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        origin: origin.to_string(),
        message: message.into(),
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(
    config: &mut ReaderConfig,
    sources: &mut ConfigSources,
) -> Result<(), ConfigError> {
    apply_overrides_from(config, sources, |key| env::var(key).ok())
}

/// Apply overrides from an arbitrary variable lookup.
pub fn apply_overrides_from<F>(
    config: &mut ReaderConfig,
    sources: &mut ConfigSources,
    lookup: F,
) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("RS232_DEVICE_PATH") {
        config.serial.device_path = v;
        sources.env_overrides.push("RS232_DEVICE_PATH".to_string());
    }
    if let Some(v) = lookup("RS232_BAUD_RATE") {
        config.serial.baud_rate = v
            .trim()
            .parse()
            .map_err(|_| invalid("serial.baud_rate", "RS232_BAUD_RATE", format!("not a number: {v}")))?;
        sources.env_overrides.push("RS232_BAUD_RATE".to_string());
    }
    if let Some(v) = lookup("RS232_WORK_DIR") {
        config.session.work_dir = expand_path(&v);
        sources.env_overrides.push("RS232_WORK_DIR".to_string());
    }
    if let Some(v) = lookup("RS232_SESSION_TIMEOUT") {
        config.session.timeout = parse_duration(&v)
            .map_err(|message| invalid("session.timeout", "RS232_SESSION_TIMEOUT", message))?;
        sources.env_overrides.push("RS232_SESSION_TIMEOUT".to_string());
    }
    if let Some(v) = lookup("RS232_LOG_LEVEL") {
        config.logging.level = v;
        sources.env_overrides.push("RS232_LOG_LEVEL".to_string());
    }

    Ok(())
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}
