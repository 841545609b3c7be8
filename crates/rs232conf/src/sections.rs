//! Config sections: serial transport, session recording, logging.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::serial::{DataBits, Parity, StopBits};

/// How to open the serial device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SerialConfig {
    /// Path to the tty device.
    /// Default: /dev/ttyS0
    pub device_path: String,

    /// Line speed.
    /// Default: 38400
    pub baud_rate: u32,

    pub parity: Parity,
    pub stop_bits: StopBits,
    pub data_bits: DataBits,

    /// Upper bound on a single blocking read. This is also how often the
    /// reader notices shutdown while the line is quiet.
    /// Default: 100ms
    #[serde(serialize_with = "crate::duration::serialize")]
    pub read_timeout: Duration,
}

impl SerialConfig {
    fn default_device_path() -> String {
        "/dev/ttyS0".to_string()
    }

    fn default_baud_rate() -> u32 {
        38400
    }

    fn default_read_timeout() -> Duration {
        Duration::from_millis(100)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device_path: Self::default_device_path(),
            baud_rate: Self::default_baud_rate(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            data_bits: DataBits::default(),
            read_timeout: Self::default_read_timeout(),
        }
    }
}

/// Where and how session files are written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionConfig {
    /// Directory that receives session files. Created if absent.
    /// Default: /opt/rs232-reader
    pub work_dir: PathBuf,

    /// Idle gap that ends the current session.
    /// Default: 5s
    #[serde(serialize_with = "crate::duration::serialize")]
    pub timeout: Duration,

    /// Emit a progress notice each time this many bytes have arrived.
    /// Default: 20480
    pub progress_bytes: u64,

    /// Appended to the timestamp-derived file name.
    /// Default: .log
    pub file_suffix: String,
}

impl SessionConfig {
    fn default_work_dir() -> PathBuf {
        PathBuf::from("/opt/rs232-reader")
    }

    fn default_timeout() -> Duration {
        Duration::from_secs(5)
    }

    fn default_progress_bytes() -> u64 {
        20 * 1024
    }

    fn default_file_suffix() -> String {
        ".log".to_string()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            work_dir: Self::default_work_dir(),
            timeout: Self::default_timeout(),
            progress_bytes: Self::default_progress_bytes(),
            file_suffix: Self::default_file_suffix(),
        }
    }
}

/// Log verbosity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggingConfig {
    /// Base filter directive (trace, debug, info, warn, error).
    /// Default: error
    pub level: String,

    /// Coarse diagnostics: session open/close and progress.
    pub verbose: bool,

    /// Fine-grained diagnostics plus raw byte echo to stdout.
    pub debug: bool,
}

impl LoggingConfig {
    fn default_level() -> String {
        "error".to_string()
    }

    /// The filter directive after applying the verbose/debug switches.
    pub fn effective_level(&self) -> &str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else {
            &self.level
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            verbose: false,
            debug: false,
        }
    }
}
