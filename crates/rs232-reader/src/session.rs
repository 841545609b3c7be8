//! Session recording - idle-delimited output files
//!
//! A session is a contiguous run of bytes with no idle gap longer than the
//! configured timeout. Each session lands in its own file in the work dir.
//!
//! ## State machine
//!
//! ```text
//!              chunk                         chunk, gap <= timeout
//! NoSession ─────────▶ SessionOpen ◀───────────────┐
//!     ▲   (create file)     │                      │
//!     │                     ├──────────────────────┘
//!     │   gap > timeout     │
//!     └─────────────────────┘ (close file, same chunk reopens)
//! ```
//!
//! ## Ownership
//!
//! The open file lives inside [`Session`]. Dropping a `Session` syncs and
//! releases the file, so error and cancellation paths cannot leak it.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use rs232conf::ReaderConfig;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::source::StreamChunk;

/// Collision suffixes tried before giving up on a file name.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Settings for the session writer.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub work_dir: PathBuf,
    /// Idle gap that ends a session.
    pub session_timeout: Duration,
    /// Progress is reported each time more than this many bytes arrive.
    pub progress_bytes: u64,
    pub file_suffix: String,
    /// Copy raw bytes to stdout as they arrive.
    pub echo: bool,
}

impl RecorderConfig {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_progress_bytes(mut self, bytes: u64) -> Self {
        self.progress_bytes = bytes;
        self
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            session_timeout: Duration::from_secs(5),
            progress_bytes: 20 * 1024,
            file_suffix: ".log".to_string(),
            echo: false,
        }
    }
}

impl From<&ReaderConfig> for RecorderConfig {
    fn from(config: &ReaderConfig) -> Self {
        Self {
            work_dir: config.session.work_dir.clone(),
            session_timeout: config.session.timeout,
            progress_bytes: config.session.progress_bytes,
            file_suffix: config.session.file_suffix.clone(),
            echo: config.logging.debug,
        }
    }
}

/// Session lifecycle notices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Opened { path: PathBuf },
    Progress { path: PathBuf, bytes_received: u64 },
    Closed { path: PathBuf, bytes_received: u64 },
}

/// File name for a session that starts at `started`.
pub fn session_file_name(started: DateTime<Local>, suffix: &str) -> String {
    format!("{}{}", started.format("%Y-%m-%dT%H-%M-%S%.6f"), suffix)
}

/// One open session file plus its counters.
#[derive(Debug)]
pub struct Session {
    path: PathBuf,
    file: Option<File>,
    bytes_received: u64,
    bytes_since_report: u64,
    last_activity: Instant,
}

impl Session {
    /// Create a fresh file in `dir`. Never truncates an existing file: on a
    /// name collision a `-N` suffix is appended.
    fn create(dir: &Path, stem: &str, suffix: &str, now: Instant) -> Result<Self, PipelineError> {
        let mut path = dir.join(format!("{stem}{suffix}"));
        let mut attempt = 0;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    return Ok(Self {
                        path,
                        file: Some(file),
                        bytes_received: 0,
                        bytes_since_report: 0,
                        last_activity: now,
                    })
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                    attempt += 1;
                    path = dir.join(format!("{stem}-{attempt}{suffix}"));
                }
                Err(source) => return Err(PipelineError::SessionFileCreate { path, source }),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PipelineError> {
        let file = self.file.as_mut().ok_or_else(|| PipelineError::SessionFileWrite {
            path: self.path.clone(),
            source: io::Error::new(io::ErrorKind::Other, "session file already closed"),
        })?;

        file.write_all(data)
            .map_err(|source| PipelineError::SessionFileWrite {
                path: self.path.clone(),
                source,
            })
    }

    /// Sync and release the file, reporting any failure.
    fn close(mut self) -> Result<(PathBuf, u64), PipelineError> {
        if let Some(file) = self.file.take() {
            file.sync_all()
                .map_err(|source| PipelineError::SessionFileWrite {
                    path: self.path.clone(),
                    source,
                })?;
        }
        Ok((std::mem::take(&mut self.path), self.bytes_received))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.sync_all() {
                warn!("failed to sync {} on release: {}", self.path.display(), e);
            }
            debug!(
                "released {} ({} bytes)",
                self.path.display(),
                self.bytes_received
            );
        }
    }
}

/// The session writer's state machine.
///
/// Feed it chunks in arrival order with [`record`](Self::record); it decides
/// session boundaries from the chunks' capture instants and owns the open
/// file.
pub struct SessionRecorder {
    config: RecorderConfig,
    current: Option<Session>,
    events: broadcast::Sender<SessionEvent>,
    sessions_opened: u64,
}

impl SessionRecorder {
    pub fn new(config: RecorderConfig, events: broadcast::Sender<SessionEvent>) -> Self {
        Self {
            config,
            current: None,
            events,
            sessions_opened: 0,
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// The open session, if any.
    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened
    }

    /// Apply one chunk: close on idle timeout, open if needed, append.
    pub fn record(&mut self, chunk: &StreamChunk) -> Result<(), PipelineError> {
        let now = chunk.captured_at();

        let timed_out = self.current.as_ref().is_some_and(|session| {
            now.saturating_duration_since(session.last_activity) > self.config.session_timeout
        });
        if timed_out {
            self.close_current()?;
        }

        let session = match self.current.take() {
            Some(session) => session,
            None => self.open_session(now)?,
        };
        let session = self.current.insert(session);

        if self.config.echo {
            echo(chunk.data());
        }

        session.last_activity = now;
        session.write(chunk.data())?;

        let len = chunk.len() as u64;
        session.bytes_received += len;
        session.bytes_since_report += len;

        if session.bytes_since_report > self.config.progress_bytes {
            info!("{}kb received", session.bytes_received / 1024);
            let _ = self.events.send(SessionEvent::Progress {
                path: session.path.clone(),
                bytes_received: session.bytes_received,
            });
            session.bytes_since_report = 0;
        }

        Ok(())
    }

    /// Close the open session, if any.
    pub fn close_current(&mut self) -> Result<(), PipelineError> {
        let Some(session) = self.current.take() else {
            return Ok(());
        };

        let (path, bytes_received) = session.close()?;
        info!("close {} ({} bytes)", path.display(), bytes_received);
        let _ = self.events.send(SessionEvent::Closed {
            path,
            bytes_received,
        });
        Ok(())
    }

    /// Release the open session on the way out, logging instead of failing.
    pub fn finish(&mut self) {
        if let Err(e) = self.close_current() {
            warn!("error closing session during shutdown: {}", e);
        }
    }

    fn open_session(&mut self, now: Instant) -> Result<Session, PipelineError> {
        let stem = session_file_name(Local::now(), "");
        let session = Session::create(&self.config.work_dir, &stem, &self.config.file_suffix, now)?;

        info!("create {}", session.path.display());
        self.sessions_opened += 1;
        let _ = self.events.send(SessionEvent::Opened {
            path: session.path.clone(),
        });
        Ok(session)
    }
}

fn echo(data: &[u8]) {
    let mut stdout = io::stdout().lock();
    if let Err(e) = stdout.write_all(data).and_then(|()| stdout.flush()) {
        debug!("echo to stdout failed: {}", e);
    }
}
