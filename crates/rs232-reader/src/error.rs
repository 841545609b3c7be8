//! Fatal pipeline errors and the first-error latch.

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use thiserror::Error;

/// Which part of the recorder an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Before the pipeline starts: work dir, device open.
    Startup,
    Reader,
    SessionWriter,
    ErrorMonitor,
    ShutdownCoordinator,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Startup => "startup",
            Stage::Reader => "reader",
            Stage::SessionWriter => "session writer",
            Stage::ErrorMonitor => "error monitor",
            Stage::ShutdownCoordinator => "shutdown coordinator",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that stop the recorder.
///
/// Every pipeline-time variant is fatal; nothing is retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("serial read failure: {0}")]
    TransportRead(#[source] std::io::Error),

    #[error("failed to open serial device {device}: {source}")]
    TransportOpen {
        device: String,
        #[source]
        source: serialport::Error,
    },

    #[error("failed to create session file {path}: {source}")]
    SessionFileCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write session file {path}: {source}")]
    SessionFileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to set up work dir {path}: {source}")]
    WorkDirSetup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("work dir {path} exists but is not a directory")]
    WorkDirNotDirectory { path: PathBuf },

    #[error("failed to start reader thread: {0}")]
    ReaderSpawn(#[source] std::io::Error),

    #[error("{stage} task panicked")]
    StagePanicked { stage: Stage },
}

impl PipelineError {
    /// The stage that discovered the failure.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::TransportRead(_) | PipelineError::ReaderSpawn(_) => Stage::Reader,
            PipelineError::SessionFileCreate { .. } | PipelineError::SessionFileWrite { .. } => {
                Stage::SessionWriter
            }
            PipelineError::TransportOpen { .. }
            | PipelineError::WorkDirSetup { .. }
            | PipelineError::WorkDirNotDirectory { .. } => Stage::Startup,
            PipelineError::StagePanicked { stage } => *stage,
        }
    }
}

/// Holds the first fatal error reported by any stage.
///
/// `set` is an atomic set-if-empty: whichever caller gets there first wins
/// and later errors are dropped.
#[derive(Debug, Default)]
pub struct FatalLatch {
    slot: OnceLock<PipelineError>,
}

impl FatalLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `err` unless an error is already latched.
    ///
    /// Returns true if this call won.
    pub fn set(&self, err: PipelineError) -> bool {
        self.slot.set(err).is_ok()
    }

    pub fn is_set(&self) -> bool {
        self.slot.get().is_some()
    }

    pub fn get(&self) -> Option<&PipelineError> {
        self.slot.get()
    }

    /// Take the latched error out. Only possible once every stage has let go.
    pub fn into_inner(self) -> Option<PipelineError> {
        self.slot.into_inner()
    }
}
