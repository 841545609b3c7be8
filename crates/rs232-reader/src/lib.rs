//! rs232-reader - serial line session recorder
//!
//! Bytes arriving on a serial line are split into session files: a new file
//! starts whenever the line has been idle for longer than the session
//! timeout.
//!
//! This library provides:
//! - `pipeline`: wires the stages together and runs them to completion
//! - `reader`: blocking reads from a [`ByteSource`] into the data channel
//! - `writer`: data channel into session files
//! - `monitor`: first fatal error → shutdown
//! - `shutdown`: SIGINT/SIGTERM → shutdown
//! - `session`: session boundaries and file handling
//! - `source`: byte sources, including the serial device
//! - `telemetry`: tracing subscriber setup

pub mod error;
pub mod monitor;
pub mod pipeline;
pub mod reader;
pub mod session;
pub mod shutdown;
pub mod source;
pub mod telemetry;
pub mod workdir;
pub mod writer;

pub use error::{FatalLatch, PipelineError, Stage};
pub use pipeline::{Pipeline, DEFAULT_CHANNEL_CAPACITY, DEFAULT_READER_GRACE};
pub use session::{RecorderConfig, SessionEvent, SessionRecorder};
pub use source::{list_ports, open_serial, ByteSource, PortListing, SerialSource, StreamChunk};
pub use workdir::ensure_work_dir;
