//! Common test utilities for rs232-reader integration tests
//!
//! A scripted stand-in for the serial device plus helpers for inspecting
//! the session files a run leaves behind.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rs232_reader::{Pipeline, PipelineError, RecorderConfig, SessionEvent};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// How long an exhausted script waits before reporting an idle poll.
const IDLE_POLL: Duration = Duration::from_millis(5);

/// One step of a scripted line.
#[derive(Debug)]
pub enum Step {
    /// Bytes that arrive on the line.
    Data(Vec<u8>),
    /// Quiet line for this long.
    Pause(Duration),
    /// The device fails with this kind of error.
    Fail(io::ErrorKind),
}

pub fn data(bytes: &[u8]) -> Step {
    Step::Data(bytes.to_vec())
}

pub fn pause_ms(ms: u64) -> Step {
    Step::Pause(Duration::from_millis(ms))
}

/// Plays back a script like a serial port with a read timeout would: data
/// is handed out in buffer-sized pieces, pauses and the end of the script
/// look like read timeouts.
pub struct ScriptedSource {
    steps: VecDeque<Step>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
        }
    }
}

impl io::Read for ScriptedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.steps.pop_front() {
            Some(Step::Data(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.steps.push_front(Step::Data(bytes.split_off(n)));
                }
                Ok(n)
            }
            Some(Step::Pause(duration)) => {
                std::thread::sleep(duration);
                Err(io::ErrorKind::TimedOut.into())
            }
            Some(Step::Fail(kind)) => Err(io::Error::new(kind, "scripted device failure")),
            None => {
                std::thread::sleep(IDLE_POLL);
                Err(io::ErrorKind::TimedOut.into())
            }
        }
    }
}

/// Result of a run plus the session files it opened, in opening order.
pub struct Recording {
    pub result: Result<(), PipelineError>,
    pub opened: Vec<PathBuf>,
}

/// Run a pipeline over `steps` until it stops on its own.
pub async fn run_script(steps: Vec<Step>, config: RecorderConfig) -> Recording {
    let pipeline = Pipeline::new(ScriptedSource::new(steps), config);
    let mut events = pipeline.subscribe();
    let result = pipeline.run(CancellationToken::new()).await;
    Recording {
        result,
        opened: opened_sessions(&mut events),
    }
}

/// Paths from the `Opened` events received so far, in the order the
/// sessions started.
pub fn opened_sessions(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<PathBuf> {
    std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|event| match event {
            SessionEvent::Opened { path } => Some(path),
            _ => None,
        })
        .collect()
}

/// Number of files in `dir`.
pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).expect("read work dir").count()
}

/// Contents of `opened`, checking that nothing else landed in `dir`.
pub fn session_contents(dir: &Path, opened: &[PathBuf]) -> Vec<Vec<u8>> {
    assert_eq!(file_count(dir), opened.len(), "unexpected files in work dir");
    opened
        .iter()
        .map(|path| std::fs::read(path).expect("read session file"))
        .collect()
}
