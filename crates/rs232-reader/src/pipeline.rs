//! Pipeline wiring
//!
//! ```text
//!                   data (bounded, FIFO)
//!  ByteSource ─▶ Reader ───────────────▶ Session Writer ─▶ session files
//!                  │                           │
//!                  └──── errors (cap 1) ───────┤
//!                                              ▼
//!                                        Error Monitor ──▶ cancel
//!  SIGINT/SIGTERM ─▶ Shutdown Coordinator ────────────────▶ cancel
//! ```
//!
//! Every stage holds a clone of one [`CancellationToken`]. `run` returns
//! after all four stages have exited, except a reader stuck inside a read
//! that never returns: that thread is left behind after a grace period.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{FatalLatch, PipelineError, Stage};
use crate::session::{RecorderConfig, SessionEvent, SessionRecorder};
use crate::source::{ByteSource, StreamChunk};
use crate::{monitor, reader, shutdown, writer};

/// Default depth of the reader → writer channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// How long `run` waits, after cancelling, for the reader to come back from
/// its current read.
pub const DEFAULT_READER_GRACE: Duration = Duration::from_secs(2);

const EVENT_CAPACITY: usize = 256;

/// A recorder ready to run against one byte source.
pub struct Pipeline<S> {
    source: S,
    config: RecorderConfig,
    channel_capacity: usize,
    reader_grace: Duration,
    handle_signals: bool,
    events: broadcast::Sender<SessionEvent>,
}

impl<S: ByteSource> Pipeline<S> {
    pub fn new(source: S, config: RecorderConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            source,
            config,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            reader_grace: DEFAULT_READER_GRACE,
            handle_signals: false,
            events,
        }
    }

    /// Also stop on SIGINT/SIGTERM.
    pub fn with_signal_handling(mut self) -> Self {
        self.handle_signals = true;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Bound on the wait for a reader blocked in a read after shutdown.
    pub fn with_reader_grace(mut self, grace: Duration) -> Self {
        self.reader_grace = grace;
        self
    }

    /// Receive session lifecycle events from the next run.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Run until `cancel` fires or a stage fails.
    ///
    /// Returns the first fatal error, if any.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), PipelineError> {
        let (data_tx, data_rx) = mpsc::channel::<StreamChunk>(self.channel_capacity);
        // Two producers, one error needed: capacity one plus the latch is enough.
        let (err_tx, err_rx) = mpsc::channel::<PipelineError>(1);
        let latch = Arc::new(FatalLatch::new());

        info!(
            "recording into {} (session timeout {:?})",
            self.config.work_dir.display(),
            self.config.session_timeout
        );

        let reader = spawn_reader(self.source, data_tx, err_tx.clone(), cancel.clone())?;

        let monitor = tokio::spawn(monitor::run(err_rx, Arc::clone(&latch), cancel.clone()));

        let coordinator = self
            .handle_signals
            .then(|| tokio::spawn(shutdown::run(cancel.clone())));

        let recorder = SessionRecorder::new(self.config, self.events);
        let writer = tokio::spawn(writer::run(recorder, data_rx, err_tx, cancel.clone()));

        join_stage(writer, Stage::SessionWriter, &latch).await;
        debug!("session writer exited, stopping remaining stages");
        cancel.cancel();

        join_stage(monitor, Stage::ErrorMonitor, &latch).await;
        join_reader(reader, self.reader_grace, &latch).await;
        if let Some(coordinator) = coordinator {
            join_stage(coordinator, Stage::ShutdownCoordinator, &latch).await;
        }

        match Arc::into_inner(latch) {
            Some(latch) => match latch.into_inner() {
                Some(err) => Err(err),
                None => {
                    info!("recorder stopped");
                    Ok(())
                }
            },
            None => {
                // Every stage has been joined, so nothing else can hold the latch.
                warn!("fatal latch still shared after shutdown");
                Ok(())
            }
        }
    }
}

/// Run the reader on its own thread. The receiver resolves when the read
/// loop returns, or errors if the thread died.
fn spawn_reader<S: ByteSource>(
    source: S,
    data_tx: mpsc::Sender<StreamChunk>,
    err_tx: mpsc::Sender<PipelineError>,
    cancel: CancellationToken,
) -> Result<oneshot::Receiver<()>, PipelineError> {
    let runtime = Handle::current();
    let (done_tx, done_rx) = oneshot::channel();

    thread::Builder::new()
        .name("rs232-reader".to_string())
        .spawn(move || {
            reader::run(source, data_tx, err_tx, cancel, runtime);
            let _ = done_tx.send(());
        })
        .map_err(PipelineError::ReaderSpawn)?;

    Ok(done_rx)
}

async fn join_reader(done: oneshot::Receiver<()>, grace: Duration, latch: &FatalLatch) {
    match tokio::time::timeout(grace, done).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => {
            error!("{} thread exited without finishing", Stage::Reader);
            latch.set(PipelineError::StagePanicked {
                stage: Stage::Reader,
            });
        }
        Err(_) => {
            warn!(
                "{} still blocked in a read after {:?}, leaving it behind",
                Stage::Reader,
                grace
            );
        }
    }
}

async fn join_stage(handle: JoinHandle<()>, stage: Stage, latch: &FatalLatch) {
    if let Err(e) = handle.await {
        error!("{} task failed: {}", stage, e);
        latch.set(PipelineError::StagePanicked { stage });
    }
}
