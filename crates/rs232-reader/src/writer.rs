//! Session writer stage: data channel → session files.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::PipelineError;
use crate::session::SessionRecorder;
use crate::source::StreamChunk;

/// Consume chunks into `recorder` until cancelled, the channel closes, or a
/// file operation fails.
///
/// On cancellation, chunks already sitting in the channel are still written;
/// nothing new is awaited. The open session is released on every exit path.
pub async fn run(
    mut recorder: SessionRecorder,
    mut data_rx: mpsc::Receiver<StreamChunk>,
    err_tx: mpsc::Sender<PipelineError>,
    cancel: CancellationToken,
) {
    debug!("session writer started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("session writer cancelled, draining queued chunks");
                if let Err(e) = drain(&mut recorder, &mut data_rx) {
                    report(&err_tx, e);
                    return;
                }
                break;
            }
            chunk = data_rx.recv() => match chunk {
                Some(chunk) => {
                    if let Err(e) = recorder.record(&chunk) {
                        report(&err_tx, e);
                        return;
                    }
                }
                None => {
                    debug!("data channel closed");
                    break;
                }
            },
        }
    }

    recorder.finish();
    debug!("session writer stopped");
}

fn drain(
    recorder: &mut SessionRecorder,
    data_rx: &mut mpsc::Receiver<StreamChunk>,
) -> Result<(), PipelineError> {
    data_rx.close();
    while let Ok(chunk) = data_rx.try_recv() {
        recorder.record(&chunk)?;
    }
    Ok(())
}

fn report(err_tx: &mpsc::Sender<PipelineError>, err: PipelineError) {
    error!("{}", err);
    // First error wins; a full channel means another stage beat us to it.
    let _ = err_tx.try_send(err);
}
