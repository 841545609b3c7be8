//! Error monitor: turns the first reported failure into a shutdown.
//!
//! The reader and the session writer only report errors; they never know
//! about each other. This stage latches the first report and cancels
//! everyone.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{FatalLatch, PipelineError};

pub async fn run(
    mut err_rx: mpsc::Receiver<PipelineError>,
    latch: Arc<FatalLatch>,
    cancel: CancellationToken,
) {
    // Errors are preferred so a report that raced the cancel is still kept.
    tokio::select! {
        biased;
        err = err_rx.recv() => match err {
            Some(err) => {
                let stage = err.stage();
                if latch.set(err) {
                    error!("fatal error in {}, shutting down", stage);
                }
                cancel.cancel();
            }
            None => debug!("error channel closed"),
        },
        _ = cancel.cancelled() => {
            debug!("error monitor cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    #[tokio::test]
    async fn test_error_latches_and_cancels() {
        let (err_tx, err_rx) = mpsc::channel(1);
        let latch = Arc::new(FatalLatch::new());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run(err_rx, Arc::clone(&latch), cancel.clone()));
        err_tx
            .send(PipelineError::TransportRead(io::ErrorKind::BrokenPipe.into()))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(cancel.is_cancelled());
        assert!(matches!(latch.get(), Some(PipelineError::TransportRead(_))));
    }

    #[tokio::test]
    async fn test_cancel_first_leaves_latch_empty() {
        let (_err_tx, err_rx) = mpsc::channel::<PipelineError>(1);
        let latch = Arc::new(FatalLatch::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        run(err_rx, Arc::clone(&latch), cancel).await;
        assert!(!latch.is_set());
    }

    #[tokio::test]
    async fn test_queued_error_wins_over_cancel() {
        let (err_tx, err_rx) = mpsc::channel(1);
        let latch = Arc::new(FatalLatch::new());
        let cancel = CancellationToken::new();

        err_tx
            .try_send(PipelineError::TransportRead(io::ErrorKind::TimedOut.into()))
            .unwrap();
        cancel.cancel();

        run(err_rx, Arc::clone(&latch), cancel).await;
        assert!(latch.is_set());
    }
}
