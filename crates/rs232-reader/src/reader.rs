//! Reader stage: byte source → data channel.
//!
//! Runs on a blocking thread because device reads block. Each send races the
//! cancellation token so a stalled consumer can never wedge shutdown.

use std::thread;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::error::PipelineError;
use crate::source::{is_idle_poll, ByteSource, StreamChunk};

/// Size of the buffer handed to each read.
pub const READ_BUFFER_SIZE: usize = 1024;

/// Pause after a read that returned no bytes. Sources at EOF return
/// `Ok(0)` immediately, every time.
const EMPTY_READ_BACKOFF: Duration = Duration::from_millis(10);

/// Pull chunks from `source` until cancelled, the consumer goes away, or the
/// source fails.
pub fn run<S: ByteSource>(
    mut source: S,
    data_tx: mpsc::Sender<StreamChunk>,
    err_tx: mpsc::Sender<PipelineError>,
    cancel: CancellationToken,
    runtime: Handle,
) {
    debug!("reader started");
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        if cancel.is_cancelled() {
            debug!("reader cancelled");
            return;
        }

        match source.read_chunk(&mut buf) {
            Ok(0) => {
                thread::sleep(EMPTY_READ_BACKOFF);
                continue;
            }
            Ok(n) => {
                trace!("read {} bytes", n);
                let chunk = StreamChunk::new(buf[..n].to_vec());
                let delivered = runtime.block_on(async {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => false,
                        sent = data_tx.send(chunk) => sent.is_ok(),
                    }
                });
                if !delivered {
                    debug!("reader stopping, data channel closed or cancelled");
                    return;
                }
            }
            Err(e) if is_idle_poll(&e) => continue,
            Err(e) => {
                error!("serial read failed: {}", e);
                // Capacity is one; if another stage already reported, that error wins.
                let _ = err_tx.try_send(PipelineError::TransportRead(e));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Replays canned read results, then reports idle forever.
    struct Canned(VecDeque<io::Result<Vec<u8>>>);

    impl io::Read for Canned {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(Err(e)) => Err(e),
                None => {
                    std::thread::sleep(Duration::from_millis(5));
                    Err(io::ErrorKind::TimedOut.into())
                }
            }
        }
    }

    #[tokio::test]
    async fn test_forwards_chunks_then_reports_error() {
        let source = Canned(VecDeque::from(vec![
            Ok(b"AB".to_vec()),
            Err(io::ErrorKind::WouldBlock.into()),
            Ok(b"CD".to_vec()),
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")),
        ]));
        let (data_tx, mut data_rx) = mpsc::channel(8);
        let (err_tx, mut err_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = Handle::current();

        tokio::task::spawn_blocking(move || run(source, data_tx, err_tx, cancel, handle))
            .await
            .unwrap();

        assert_eq!(data_rx.recv().await.unwrap().data(), b"AB");
        assert_eq!(data_rx.recv().await.unwrap().data(), b"CD");
        assert!(data_rx.recv().await.is_none());
        assert!(matches!(
            err_rx.recv().await,
            Some(PipelineError::TransportRead(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_stops_idle_reader() {
        let source = Canned(VecDeque::new());
        let (data_tx, _data_rx) = mpsc::channel(8);
        let (err_tx, mut err_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = Handle::current();

        let task = tokio::task::spawn_blocking({
            let cancel = cancel.clone();
            move || run(source, data_tx, err_tx, cancel, handle)
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("reader did not stop after cancel")
            .unwrap();
        assert!(err_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_unblocks_full_channel() {
        let source = Canned((0..4).map(|_| Ok(b"x".to_vec())).collect());
        // Capacity 1 and nobody receiving: the second send blocks
        let (data_tx, _data_rx) = mpsc::channel(1);
        let (err_tx, _err_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = Handle::current();

        let task = tokio::task::spawn_blocking({
            let cancel = cancel.clone();
            move || run(source, data_tx, err_tx, cancel, handle)
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("blocked send ignored cancellation")
            .unwrap();
    }

    /// A drained stream: every read returns `Ok(0)` straight away.
    struct AtEof(Arc<AtomicUsize>);

    impl io::Read for AtEof {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_empty_reads_back_off() {
        let reads = Arc::new(AtomicUsize::new(0));
        let source = AtEof(Arc::clone(&reads));
        let (data_tx, mut data_rx) = mpsc::channel(8);
        let (err_tx, _err_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = Handle::current();

        let task = tokio::task::spawn_blocking({
            let cancel = cancel.clone();
            move || run(source, data_tx, err_tx, cancel, handle)
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("reader did not stop after cancel")
            .unwrap();

        // 200ms at one read per backoff interval is about 20 reads.
        let count = reads.load(Ordering::Relaxed);
        assert!(count > 0);
        assert!(count < 100, "{} reads in 200ms", count);
        assert!(data_rx.recv().await.is_none());
    }
}
