//! Shutdown coordinator: SIGINT/SIGTERM → cancellation.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Wait for a termination signal or for someone else to cancel.
pub async fn run(cancel: CancellationToken) {
    run_until(cancel, termination_signal()).await
}

/// Cancel when `signal` resolves, or stop quietly once cancelled elsewhere.
/// `signal` yields the name of whatever asked for the shutdown.
pub async fn run_until<F>(cancel: CancellationToken, signal: F)
where
    F: Future<Output = &'static str>,
{
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!("shutdown coordinator stopping");
        }
        name = signal => {
            info!("Received {}, shutting down...", name);
            cancel.cancel();
        }
    }
}

/// Resolves with the signal name once SIGINT or SIGTERM arrives.
async fn termination_signal() -> &'static str {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!("failed to listen for SIGINT: {}", e);
                std::future::pending::<()>().await;
            }
            "SIGINT"
        }
        _ = sigterm() => "SIGTERM",
    }
}

#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("failed to listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stops_when_cancelled_elsewhere() {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(cancel.clone()));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("coordinator ignored cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn test_signal_cancels_token() {
        let cancel = CancellationToken::new();
        let (signal_tx, signal_rx) = tokio::sync::oneshot::channel::<()>();

        let task = tokio::spawn(run_until(cancel.clone(), async move {
            let _ = signal_rx.await;
            "SIGTERM"
        }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!cancel.is_cancelled());

        signal_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("coordinator ignored the signal")
            .unwrap();
        assert!(cancel.is_cancelled());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_cancels_token() {
        use tokio::signal::unix::{signal, SignalKind};

        // Keeps SIGTERM handled for the whole test process before it is sent.
        let _guard = signal(SignalKind::terminate()).unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("coordinator ignored SIGTERM")
            .unwrap();
        assert!(cancel.is_cancelled());
    }
}
