//! Signal-driven shutdown.
//!
//! A [`ShutdownController`] owns the process-wide [`CancellationToken`]. A
//! watcher task waits for the first termination signal, logs it and cancels
//! the token once. Everything else only ever observes the token.

use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::AppResult;

/// Cancels a shared token when the process is asked to stop
#[derive(Debug)]
pub struct ShutdownController {
    token: CancellationToken,
    watcher: JoinHandle<()>,
}

impl ShutdownController {
    /// Register SIGINT and SIGTERM handlers and start watching them
    ///
    /// Handlers are registered before this returns, so a signal delivered
    /// while the sensor is still being opened is not lost. Must be called from
    /// within a Tokio runtime.
    #[cfg(unix)]
    pub fn install() -> AppResult<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        Ok(Self::watch(async move {
            tokio::select! {
                _ = interrupt.recv() => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
            }
        }))
    }

    /// Watch for Ctrl-C
    #[cfg(not(unix))]
    pub fn install() -> AppResult<Self> {
        Ok(Self::watch(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => "ctrl-c",
                Err(err) => {
                    tracing::warn!(error = %err, "unable to listen for ctrl-c");
                    std::future::pending().await
                }
            }
        }))
    }

    /// Cancel the token when `signal` resolves; the output names the cause
    pub fn watch<F>(signal: F) -> Self
    where
        F: Future<Output = &'static str> + Send + 'static,
    {
        let token = CancellationToken::new();
        let trigger = token.clone();

        let watcher = tokio::spawn(async move {
            tokio::select! {
                source = signal => {
                    info!(signal = source, "shutdown requested");
                    trigger.cancel();
                }
                _ = trigger.cancelled() => {}
            }
        });

        Self { token, watcher }
    }

    /// Handle on the shared token
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether shutdown has begun
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Begin shutdown without a signal
    pub fn shutdown(&self) {
        self.token.cancel();
    }
}

impl Drop for ShutdownController {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn test_signal_cancels_token() {
        let (raise, signal) = oneshot::channel::<()>();
        let controller = ShutdownController::watch(async move {
            let _ = signal.await;
            "SIGTERM"
        });
        let token = controller.token();
        assert!(!controller.is_triggered());

        raise.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .unwrap();

        assert!(controller.is_triggered());
        assert!(logs_contain("shutdown requested"));
    }

    #[tokio::test]
    async fn test_manual_shutdown_stops_watcher() {
        let controller = ShutdownController::watch(std::future::pending());
        controller.shutdown();
        assert!(controller.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_install_does_not_trigger() {
        let controller = ShutdownController::install().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!controller.is_triggered());
    }
}
