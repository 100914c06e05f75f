//! Process lifecycle: shutdown signal and background task draining.
//!
//! Services fan one `watch` channel out to every ticker, consumer and the
//! HTTP server. On Ctrl+C or SIGTERM the channel flips to `true`, timers are
//! cancelled, then background tasks are awaited with a timeout.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default time each background task gets to stop.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shutdown broadcaster.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// New broadcaster in the running state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Receiver for one background task.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Flip every receiver to `true`.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether shutdown was triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Wait for Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
}

/// Await each task, giving it `timeout` to finish.
pub async fn drain(handles: Vec<(String, JoinHandle<()>)>, timeout: Duration) {
    for (name, handle) in handles {
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => tracing::info!(task = %name, "Task stopped gracefully"),
            Ok(Err(e)) => tracing::warn!(task = %name, error = %e, "Task failed"),
            Err(_) => tracing::warn!(task = %name, "Task shutdown timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_reaches_every_receiver() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let b = shutdown.subscribe();
        assert!(!shutdown.is_triggered());

        shutdown.trigger();

        assert!(a.changed().await.is_ok());
        assert!(*a.borrow());
        assert!(*b.borrow());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_gives_up_on_stuck_tasks() {
        let stuck = tokio::spawn(std::future::pending::<()>());
        let quick = tokio::spawn(async {});
        drain(
            vec![("quick".to_string(), quick), ("stuck".to_string(), stuck)],
            Duration::from_millis(50),
        )
        .await;
    }
}
