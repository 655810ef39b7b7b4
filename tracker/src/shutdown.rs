//! Stopping a running pipeline from the outside.
//!
//! The driver holds a `broadcast` receiver from [`ShutdownController`] and
//! leaves its loop when it fires. Embedders can trigger it directly or tie it
//! to SIGINT/SIGTERM.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal;
use tokio::sync::broadcast;

/// Broadcasts a single stop request to every subscribed pipeline.
///
/// Receivers must be taken with [`subscribe`](Self::subscribe) before the
/// request is sent; a later subscriber can check
/// [`is_triggered`](Self::is_triggered) instead.
#[derive(Clone)]
pub struct ShutdownController {
    notify: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1);
        Self {
            notify,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notify.subscribe()
    }

    /// Ask every subscriber to stop. Repeated calls are no-ops.
    pub fn shutdown(&self) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.notify.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Block until the process gets SIGINT or SIGTERM, then shut down.
    pub async fn wait_for_signal(&self) {
        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "SIGTERM handler unavailable");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let name = tokio::select! {
            _ = signal::ctrl_c() => "SIGINT",
            _ = terminate => "SIGTERM",
        };
        tracing::info!(signal = name, "stopping follow pipeline");
        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
