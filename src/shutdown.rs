use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tracing::warn;

/// Ctrl+C flag checked between cycles. A running cycle is never interrupted.
#[derive(Debug, Default)]
pub struct Shutdown {
    requested: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown is requested, immediately if it already was.
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        if self.is_requested() {
            return;
        }
        notified.await;
    }

    /// Requests shutdown on the first interrupt. Returns `true` on the
    /// second one, when the caller should quit without waiting for the cycle.
    pub async fn watch<F, Fut>(&self, mut interrupt: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = io::Result<()>>,
    {
        if interrupt().await.is_err() {
            return false;
        }
        warn!("Interrupt received, stopping after the current cycle. Press Ctrl+C again to quit now.");
        self.request();

        if interrupt().await.is_err() {
            return false;
        }
        warn!("Second interrupt received, quitting.");
        true
    }
}
