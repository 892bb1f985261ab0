//! Shutdown coordination for background tasks.

use std::future::Future;

use tokio::sync::broadcast;

/// Broadcast handle every long-running task (scheduler, config reload)
/// subscribes to.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Wait for `signal`, then notify every subscriber.
    pub async fn trigger_on<F>(&self, signal: F)
    where
        F: Future<Output = ()>,
    {
        signal.await;
        tracing::info!(tasks = self.tx.receiver_count(), "Stopping background tasks");
        self.trigger();
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
