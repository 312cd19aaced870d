//! Run-wide cancellation

use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable cancellation flag shared by every task of a run
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // Sender gone: cancellation can no longer happen
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
