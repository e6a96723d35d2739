//! Job-wide cancellation signal.
//!
//! A [`CancelHandle`] flips the signal once; every clone of the matching
//! [`Cancellation`] observes it. Outstanding fetch attempts and backoff
//! sleeps race against [`Cancellation::cancelled`].

use std::sync::Arc;

use tokio::sync::watch;

/// Creates a connected handle/token pair.
#[must_use]
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, Cancellation { rx })
}

/// Triggers cancellation.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes cancellation.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    /// A token that is never cancelled.
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is signalled. Pends forever if the
    /// handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn handle_cancels_all_clones() {
        let (handle, token) = cancellation();
        let other = token.clone();
        assert!(!token.is_cancelled());

        handle.cancel();

        assert!(token.is_cancelled());
        assert!(other.is_cancelled());
        other.cancelled().await;
    }

    #[tokio::test(start_paused = true)]
    async fn never_does_not_resolve() {
        let token = Cancellation::never();
        let raced = tokio::time::timeout(Duration::from_secs(60), token.cancelled()).await;
        assert!(raced.is_err());
        assert!(!token.is_cancelled());
    }
}
