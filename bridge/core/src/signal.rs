//! Readiness Signal
//!
//! A one-way latch: it starts pending, flips to ready exactly once and
//! stays ready. Any number of tasks may wait on it, before or after the
//! flip, and all of them complete.

use std::sync::Arc;

use tokio::sync::watch;

/// Broadcast-once readiness latch
#[derive(Clone, Debug)]
pub struct ReadySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadySignal {
    /// Create a pending signal
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Flip to ready
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn mark_ready(&self) -> bool {
        self.tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        })
    }

    /// Whether the signal has flipped
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until ready; returns immediately if already ready
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_transition_happens_once() {
        let signal = ReadySignal::new();
        assert!(!signal.is_ready());
        assert!(signal.mark_ready());
        assert!(!signal.mark_ready());
        assert!(signal.is_ready());
    }

    #[test]
    fn test_waiter_is_woken_by_mark_ready() {
        let signal = ReadySignal::new();
        let mut waiter = task::spawn(signal.wait());

        assert_pending!(waiter.poll());
        signal.mark_ready();
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
    }

    #[tokio::test]
    async fn test_many_waiters_resolve_together() {
        let signal = ReadySignal::new();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let signal = signal.clone();
                tokio::spawn(async move { signal.wait().await })
            })
            .collect();

        tokio::task::yield_now().await;
        assert!(signal.mark_ready());

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter should finish")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_wait_after_ready_returns_immediately() {
        let signal = ReadySignal::new();
        signal.mark_ready();

        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .expect("already ready");
        // Waiting again is not an error
        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .expect("still ready");
    }
}
