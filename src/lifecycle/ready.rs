//! One-shot readiness gate.
//!
//! Listeners stay unbound until the first routing table is installed. The gate
//! flips from unset to set exactly once; every waiter, including ones that
//! arrive after the flip, observes the same transition.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// One-shot broadcast signal.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadinessGate {
    /// Create an unset gate.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Set the gate. Returns true only for the call that performed the transition.
    pub fn set(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    /// Whether the gate has been set.
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait for the gate, giving up when `cancel` fires.
    ///
    /// Returns true if the gate is set, false if cancelled first.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        let mut rx = self.tx.subscribe();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            fired = async move { rx.wait_for(|fired| *fired).await.is_ok() } => fired,
        }
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_blocks_until_set() {
        let gate = ReadinessGate::new();
        let cancel = CancellationToken::new();

        let waiter = tokio::spawn({
            let gate = gate.clone();
            let cancel = cancel.clone();
            async move { gate.wait(&cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        assert!(gate.set());
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn wait_after_set_returns_immediately() {
        let gate = ReadinessGate::new();
        gate.set();

        let ready = tokio::time::timeout(Duration::from_secs(1), gate.wait(&CancellationToken::new()))
            .await
            .expect("late waiter should not block");
        assert!(ready);
    }

    #[tokio::test]
    async fn set_is_idempotent() {
        let gate = ReadinessGate::new();
        assert!(!gate.is_set());
        assert!(gate.set());
        assert!(!gate.set());
        assert!(!gate.set());
        assert!(gate.is_set());
    }

    #[tokio::test]
    async fn all_waiters_released_by_one_set() {
        let gate = ReadinessGate::new();
        let cancel = CancellationToken::new();

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { gate.wait(&cancel).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.set();

        for waiter in waiters {
            assert!(waiter.await.unwrap());
        }
    }

    #[tokio::test]
    async fn wait_observes_cancellation() {
        let gate = ReadinessGate::new();
        let cancel = CancellationToken::new();

        let waiter = tokio::spawn({
            let gate = gate.clone();
            let cancel = cancel.clone();
            async move { gate.wait(&cancel).await }
        });

        cancel.cancel();
        assert!(!waiter.await.unwrap());
        assert!(!gate.is_set());
    }
}
