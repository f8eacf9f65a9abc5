//! Debounced rebuild trigger.
//!
//! # Responsibilities
//! - Accept "something changed" signals from any number of producers
//! - Collapse a burst of signals into one rebuild after a quiet window
//! - Run rebuilds one at a time
//!
//! # Design Decisions
//! - Trailing edge: every signal restarts the window, so the last signal of a
//!   burst is always followed by exactly one rebuild
//! - Signals that arrive during a rebuild start a new burst
//! - Stops on cancellation or once every handle has been dropped

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle used to signal configuration changes.
#[derive(Debug, Clone)]
pub struct Coalescer {
    tx: mpsc::UnboundedSender<()>,
}

impl Coalescer {
    /// Spawn the coalescing loop around `rebuild`.
    pub fn spawn<F, Fut>(window: Duration, cancel: CancellationToken, rebuild: F) -> (Self, JoinHandle<()>)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_loop(rx, window, cancel, rebuild));
        (Self { tx }, task)
    }

    /// Record that something changed.
    pub fn signal(&self) {
        // The loop only goes away on shutdown; late signals are irrelevant then.
        let _ = self.tx.send(());
    }
}

async fn run_loop<F, Fut>(
    mut rx: mpsc::UnboundedReceiver<()>,
    window: Duration,
    cancel: CancellationToken,
    rebuild: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    tracing::debug!(window_ms = window.as_millis() as u64, "Reload coalescer started");

    loop {
        // Idle: wait for the first signal of a burst.
        tokio::select! {
            _ = cancel.cancelled() => break,
            signal = rx.recv() => if signal.is_none() { break },
        }

        // Burst: wait for a full quiet window.
        let mut coalesced = 1u64;
        let mut closed = false;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(window) => break,
                signal = rx.recv() => match signal {
                    Some(()) => coalesced += 1,
                    None => {
                        closed = true;
                        break;
                    }
                },
            }
        }

        tracing::debug!(signals = coalesced, "Rebuilding routing table");
        rebuild().await;

        if closed {
            break;
        }
    }

    tracing::debug!("Reload coalescer stopped");
}
