//! Configuration sources.
//!
//! # Data Flow
//! ```text
//! snapshot document + PEM files on disk
//!     → watcher.rs (notify: create / modify / remove)
//!     → reload::Coalescer (debounce)
//!     → file.rs (parse document, read key material)
//!     → ConfigurationSink::on_configuration_change
//! ```
//!
//! # Design Decisions
//! - The proxy only depends on [`ConfigurationSink`]; any watcher that can
//!   assemble a `ConfigSnapshot` can drive it
//! - A document that fails to load keeps the current routing table

pub mod file;
pub mod watcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::RecommendedWatcher;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::reload::Coalescer;
use crate::routing::snapshot::ConfigSnapshot;

pub use file::{load_snapshot, SnapshotError};
pub use watcher::SnapshotWatcher;

/// Receives complete configuration snapshots from a watcher.
///
/// Invoked at most once per coalesced change window, concurrently with
/// request handling.
pub trait ConfigurationSink: Send + Sync + 'static {
    fn on_configuration_change(&self, snapshot: ConfigSnapshot);
}

/// Load the snapshot document and hand it to `sink`.
pub async fn reload_snapshot<S: ConfigurationSink>(path: PathBuf, sink: Arc<S>) {
    let loaded = tokio::task::spawn_blocking({
        let path = path.clone();
        move || load_snapshot(&path)
    })
    .await;

    match loaded {
        Ok(Ok(snapshot)) => sink.on_configuration_change(snapshot),
        Ok(Err(e)) => {
            tracing::error!(path = ?path, error = %e, "Failed to load snapshot, keeping current routing table");
        }
        Err(e) => tracing::error!(error = %e, "Snapshot loader task failed"),
    }
}

/// A running file-backed snapshot source.
pub struct FileSource {
    task: JoinHandle<()>,
    _watcher: RecommendedWatcher,
}

impl FileSource {
    /// Watch `path`, rebuilding through `sink` after each quiet `window`.
    ///
    /// The first load is scheduled immediately.
    pub fn spawn<S: ConfigurationSink>(
        path: &Path,
        window: Duration,
        cancel: CancellationToken,
        sink: Arc<S>,
    ) -> Result<Self, notify::Error> {
        let rebuild_path = path.to_path_buf();
        let (coalescer, task) = Coalescer::spawn(window, cancel, move || {
            reload_snapshot(rebuild_path.clone(), sink.clone())
        });

        let watcher = SnapshotWatcher::new(path, coalescer.clone()).run()?;
        coalescer.signal();

        Ok(Self {
            task,
            _watcher: watcher,
        })
    }

    /// Wait for the reload loop to stop (it stops on cancellation).
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Reload loop failed");
        }
    }
}
