//! Snapshot file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::reload::Coalescer;
use crate::source::file::referenced_dirs;

/// Watches a snapshot document (and the directories of its PEM files) and
/// signals the coalescer on every change.
pub struct SnapshotWatcher {
    path: PathBuf,
    coalescer: Coalescer,
}

impl SnapshotWatcher {
    pub fn new(path: &Path, coalescer: Coalescer) -> Self {
        Self {
            path: path.to_path_buf(),
            coalescer,
        }
    }

    /// Start watching in a background thread.
    ///
    /// The returned watcher must be kept alive for events to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let coalescer = self.coalescer.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                        tracing::debug!(paths = ?event.paths, "Snapshot change detected");
                        coalescer.signal();
                    }
                }
                Err(e) => tracing::error!(error = %e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        for dir in referenced_dirs(&self.path) {
            watcher.watch(&dir, RecursiveMode::NonRecursive)?;
            tracing::debug!(dir = ?dir, "Watching directory");
        }

        tracing::info!(path = ?self.path, "Snapshot watcher started");
        Ok(watcher)
    }
}
