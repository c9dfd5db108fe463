//! Filesystem watcher: newly created matching files become [`FileTask`]s.
//!
//! Runs on the `notify` backend thread. For every create event under the
//! watched root (recursive) whose file name matches one of the configured
//! globs, the callback:
//!
//! 1. records the file as `processing` in the status ledger,
//! 2. sleeps `settle_ms` so the uploader can finish writing,
//! 3. pushes the task into the bounded ingestion queue with `blocking_send`.
//!
//! A full queue blocks the watcher thread, which is the backpressure the
//! worker applies. Directory creation and non-create events are ignored.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::event::CreateKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::models::FileTask;
use crate::status::{Status, StatusLedger};

/// File-name glob filter.
#[derive(Clone)]
pub struct PatternFilter {
    set: GlobSet,
}

impl PatternFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern).with_context(|| format!("invalid pattern {pattern}"))?);
        }
        Ok(Self {
            set: builder.build()?,
        })
    }

    /// Matches on the final path component only.
    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.set.is_match(Path::new(name)))
            .unwrap_or(false)
    }
}

/// Everything the event callback needs, shared with the notify thread.
struct Detector {
    filter: PatternFilter,
    ledger: Arc<StatusLedger>,
    settle: Duration,
    tx: mpsc::Sender<FileTask>,
    /// Dropped together with the callback once the notify thread exits.
    _release: oneshot::Sender<()>,
}

impl Detector {
    /// Returns the tasks that were enqueued.
    fn handle(&self, event: &Event) -> Vec<FileTask> {
        let mut sent = Vec::new();
        for path in detected_files(event, &self.filter) {
            let Some(task) = FileTask::from_path(&path) else {
                continue;
            };

            crate::log_event!("watcher", "detected", "{}", path.display());
            if let Err(e) = self.ledger.record(&task.filename, Status::Processing, 0) {
                tracing::error!("[watcher] cannot record {}: {:#}", task.filename, e);
            }

            if !self.settle.is_zero() {
                std::thread::sleep(self.settle);
            }

            if self.tx.blocking_send(task.clone()).is_err() {
                crate::debug_event!("watcher", "queue closed", "dropping {}", task.filename);
                break;
            }
            sent.push(task);
        }
        sent
    }
}

/// Paths in `event` that count as new matching files.
pub fn detected_files(event: &Event, filter: &PatternFilter) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => event
            .paths
            .iter()
            .filter(|p| !p.is_dir() && filter.matches(p))
            .cloned()
            .collect(),
        _ => Vec::new(),
    }
}

/// A running watcher. Dropping it stops the notify backend thread without
/// waiting for it; [`FileWatcher::stop`] also waits.
pub struct FileWatcher {
    root: PathBuf,
    watcher: RecommendedWatcher,
    released: oneshot::Receiver<()>,
}

impl FileWatcher {
    /// Start watching `root` recursively. Creates `root` if missing.
    pub fn start(
        root: &Path,
        filter: PatternFilter,
        ledger: Arc<StatusLedger>,
        settle: Duration,
        tx: mpsc::Sender<FileTask>,
    ) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("cannot create watch root {}", root.display()))?;

        let (release, released) = oneshot::channel();
        let detector = Detector {
            filter,
            ledger,
            settle,
            tx,
            _release: release,
        };

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                detector.handle(&event);
            }
            Err(e) => tracing::warn!("[watcher] event error: {}", e),
        })?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("cannot watch {}", root.display()))?;

        crate::log_event!("watcher", "watching", "{}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
            watcher,
            released,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop the backend and wait up to `timeout` for the event callback to
    /// be released, including a detection still settling or blocked on a
    /// full queue. Returns `false` if the wait timed out.
    pub async fn stop(self, timeout: Duration) -> bool {
        let Self {
            root,
            watcher,
            released,
        } = self;
        drop(watcher);

        // Err(RecvError) is the expected outcome: the sender is never used.
        match tokio::time::timeout(timeout, released).await {
            Ok(_) => {
                crate::debug_event!("watcher", "stopped", "{}", root.display());
                true
            }
            Err(_) => {
                tracing::warn!("[watcher] backend did not stop within {:?}", timeout);
                false
            }
        }
    }
}
