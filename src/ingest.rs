//! Ingestion: the single worker that drains the file queue.
//!
//! Each dequeued [`FileTask`] goes through partition → chunk → embed →
//! store, one file at a time. The outcome is written to the status ledger
//! (`completed` with the chunk count, or `failed`) and the worker moves on;
//! a failing file never stops the loop.
//!
//! [`watch_until`] wires the whole thing together: watcher (producer) →
//! bounded `mpsc` queue → worker (consumer), running until a
//! [`CancellationToken`] fires. [`run_watch`] trips that token on Ctrl-C.
//! On shutdown the watcher is stopped first, then the worker finishes the
//! file it is on, and the function returns.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::chunk::chunk_by_title;
use crate::config::{ChunkingConfig, Config, StatusConfig, WatchConfig};
use crate::embedding::create_provider;
use crate::error::PipelineError;
use crate::migrate;
use crate::models::{FileTask, StoredDocument};
use crate::partition::{DocumentPartitioner, Partitioner};
use crate::status::{Status, StatusLedger};
use crate::store::sqlite::SqliteStore;
use crate::store::VectorStore;
use crate::watcher::{FileWatcher, PatternFilter};

/// Counts reported when the worker stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub completed: usize,
    pub failed: usize,
}

pub struct Ingestor {
    partitioner: Arc<dyn Partitioner>,
    chunking: ChunkingConfig,
    store: Arc<VectorStore>,
    ledger: Arc<StatusLedger>,
}

impl Ingestor {
    pub fn new(
        partitioner: Arc<dyn Partitioner>,
        chunking: ChunkingConfig,
        store: Arc<VectorStore>,
        ledger: Arc<StatusLedger>,
    ) -> Self {
        Self {
            partitioner,
            chunking,
            store,
            ledger,
        }
    }

    pub fn ledger(&self) -> &Arc<StatusLedger> {
        &self.ledger
    }

    /// Run one file through the pipeline. Returns the number of chunks stored.
    ///
    /// Nothing is written to the vector store unless every stage before
    /// the insert succeeded, and the insert itself is all-or-nothing.
    pub async fn process(&self, task: &FileTask) -> Result<usize, PipelineError> {
        let partitioner = self.partitioner.clone();
        let path = task.path.clone();
        let filename = task.filename.clone();

        let elements = tokio::task::spawn_blocking(move || partitioner.partition(&path, &filename))
            .await
            .map_err(|_| PipelineError::Join {
                filename: task.filename.clone(),
            })?
            .map_err(|source| PipelineError::Partition {
                filename: task.filename.clone(),
                source,
            })?;

        let chunks = chunk_by_title(&elements, &self.chunking);
        if chunks.is_empty() {
            return Err(PipelineError::Empty {
                filename: task.filename.clone(),
            });
        }

        let docs: Vec<StoredDocument> = chunks.iter().map(StoredDocument::from).collect();
        self.store
            .add_documents(&docs)
            .await
            .map_err(|e| PipelineError::Store {
                filename: task.filename.clone(),
                reason: format!("{:#}", e),
            })?;

        Ok(docs.len())
    }

    /// Process `task` and write its final ledger record.
    pub async fn handle(&self, task: &FileTask) -> Result<usize, PipelineError> {
        crate::debug_event!("ingest", "start", "{}", task.path.display());
        let outcome = self.process(task).await;

        let (status, chunks) = match &outcome {
            Ok(n) => {
                crate::log_event!(
                    "ingest",
                    "completed",
                    "{} ({} chunks into '{}')",
                    task.filename,
                    n,
                    self.store.collection()
                );
                (Status::Completed, *n)
            }
            Err(e) => {
                tracing::error!("[ingest] {} failed at {}: {}", task.filename, e.stage(), e);
                (Status::Failed, 0)
            }
        };

        if let Err(e) = self.ledger.record(&task.filename, status, chunks) {
            tracing::error!("[ingest] cannot record {} for {}: {:#}", status, task.filename, e);
        }

        outcome
    }

    /// Drain `rx` until it closes or `cancel` fires. The file in flight
    /// when cancellation arrives is finished first.
    pub async fn run(
        &self,
        mut rx: mpsc::Receiver<FileTask>,
        cancel: CancellationToken,
    ) -> WorkerSummary {
        let mut summary = WorkerSummary::default();

        loop {
            let task = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                task = rx.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
            };

            match self.handle(&task).await {
                Ok(_) => summary.completed += 1,
                Err(_) => summary.failed += 1,
            }
        }

        crate::debug_event!(
            "ingest",
            "worker stopped",
            "{} completed, {} failed",
            summary.completed,
            summary.failed
        );
        summary
    }
}

/// Matching files under `root` that have no ledger entry yet.
pub fn scan_existing(root: &Path, filter: &PatternFilter, ledger: &StatusLedger) -> Result<Vec<FileTask>> {
    let known = ledger.read_all()?;
    let mut tasks = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || !filter.matches(entry.path()) {
            continue;
        }
        if let Some(task) = FileTask::from_path(entry.path()) {
            if !known.contains_key(&task.filename) {
                tasks.push(task);
            }
        }
    }

    Ok(tasks)
}

/// How long shutdown waits for the watcher callback beyond one settle delay.
const WATCHER_STOP_GRACE: Duration = Duration::from_secs(5);

/// Wire the SQLite store, embedding provider, and partitioner from config.
pub async fn build_ingestor(config: &Config) -> Result<Ingestor> {
    let backend = SqliteStore::open(config).await?;
    migrate::ensure_collection(backend.pool(), &config.store.collection).await?;
    let embedder = create_provider(&config.embedding)?;
    let store = Arc::new(VectorStore::new(
        Arc::new(backend),
        embedder,
        config.store.collection.clone(),
    ));

    Ok(Ingestor::new(
        Arc::new(DocumentPartitioner::new(config.partition.strategy)),
        config.chunking.clone(),
        store,
        Arc::new(StatusLedger::new(&config.status.path)),
    ))
}

/// `ragwatch watch`: run the ingestion loop until Ctrl-C.
pub async fn run_watch(config: &Config) -> Result<()> {
    let ingestor = Arc::new(build_ingestor(config).await?);
    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => crate::log_event!("ingest", "shutdown requested"),
                Err(e) => tracing::error!("[ingest] failed to listen for Ctrl-C: {}", e),
            }
            cancel.cancel();
        }
    });

    println!(
        "Watching {} for {} (Ctrl-C to stop)",
        config.watch.root.display(),
        config.watch.patterns.join(", ")
    );

    let summary = watch_until(&config.watch, &config.status, ingestor, cancel).await?;

    println!("stopped");
    println!("  completed: {}", summary.completed);
    println!("  failed: {}", summary.failed);
    Ok(())
}

/// Run watcher → queue → worker until `cancel` fires.
///
/// Startup reconciles stale ledger records, starts the worker and the
/// watcher, then (with `scan_existing`) enqueues files that have no ledger
/// entry. Shutdown stops the watcher and waits for its callback, then
/// stops the worker after the file it is on. Tasks still queued at that
/// point stay `processing`.
pub async fn watch_until(
    watch: &WatchConfig,
    status: &StatusConfig,
    ingestor: Arc<Ingestor>,
    cancel: CancellationToken,
) -> Result<WorkerSummary> {
    let ledger = ingestor.ledger().clone();

    if status.stale_after_secs > 0 {
        let changed = ledger.reconcile_stale(Duration::from_secs(status.stale_after_secs))?;
        for name in &changed {
            crate::log_event!("status", "stale record marked failed", "{}", name);
        }
    }

    let (tx, rx) = mpsc::channel(watch.queue_capacity);
    let stop_worker = CancellationToken::new();
    let worker = tokio::spawn({
        let ingestor = ingestor.clone();
        let stop_worker = stop_worker.clone();
        async move { ingestor.run(rx, stop_worker).await }
    });

    let filter = PatternFilter::new(&watch.patterns)?;
    let settle = Duration::from_millis(watch.settle_ms);
    let watcher = FileWatcher::start(&watch.root, filter.clone(), ledger.clone(), settle, tx.clone())?;

    if watch.scan_existing {
        let existing = scan_existing(watcher.root(), &filter, &ledger)?;
        crate::log_event!("watcher", "startup scan", "{} unprocessed files", existing.len());
        for task in existing {
            if cancel.is_cancelled() {
                break;
            }
            // The watcher may have seen this file since the scan read the ledger.
            match ledger.claim(&task.filename) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => tracing::error!("[watcher] cannot record {}: {:#}", task.filename, e),
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = tx.send(task) => sent.context("ingestion worker stopped")?,
            }
        }
    }
    drop(tx);

    cancel.cancelled().await;

    watcher.stop(settle + WATCHER_STOP_GRACE).await;
    stop_worker.cancel();
    let summary = worker.await.context("ingestion worker panicked")?;
    Ok(summary)
}
