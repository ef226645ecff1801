//! Sync Engine - Runs one complete mirror pass
//!
//! A pass is: make sure both roots exist, reconcile the replica against the
//! source, then prune orphans from the replica. The stages never overlap.
//! File copies inside the reconcile stage run on a bounded pool of blocking
//! workers once every replica folder has been created.

use crate::events::{EventSink, Level};
use crate::mirror::{CopyJob, EntryOutcome, Operation, TreeMirror};
use crate::Config;
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::spawn_blocking;
use tracing::debug;

/// Results from a complete pass
#[derive(Debug, Clone)]
pub struct PassSummary {
    pub created_directories: usize,
    pub copied_files: usize,
    pub replaced_entries: usize,
    pub removed_directories: usize,
    pub removed_files: usize,
    pub failed_operations: usize,
    pub duration: Duration,
    pub results: Vec<EntryOutcome>,
}

impl PassSummary {
    /// True when no entry failed during the pass
    pub fn is_clean(&self) -> bool {
        self.failed_operations == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.results
            .iter()
            .filter(|result| matches!(result, EntryOutcome::Failed { .. }))
    }
}

/// Drives reconcile and prune for one source/replica pair
#[derive(Clone)]
pub struct SyncEngine {
    mirror: TreeMirror,
    sink: Arc<dyn EventSink>,
    max_parallel: usize,
}

impl SyncEngine {
    /// Create a sync engine for the roots named in `config`
    pub fn new(config: &Config, sink: Arc<dyn EventSink>) -> Result<Self> {
        let mirror = TreeMirror::new(config.source_root()?, config.replica_root()?);
        Ok(Self::with_mirror(mirror, sink, config.sync.max_parallel))
    }

    pub fn with_mirror(mirror: TreeMirror, sink: Arc<dyn EventSink>, max_parallel: usize) -> Self {
        Self {
            mirror,
            sink,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Run one full pass: roots, reconcile, prune
    ///
    /// Per-entry failures end up in the summary. Only failures that make the
    /// whole pass meaningless (a root that cannot be created, a worker that
    /// panicked) are returned as errors.
    pub async fn run_pass(&self) -> Result<PassSummary> {
        let start_time = Instant::now();

        debug!(
            "Starting pass: {} -> {}",
            self.mirror.mapping().source_root().display(),
            self.mirror.mapping().replica_root().display()
        );

        let (mirror, sink) = (self.mirror.clone(), self.sink.clone());
        spawn_blocking(move || mirror.ensure_roots(sink.as_ref()))
            .await
            .context("Root preparation task failed")??;

        let mut results = self.reconcile().await?;

        let (mirror, sink) = (self.mirror.clone(), self.sink.clone());
        let pruned = spawn_blocking(move || mirror.prune(sink.as_ref()))
            .await
            .context("Prune task failed")?;
        results.extend(pruned);

        self.sink.emit(Level::Info, "Synchronization complete.");

        Ok(compile_summary(results, start_time.elapsed()))
    }

    async fn reconcile(&self) -> Result<Vec<EntryOutcome>> {
        let (mirror, sink) = (self.mirror.clone(), self.sink.clone());

        if self.max_parallel == 1 {
            return spawn_blocking(move || mirror.reconcile(sink.as_ref()))
                .await
                .context("Reconcile task failed");
        }

        let (mut results, jobs) = spawn_blocking(move || mirror.reconcile_structure(sink.as_ref()))
            .await
            .context("Reconcile task failed")?;

        debug!(
            "Copying {} files with {} workers",
            jobs.len(),
            self.max_parallel
        );
        results.extend(self.copy_files_parallel(jobs).await);

        Ok(results)
    }

    /// Run copy jobs on at most `max_parallel` blocking workers
    async fn copy_files_parallel(&self, jobs: Vec<CopyJob>) -> Vec<EntryOutcome> {
        let mut copies = stream::iter(jobs)
            .map(|job| {
                let sink = self.sink.clone();
                async move {
                    let source = job.source.clone();
                    let worker_sink = sink.clone();
                    match spawn_blocking(move || TreeMirror::copy_file(&job, worker_sink.as_ref()))
                        .await
                    {
                        Ok(outcomes) => outcomes,
                        Err(e) => {
                            let error = format!("copy worker failed: {}", e);
                            sink.emit(
                                Level::Error,
                                &format!("Failed to copy file {}: {}", source.display(), error),
                            );
                            vec![EntryOutcome::Failed {
                                path: source,
                                operation: Operation::CopyFile,
                                error,
                            }]
                        }
                    }
                }
            })
            .buffer_unordered(self.max_parallel);

        let mut results = Vec::new();
        while let Some(outcomes) = copies.next().await {
            results.extend(outcomes);
        }
        results
    }
}

/// Compile pass summary from per-entry outcomes
fn compile_summary(results: Vec<EntryOutcome>, duration: Duration) -> PassSummary {
    let mut summary = PassSummary {
        created_directories: 0,
        copied_files: 0,
        replaced_entries: 0,
        removed_directories: 0,
        removed_files: 0,
        failed_operations: 0,
        duration,
        results: Vec::new(),
    };

    for result in &results {
        match result {
            EntryOutcome::CreatedDirectory { .. } => summary.created_directories += 1,
            EntryOutcome::Copied { .. } => summary.copied_files += 1,
            EntryOutcome::Replaced { .. } => summary.replaced_entries += 1,
            EntryOutcome::RemovedDirectory { .. } => summary.removed_directories += 1,
            EntryOutcome::RemovedFile { .. } => summary.removed_files += 1,
            EntryOutcome::Failed { .. } => summary.failed_operations += 1,
        }
    }

    summary.results = results;
    summary
}
