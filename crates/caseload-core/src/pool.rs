//! Fixed-size worker pool.
//!
//! Each worker loops: receive a batch from the dispatch queue, index its
//! records one by one, send exactly one [`BatchReport`] to the completion
//! barrier. A worker exits when the queue is closed and drained, when the
//! cancellation token fires, or when the barrier has gone away.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::backend::Backend;
use crate::barrier::ReportSender;
use crate::error::{BackendError, RecordIndexError};
use crate::queue::BatchReceiver;
use crate::types::{Batch, BatchReport};

/// Everything a worker needs to process a batch; cheap to clone.
#[derive(Clone)]
pub struct WorkerContext {
    pub backend: Arc<dyn Backend>,
    pub index: Arc<str>,
    /// Upper bound for a single `index` call.
    pub request_timeout: Duration,
}

impl WorkerContext {
    pub fn new(
        backend: Arc<dyn Backend>,
        index: impl Into<Arc<str>>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            index: index.into(),
            request_timeout,
        }
    }
}

/// Index every record of `batch`, continuing past failures.
pub async fn process_batch(ctx: &WorkerContext, worker_id: usize, batch: &Batch) -> BatchReport {
    let mut report = BatchReport {
        batch_id: batch.id,
        worker_id,
        attempted: 0,
        succeeded: 0,
        failed: 0,
        first_error: None,
    };

    for (position, record) in batch.records.iter().enumerate() {
        report.attempted += 1;
        let result = match serde_json::to_string(record) {
            Ok(doc) => index_with_timeout(ctx, doc).await,
            Err(e) => Err(BackendError::from(e)),
        };

        match result {
            Ok(()) => report.succeeded += 1,
            Err(source) => {
                let err = RecordIndexError {
                    batch_id: batch.id,
                    position,
                    source,
                };
                warn!(worker = worker_id, error = %err, "failed to index record");
                report.failed += 1;
                report.first_error.get_or_insert(err);
            }
        }
    }
    report
}

async fn index_with_timeout(ctx: &WorkerContext, doc: String) -> Result<(), BackendError> {
    match tokio::time::timeout(ctx.request_timeout, ctx.backend.index(&ctx.index, doc)).await {
        Ok(res) => res,
        Err(_) => Err(BackendError::Timeout {
            ms: ctx.request_timeout.as_millis() as u64,
        }),
    }
}

/// Handles to the running workers.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks consuming from `queue`.
    pub fn spawn(
        workers: usize,
        ctx: WorkerContext,
        queue: BatchReceiver,
        reports: ReportSender,
        cancel: CancellationToken,
    ) -> Self {
        let handles = (0..workers)
            .map(|id| {
                debug!(worker = id, "initializing worker");
                tokio::spawn(run_worker(
                    id,
                    ctx.clone(),
                    queue.clone(),
                    reports.clone(),
                    cancel.clone(),
                ))
            })
            .collect();
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit. Returns how many exited cleanly.
    pub async fn join(self) -> usize {
        let mut clean = 0;
        for (id, res) in join_all(self.handles).await.into_iter().enumerate() {
            match res {
                Ok(()) => clean += 1,
                Err(e) => error!(worker = id, error = %e, "worker task failed"),
            }
        }
        clean
    }
}

async fn run_worker(
    id: usize,
    ctx: WorkerContext,
    queue: BatchReceiver,
    reports: ReportSender,
    cancel: CancellationToken,
) {
    loop {
        let batch = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(worker = id, "worker cancelled");
                break;
            }
            next = queue.recv() => match next {
                Some(batch) => batch,
                None => {
                    debug!(worker = id, "queue closed, worker exiting");
                    break;
                }
            },
        };

        debug!(worker = id, batch = batch.id, records = batch.len(), "uploading batch");
        let report = process_batch(&ctx, id, &batch).await;
        if !reports.report(report) {
            warn!(worker = id, batch = batch.id, "completion barrier dropped, worker exiting");
            break;
        }
    }
}
