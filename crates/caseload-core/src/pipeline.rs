//! The producer side: health check, batch dispatch, completion wait.
//!
//! ```text
//! Backend::info ─► WorkerPool::spawn ─► Batcher ─► queue ─► barrier.wait(emitted)
//! ```
//!
//! Nothing is dispatched unless the health check succeeds. The number of
//! reports awaited is the number of batches the batcher yielded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{Backend, ClusterInfo};
use crate::barrier::completion_channel;
use crate::batcher::{expected_batches, Batcher};
use crate::config::PipelineConfig;
use crate::enrich::Enricher;
use crate::error::PipelineError;
use crate::loader::load_records;
use crate::pool::{WorkerContext, WorkerPool};
use crate::queue::dispatch_queue;
use crate::region::StaticRegionTable;
use crate::types::{BatchReport, NormalizedRecord};

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub cluster: ClusterInfo,
    pub workers: usize,
    pub records: usize,
    pub batches: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// One report per batch, ordered by batch id.
    pub reports: Vec<BatchReport>,
    pub elapsed: Duration,
}

impl PipelineReport {
    /// Returns `true` if every record was indexed.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    /// Turn partial failure into [`PipelineError::RecordIndex`].
    pub fn ensure_complete(&self) -> Result<(), PipelineError> {
        let first = self.reports.iter().find_map(|r| r.first_error.clone());
        match first {
            Some(first) => Err(PipelineError::RecordIndex {
                failed: self.failed,
                first,
            }),
            None => Ok(()),
        }
    }
}

/// Build the enricher described by `config` (built-in table plus optional file).
pub fn build_enricher(config: &PipelineConfig) -> Result<Enricher, PipelineError> {
    let mut table = StaticRegionTable::builtin();
    if let Some(path) = &config.regions_file {
        let n = table.load_file(path)?;
        info!(path = %path.display(), subdivisions = n, "loaded region table");
    }
    Ok(Enricher::with_overrides(Arc::new(table), config.overrides.clone()))
}

/// Load and enrich the dataset named by `config`.
pub fn load_dataset(config: &PipelineConfig) -> Result<Vec<NormalizedRecord>, PipelineError> {
    let enricher = build_enricher(config)?;
    load_records(&config.input, config.limit, &enricher)
}

/// Publishes records to a backend through a worker pool.
pub struct Pipeline {
    config: PipelineConfig,
    backend: Arc<dyn Backend>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, backend: Arc<dyn Backend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Publish `records` and wait until every batch has been attempted.
    pub async fn run(
        &self,
        records: Vec<NormalizedRecord>,
        cancel: CancellationToken,
    ) -> Result<PipelineReport, PipelineError> {
        self.config.validate()?;
        let started = Instant::now();

        let cluster = self
            .backend
            .info()
            .await
            .map_err(PipelineError::BackendUnavailable)?;
        info!(
            endpoint = self.backend.endpoint(),
            cluster = %cluster.cluster_name,
            version = %cluster.version,
            "backend reachable"
        );

        let total_records = records.len();
        let batch_size = self.config.batch_size;
        let workers = self.config.workers;
        info!(
            records = total_records,
            batches = expected_batches(total_records, batch_size),
            batch_size,
            workers,
            "starting upload"
        );

        let (tx, rx) = dispatch_queue(self.config.queue_capacity());
        let (reporter, mut barrier) = completion_channel();
        let ctx = WorkerContext::new(
            Arc::clone(&self.backend),
            self.config.index.as_str(),
            self.config.record_deadline(),
        );
        let pool = WorkerPool::spawn(workers, ctx, rx, reporter, cancel.clone());

        let mut batcher = Batcher::new(records, batch_size);
        for batch in batcher.by_ref() {
            debug!(batch = batch.id, records = batch.len(), "sending batch to queue");
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                res = tx.send(batch) => Some(res),
            };
            match sent {
                None => {
                    tx.close();
                    pool.join().await;
                    return Err(PipelineError::Cancelled);
                }
                Some(Err(batch)) => {
                    warn!(batch = batch.id, "no workers left to receive batch");
                    break;
                }
                Some(Ok(())) => {}
            }
        }
        tx.close();

        let expected = batcher.emitted() as usize;
        let waited = barrier.wait_or_cancel(expected, &cancel).await;
        let clean = pool.join().await;
        if clean < workers {
            warn!(clean, workers, "some workers did not exit cleanly");
        }
        let mut reports = waited?;
        reports.sort_by_key(|r| r.batch_id);

        let succeeded: usize = reports.iter().map(|r| r.succeeded).sum();
        let failed: usize = reports.iter().map(|r| r.failed).sum();
        let elapsed = started.elapsed();
        info!(
            workers,
            batches = reports.len(),
            succeeded,
            failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "upload finished"
        );

        Ok(PipelineReport {
            cluster,
            workers,
            records: total_records,
            batches: reports.len(),
            succeeded,
            failed,
            reports,
            elapsed,
        })
    }
}
