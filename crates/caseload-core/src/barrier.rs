//! Completion barrier: the producer waits here until every dispatched batch
//! has been attempted by a worker.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::PipelineError;
use crate::types::BatchReport;

/// Worker-side handle used to report a finished batch.
#[derive(Debug, Clone)]
pub struct ReportSender {
    inner: mpsc::UnboundedSender<BatchReport>,
}

impl ReportSender {
    /// Report a batch. Returns `false` if the barrier is gone.
    pub fn report(&self, report: BatchReport) -> bool {
        self.inner.send(report).is_ok()
    }
}

/// Producer-side end of the completion channel.
#[derive(Debug)]
pub struct CompletionBarrier {
    rx: mpsc::UnboundedReceiver<BatchReport>,
}

/// Create a connected reporter / barrier pair.
pub fn completion_channel() -> (ReportSender, CompletionBarrier) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ReportSender { inner: tx }, CompletionBarrier { rx })
}

impl CompletionBarrier {
    /// Block until exactly `expected` reports have arrived.
    ///
    /// Fails with [`PipelineError::WorkersExited`] if every [`ReportSender`] is
    /// dropped first.
    pub async fn wait(&mut self, expected: usize) -> Result<Vec<BatchReport>, PipelineError> {
        let mut reports = Vec::with_capacity(expected);
        while reports.len() < expected {
            match self.rx.recv().await {
                Some(report) => {
                    debug!(
                        batch = report.batch_id,
                        worker = report.worker_id,
                        done = reports.len() + 1,
                        expected,
                        "batch reported"
                    );
                    reports.push(report);
                }
                None => {
                    return Err(PipelineError::WorkersExited {
                        received: reports.len(),
                        expected,
                    })
                }
            }
        }
        Ok(reports)
    }

    /// Like [`wait`](Self::wait), but gives up with
    /// [`PipelineError::Cancelled`] once `cancel` fires.
    pub async fn wait_or_cancel(
        &mut self,
        expected: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<BatchReport>, PipelineError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            res = self.wait(expected) => res,
        }
    }
}
