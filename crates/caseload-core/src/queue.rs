//! Dispatch queue between the producer and the worker pool.
//!
//! A bounded multi-producer / multi-consumer channel: every batch sent is
//! received by exactly one worker. Once all senders are dropped (or
//! [`BatchSender::close`] is called) receivers drain what is left and then see
//! the queue as closed.

use async_channel::{Receiver, Sender};

use crate::types::Batch;

/// Producer half of the dispatch queue.
#[derive(Debug, Clone)]
pub struct BatchSender {
    inner: Sender<Batch>,
}

/// Consumer half of the dispatch queue, shared by all workers.
#[derive(Debug, Clone)]
pub struct BatchReceiver {
    inner: Receiver<Batch>,
}

/// Create a queue holding at most `capacity` pending batches (minimum 1).
pub fn dispatch_queue(capacity: usize) -> (BatchSender, BatchReceiver) {
    let (tx, rx) = async_channel::bounded(capacity.max(1));
    (BatchSender { inner: tx }, BatchReceiver { inner: rx })
}

impl BatchSender {
    /// Enqueue a batch, waiting while the queue is full.
    ///
    /// Returns the batch back if every receiver has been dropped.
    pub async fn send(&self, batch: Batch) -> Result<(), Batch> {
        self.inner.send(batch).await.map_err(|e| e.into_inner())
    }

    /// Close the queue; already-queued batches can still be received.
    pub fn close(&self) -> bool {
        self.inner.close()
    }

    /// Batches currently waiting in the queue.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl BatchReceiver {
    /// Wait for the next batch; `None` once the queue is closed and empty.
    pub async fn recv(&self) -> Option<Batch> {
        self.inner.recv().await.ok()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
