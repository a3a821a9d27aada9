//! Order-preserving, fixed-size partitioning of records into batches.

use crate::types::{Batch, NormalizedRecord};

/// Number of batches `len` records split into at `size` per batch.
///
/// Rounds up on the exact quotient; `size` must be non-zero.
pub fn expected_batches(len: usize, size: usize) -> usize {
    len.div_ceil(size)
}

/// Lazily yields [`Batch`]es of at most `size` records with ids 1, 2, 3, ...
///
/// The number of batches actually yielded is available from [`emitted`],
/// which is the count the completion barrier should wait for.
///
/// [`emitted`]: Batcher::emitted
pub struct Batcher<I> {
    records: I,
    size: usize,
    emitted: u64,
}

impl<I> Batcher<I>
where
    I: Iterator<Item = NormalizedRecord>,
{
    /// # Panics
    /// If `size` is zero.
    pub fn new(records: impl IntoIterator<IntoIter = I>, size: usize) -> Self {
        assert!(size > 0, "batch size must be positive");
        Self {
            records: records.into_iter(),
            size,
            emitted: 0,
        }
    }

    /// Batches yielded so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn batch_size(&self) -> usize {
        self.size
    }
}

impl<I> Iterator for Batcher<I>
where
    I: Iterator<Item = NormalizedRecord>,
{
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let records: Vec<_> = self.records.by_ref().take(self.size).collect();
        if records.is_empty() {
            return None;
        }
        self.emitted += 1;
        Some(Batch {
            id: self.emitted,
            records,
        })
    }
}
