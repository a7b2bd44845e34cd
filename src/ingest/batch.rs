//! Bounded-group commit of staged writes
//!
//! The writer owns an arena of pending operations. Records are staged one
//! at a time; once `batch_size` records are pending the whole arena is
//! committed as one atomic unit and a fresh one begins. `finish` commits
//! whatever is left, so no record is lost to a partial final batch.
//!
//! A failed commit is not retried. The caller learns how many records were
//! committed by earlier flushes and decides what to do.

use crate::error::StoreResult;
use crate::store::{KeyValueStore, WriteOp};

/// Counters describing a writer's progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    /// Records handed to the writer
    pub staged: u64,
    /// Records in batches the store accepted
    pub committed: u64,
    /// Batches the store accepted
    pub batches: u64,
}

/// Accumulates writes and commits them in fixed-size groups
pub struct BatchWriter<'a, S: KeyValueStore + ?Sized> {
    store: &'a S,
    batch_size: usize,
    pending: Vec<WriteOp>,
    pending_records: usize,
    progress: BatchProgress,
}

impl<'a, S: KeyValueStore + ?Sized> BatchWriter<'a, S> {
    /// Create a writer flushing every `batch_size` records
    pub fn new(store: &'a S, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            batch_size,
            pending: Vec::with_capacity(batch_size),
            pending_records: 0,
            progress: BatchProgress::default(),
        }
    }

    /// Append one record's writes to the current batch.
    ///
    /// Does not contact the store. Returns true when the batch has reached
    /// its size and should be flushed.
    pub fn push(&mut self, ops: impl IntoIterator<Item = WriteOp>) -> bool {
        self.pending.extend(ops);
        self.pending_records += 1;
        self.progress.staged += 1;
        self.is_full()
    }

    /// Append a record and flush if that filled the batch.
    ///
    /// Returns true when a flush happened.
    pub async fn stage(&mut self, op: WriteOp) -> StoreResult<bool> {
        if self.push([op]) {
            self.flush().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Whether the current batch holds `batch_size` records
    pub fn is_full(&self) -> bool {
        self.pending_records >= self.batch_size
    }

    /// Records waiting in the current batch
    pub fn pending_records(&self) -> usize {
        self.pending_records
    }

    /// Snapshot of the counters
    pub fn progress(&self) -> BatchProgress {
        self.progress
    }

    /// Commit the current batch, if any, as one atomic unit
    pub async fn flush(&mut self) -> StoreResult<()> {
        if self.pending.is_empty() {
            self.pending_records = 0;
            return Ok(());
        }

        let ops = std::mem::take(&mut self.pending);
        let records = std::mem::replace(&mut self.pending_records, 0);

        self.store.commit(&ops).await?;

        self.progress.committed += records as u64;
        self.progress.batches += 1;
        tracing::debug!(
            "Committed batch {} ({} records, {} ops)",
            self.progress.batches,
            records,
            ops.len()
        );

        self.pending = Vec::with_capacity(self.batch_size);
        Ok(())
    }

    /// Commit the residual batch and return the final counters
    pub async fn finish(mut self) -> StoreResult<BatchProgress> {
        self.flush().await?;
        Ok(self.progress)
    }
}
