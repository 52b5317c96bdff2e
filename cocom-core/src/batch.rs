//! Batched uploads with submitted/inserted accounting.

use log::{debug, error, info};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::store::DocumentStore;

/// Counts of documents sent to a store and accepted by it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    /// Documents handed to the store.
    pub submitted: usize,
    /// Documents the store reported as written.
    pub inserted: usize,
}

impl UploadSummary {
    /// Documents the store did not accept.
    pub fn missing(&self) -> usize {
        self.submitted.saturating_sub(self.inserted)
    }

    /// Whether every submitted document was written.
    pub fn is_complete(&self) -> bool {
        self.submitted == self.inserted
    }
}

/// Buffers documents and flushes them to a store in batches.
///
/// A flush happens once the buffer holds at least `threshold` documents. An
/// upload error aborts the current batch and propagates; earlier batches stay
/// written.
pub struct BulkWriter<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    id_field: &'a str,
    threshold: usize,
    buffer: Vec<Value>,
    summary: UploadSummary,
}

impl<'a, S: DocumentStore + ?Sized> BulkWriter<'a, S> {
    /// Create a writer flushing every `threshold` documents.
    pub fn new(store: &'a S, id_field: &'a str, threshold: usize) -> Self {
        Self {
            store,
            id_field,
            threshold: threshold.max(1),
            buffer: Vec::new(),
            summary: UploadSummary::default(),
        }
    }

    /// Queue one document, flushing if the threshold is reached.
    pub fn push<T: Serialize>(&mut self, item: &T) -> Result<()> {
        self.buffer.push(serde_json::to_value(item)?);
        if self.buffer.len() >= self.threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Queue several documents, flushing at most once afterwards.
    pub fn extend<T: Serialize>(&mut self, items: &[T]) -> Result<()> {
        for item in items {
            self.buffer.push(serde_json::to_value(item)?);
        }
        if self.buffer.len() >= self.threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Upload whatever is buffered.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        self.summary.submitted += batch.len();
        let inserted = self.store.bulk_upload(&batch, self.id_field)?;
        self.summary.inserted += inserted;
        debug!(
            "uploaded {inserted}/{} items to {}",
            batch.len(),
            self.store.describe()
        );
        Ok(())
    }

    /// Flush the remainder and log the outcome under `label`.
    pub fn finish(mut self, label: &str) -> Result<UploadSummary> {
        self.flush()?;
        let summary = self.summary;
        if summary.is_complete() {
            info!("{} items inserted for {label}", summary.submitted);
        } else {
            error!(
                "{}/{} missing items for {label}",
                summary.missing(),
                summary.submitted
            );
        }
        Ok(summary)
    }
}
