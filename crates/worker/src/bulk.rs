//! Bulk upload batching.

use futures::{Stream, StreamExt};
use pipeline_core::{Document, DocumentStore, Result};
use std::time::Instant;
use telemetry::metrics;
use tracing::debug;

/// Accumulates documents for one index and uploads them in bulk-size chunks.
pub struct DocumentBatch<'a> {
    store: &'a dyn DocumentStore,
    index: &'a str,
    id_field: &'a str,
    max_size: usize,
    docs: Vec<Document>,
    uploaded: usize,
}

impl<'a> DocumentBatch<'a> {
    /// Batches sized to the store's configured bulk size.
    pub fn new(store: &'a dyn DocumentStore, index: &'a str, id_field: &'a str) -> Self {
        Self::with_size(store, index, id_field, store.bulk_size())
    }

    pub fn with_size(
        store: &'a dyn DocumentStore,
        index: &'a str,
        id_field: &'a str,
        max_size: usize,
    ) -> Self {
        let max_size = max_size.max(1);
        Self {
            store,
            index,
            id_field,
            max_size,
            docs: Vec::with_capacity(max_size),
            uploaded: 0,
        }
    }

    /// Adds a document, uploading the batch once it is full.
    pub async fn push(&mut self, doc: Document) -> Result<()> {
        self.docs.push(doc);
        if self.docs.len() >= self.max_size {
            self.flush().await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        if self.docs.is_empty() {
            return Ok(());
        }

        let docs = std::mem::take(&mut self.docs);
        let count = docs.len();
        let start = Instant::now();

        let written = self.store.bulk_upload(self.index, docs, self.id_field).await?;

        metrics()
            .upload_latency_ms
            .observe(start.elapsed().as_millis() as u64);
        metrics().documents_uploaded.inc_by(written as u64);
        debug!(index = %self.index, count = count, written = written, "Bulk upload");

        self.uploaded += written;
        Ok(())
    }

    /// Uploads the remainder and returns the total written.
    pub async fn finish(mut self) -> Result<usize> {
        self.flush().await?;
        Ok(self.uploaded)
    }
}

/// Drains a document stream into the store, keyed by `id_field`.
pub async fn upload_stream<S>(
    store: &dyn DocumentStore,
    index: &str,
    id_field: &str,
    docs: S,
) -> Result<usize>
where
    S: Stream<Item = Result<Document>>,
{
    let mut batch = DocumentBatch::new(store, index, id_field);
    futures::pin_mut!(docs);
    while let Some(doc) = docs.next().await {
        batch.push(doc?).await?;
    }
    batch.finish().await
}
