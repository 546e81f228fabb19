//! Session table of items drained from the work queue.

use futures::stream::{self, StreamExt};
use pipeline_core::{ItemStream, RawItem, Result, WorkQueue};
use std::collections::HashMap;
use std::sync::Arc;
use telemetry::metrics;
use tracing::{debug, info};

/// Items drained from the external work queue, partitioned by tag.
///
/// Drained records live only in this session. Dropping it before the
/// items are fed loses them, since the queue side has already removed them.
pub struct QueueDrain {
    queue: Arc<dyn WorkQueue>,
    queue_key: String,
    by_tag: HashMap<String, Vec<RawItem>>,
}

impl QueueDrain {
    pub fn new(queue: Arc<dyn WorkQueue>, queue_key: impl Into<String>) -> Self {
        Self {
            queue,
            queue_key: queue_key.into(),
            by_tag: HashMap::new(),
        }
    }

    pub fn queue_key(&self) -> &str {
        &self.queue_key
    }

    /// Moves every pending queue record into the session table.
    ///
    /// Returns the number of records drained by this call.
    pub async fn drain(&mut self) -> Result<usize> {
        info!(queue_key = %self.queue_key, "Collecting items from work queue");

        let records = self.queue.drain_all(&self.queue_key).await?;
        let drained = records.len();

        for record in records {
            self.by_tag
                .entry(record.tag)
                .or_default()
                .push(record.payload);
        }

        metrics().queue_records_drained.inc_by(drained as u64);
        for (tag, items) in &self.by_tag {
            debug!(tag = %tag, count = items.len(), "Items buffered for tag");
        }

        Ok(drained)
    }

    /// Drains, then streams every buffered item for `tag`.
    ///
    /// Items stay buffered: a later `take` of the same tag yields them again.
    pub async fn take(&mut self, tag: &str) -> Result<ItemStream<'static, RawItem>> {
        self.drain().await?;

        let items = self.by_tag.get(tag).cloned().unwrap_or_default();
        debug!(tag = %tag, count = items.len(), "Taking buffered items");

        Ok(stream::iter(items.into_iter().map(Ok)).boxed())
    }

    /// Number of items buffered for `tag`.
    pub fn buffered(&self, tag: &str) -> usize {
        self.by_tag.get(tag).map_or(0, Vec::len)
    }

    /// Tags with buffered items, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.by_tag.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

impl std::fmt::Debug for QueueDrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueDrain")
            .field("queue_key", &self.queue_key)
            .field("tags", &self.tags())
            .finish()
    }
}
