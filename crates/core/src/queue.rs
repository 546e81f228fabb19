//! Work queue contract.

use async_trait::async_trait;

use crate::error::Result;
use crate::item::QueueRecord;

/// External queue buffering items collected by remote schedulers.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Reads and removes every pending record under `queue_key`.
    ///
    /// Read and removal must be one atomic operation on the queue side so
    /// each record is delivered to at most one drain.
    async fn drain_all(&self, queue_key: &str) -> Result<Vec<QueueRecord>>;
}
