//! Batch and query size limits for the pipeline.
//!
//! Store-side limits are defaults; the document store adapter reports the
//! values it was configured with through `DocumentStore::bulk_size` and
//! `DocumentStore::max_clause_size`.

// === Identity Loading ===

/// Identity accumulator threshold.
///
/// A batch is submitted as soon as the accumulator holds more than this
/// many distinct identities, so full batches carry 101 identities.
pub const IDENTITY_BATCH_SIZE: usize = 100;

// === Store Limits ===

/// Default number of documents per bulk upload.
pub const DEFAULT_BULK_SIZE: usize = 1000;

/// Default number of values allowed in a single terms clause.
pub const DEFAULT_MAX_CLAUSE_SIZE: usize = 1000;

/// Default page size when streaming documents out of the store.
pub const DEFAULT_SCROLL_SIZE: usize = 500;

// === Queue ===

/// Default key of the work queue holding collected items.
pub const DEFAULT_QUEUE_KEY: &str = "items";
