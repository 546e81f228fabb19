//! Configured task lists.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::driver::EnrichTask;
use crate::feeder::FeedRequest;

/// A source collected from its last enriched position, then enriched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct SourceTask {
    #[validate(nested)]
    pub collect: FeedRequest,
    #[validate(nested)]
    pub enrich: EnrichTask,
}

/// Everything one scheduler round runs, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TaskSet {
    #[validate(nested)]
    pub collect: Vec<FeedRequest>,
    #[validate(nested)]
    pub sources: Vec<SourceTask>,
    #[validate(nested)]
    pub enrich: Vec<EnrichTask>,
    /// Enrich indexes whose identities are recorded in the identities cache
    pub identities_cache: Vec<String>,
}

impl TaskSet {
    pub fn is_empty(&self) -> bool {
        self.collect.is_empty()
            && self.sources.is_empty()
            && self.enrich.is_empty()
            && self.identities_cache.is_empty()
    }
}
