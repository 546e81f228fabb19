//! Test context wiring mocks into a pipeline.

use pipeline_core::{BackendRegistry, Connector, FailurePolicy, RawItem};
use std::sync::Arc;
use worker::{EnrichTask, FeedRequest, Pipeline};

use crate::fixtures::git_params;
use crate::mocks::{
    MemoryStore, MockCommand, MockEnrichFactory, MockOcean, MockQueue, MockRegistry, MockSource,
};

/// Queue key used by test pipelines.
pub const QUEUE_KEY: &str = "items";

/// Mocks shared by a test and the pipelines it builds.
///
/// Two connectors are registered over the same source and enricher:
/// `git`, which can be collected, and `archive`, which is enrich-only.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub identities: Arc<MockRegistry>,
    pub queue: Arc<MockQueue>,
    pub source: Arc<MockSource>,
    pub enrich: Arc<MockEnrichFactory>,
    pub connectors: Arc<BackendRegistry>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    pub fn with_items(items: Vec<RawItem>) -> Self {
        let ctx = Self::new();
        ctx.source.add_items(items);
        ctx
    }

    pub fn with_store(store: MemoryStore) -> Self {
        let source = Arc::new(MockSource::new(Vec::new()));
        let enrich = Arc::new(MockEnrichFactory::new());

        let git = Connector {
            ocean: Arc::new(MockOcean),
            enrich: enrich.clone(),
            command: Some(Arc::new(MockCommand::new(source.clone()))),
        };
        let archive = Connector {
            command: None,
            ..git.clone()
        };
        let connectors = BackendRegistry::new()
            .with("git", git)
            .with("archive", archive);

        Self {
            store: Arc::new(store),
            identities: Arc::new(MockRegistry::new()),
            queue: Arc::new(MockQueue::new()),
            source,
            enrich,
            connectors: Arc::new(connectors),
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline_with_policy(FailurePolicy::LogAndContinue)
    }

    pub fn pipeline_with_policy(&self, policy: FailurePolicy) -> Pipeline {
        Pipeline::builder(self.connectors.clone(), self.store.clone())
            .identity_registry(self.identities.clone())
            .work_queue(self.queue.clone(), QUEUE_KEY)
            .failure_policy(policy)
            .build()
    }

    pub fn feed_request(&self, origin: &str) -> FeedRequest {
        FeedRequest::new("git", git_params(origin))
    }

    pub fn enrich_task(&self, origin: &str) -> EnrichTask {
        EnrichTask::new("git", git_params(origin))
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
