//! Pipeline session tying the stages to one set of collaborators.

use pipeline_core::{
    BackendRegistry, DocumentStore, FailurePolicy, IdentityRegistry, Position, RawItem, RawSource,
    Result, RunOutcome, WorkQueue,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::driver::{EnrichReport, EnrichTask, EnrichmentDriver};
use crate::feeder::{FeedReport, FeedRequest, OceanFeeder};
use crate::identities_cache::populate_identities_index;
use crate::queue_drain::QueueDrain;
use crate::uuid_items::items_for_uuid;

/// Outcome of `Pipeline::collect_and_enrich`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectReport {
    /// Position the feed resumed from
    pub position: Option<Position>,
    /// Absent when the position could not be resolved
    pub feed: Option<RunOutcome<FeedReport>>,
    pub enrich: RunOutcome<EnrichReport>,
}

/// Feeder, driver and queue drain sharing one registry and store.
///
/// The queue drain table belongs to the session, so separate sessions
/// never see each other's drained items.
pub struct Pipeline {
    registry: Arc<BackendRegistry>,
    store: Arc<dyn DocumentStore>,
    enrich_store: Option<Arc<dyn DocumentStore>>,
    feeder: OceanFeeder,
    driver: EnrichmentDriver,
    queue: Option<QueueDrain>,
}

/// Builder for `Pipeline`.
pub struct PipelineBuilder {
    registry: Arc<BackendRegistry>,
    store: Arc<dyn DocumentStore>,
    enrich_store: Option<Arc<dyn DocumentStore>>,
    identities: Option<Arc<dyn IdentityRegistry>>,
    queue: Option<QueueDrain>,
    policy: FailurePolicy,
    retention_hours: Option<u64>,
}

impl PipelineBuilder {
    pub fn enrich_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.enrich_store = Some(store);
        self
    }

    pub fn identity_registry(mut self, registry: Arc<dyn IdentityRegistry>) -> Self {
        self.identities = Some(registry);
        self
    }

    pub fn work_queue(mut self, queue: Arc<dyn WorkQueue>, queue_key: impl Into<String>) -> Self {
        self.queue = Some(QueueDrain::new(queue, queue_key));
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn studies_retention_hours(mut self, hours: Option<u64>) -> Self {
        self.retention_hours = hours;
        self
    }

    pub fn build(self) -> Pipeline {
        let feeder = OceanFeeder::new(self.registry.clone(), self.store.clone())
            .with_policy(self.policy);

        let mut driver = EnrichmentDriver::new(self.registry.clone(), self.store.clone())
            .with_policy(self.policy)
            .with_retention_hours(self.retention_hours);
        if let Some(store) = &self.enrich_store {
            driver = driver.with_enrich_store(store.clone());
        }
        if let Some(registry) = self.identities {
            driver = driver.with_identity_registry(registry);
        }

        Pipeline {
            registry: self.registry,
            store: self.store,
            enrich_store: self.enrich_store,
            feeder,
            driver,
            queue: self.queue,
        }
    }
}

impl Pipeline {
    pub fn builder(registry: Arc<BackendRegistry>, store: Arc<dyn DocumentStore>) -> PipelineBuilder {
        PipelineBuilder {
            registry,
            store,
            enrich_store: None,
            identities: None,
            queue: None,
            policy: FailurePolicy::default(),
            retention_hours: None,
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn queue(&self) -> Option<&QueueDrain> {
        self.queue.as_ref()
    }

    fn enrich_store(&self) -> &dyn DocumentStore {
        self.enrich_store.as_ref().unwrap_or(&self.store).as_ref()
    }

    /// Feeds one source, taking queued items from this session's drain.
    pub async fn feed(&mut self, request: &FeedRequest) -> Result<RunOutcome<FeedReport>> {
        self.feeder.feed(request, self.queue.as_mut()).await
    }

    pub async fn enrich(&self, task: &EnrichTask) -> Result<RunOutcome<EnrichReport>> {
        self.driver.enrich(task).await
    }

    /// Feeds a source from its last enriched position, then enriches it.
    ///
    /// Enrichment runs even when the feed failed, over whatever the raw
    /// index already holds.
    pub async fn collect_and_enrich(
        &mut self,
        feed: &FeedRequest,
        task: &EnrichTask,
    ) -> Result<CollectReport> {
        let position = match self.driver.resume_position(task).await? {
            RunOutcome::Completed(position) => position,
            RunOutcome::Failed { kind, message } => {
                return Ok(CollectReport {
                    position: None,
                    feed: None,
                    enrich: RunOutcome::Failed { kind, message },
                });
            }
        };
        info!(backend = %feed.backend_name, position = ?position, "Collecting from position");

        let mut request = feed.clone();
        request.resume = position.clone();
        let fed = self.feed(&request).await?;

        let enriched = self.enrich(task).await?;

        Ok(CollectReport {
            position,
            feed: Some(fed),
            enrich: enriched,
        })
    }

    /// Fills the identities-cache index from `enrich_index`.
    pub async fn populate_identities_index(&self, enrich_index: &str) -> Result<usize> {
        populate_identities_index(self.enrich_store(), enrich_index).await
    }

    /// Raw items whose eitems reference registry identity `uuid`.
    pub async fn items_for_uuid(&self, uuid: &str, task: &EnrichTask) -> Result<Vec<RawItem>> {
        let connector = self.registry.get(&task.backend_name)?;
        let backend = connector
            .command
            .as_ref()
            .map(|command| command.build(&task.backend_params))
            .transpose()?;
        let origin = backend.as_ref().map(|b| b.origin());

        let enrich_index = task.enrich_index_name(origin)?;
        let raw_index = task.raw_index_name(origin).ok_or_else(|| {
            pipeline_core::Error::invalid_params(format!(
                "raw index not defined for {}",
                task.backend_name
            ))
        })?;

        let ctx = task.context(self.driver.identity_registry())?;
        let enrich = connector.enrich.build(&ctx)?;
        let ocean = RawSource::new(self.store.clone(), raw_index);

        items_for_uuid(uuid, enrich.as_ref(), self.enrich_store(), &enrich_index, &ocean).await
    }
}
