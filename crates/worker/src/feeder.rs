//! Ocean feeder: collects raw items from a backend into the raw store.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use pipeline_core::{
    is_epoch, Backend, BackendRegistry, Capabilities, Connector, DocumentStore, Error,
    FailurePolicy, FetchArgs, FetchParams, ItemStream, Position, RawItem, Result, RunOutcome,
    RAW_ID_FIELD,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use telemetry::metrics;
use tracing::{info, warn};
use validator::Validate;

use crate::bulk::DocumentBatch;
use crate::queue_drain::QueueDrain;

/// One collection run of a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FeedRequest {
    #[validate(length(min = 1))]
    pub backend_name: String,
    pub backend_params: pipeline_core::BackendParams,
    /// Explicit raw index; never deleted even when `clean` is set
    pub raw_index: Option<String>,
    pub clean: bool,
    pub fetch_archive: bool,
    /// Take items from the work queue instead of fetching them
    pub use_queue: bool,
    pub project: Option<String>,
    pub aliases: Vec<String>,
    /// Resume point overriding `--from-date`/`--offset`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume: Option<Position>,
}

impl FeedRequest {
    pub fn new(backend_name: impl Into<String>, backend_params: pipeline_core::BackendParams) -> Self {
        Self {
            backend_name: backend_name.into(),
            backend_params,
            ..Self::default()
        }
    }
}

/// Bookkeeping of a completed feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedReport {
    pub backend_name: String,
    pub origin: String,
    pub raw_index: String,
    pub items: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Default raw index of a backend source.
pub fn raw_index_name(backend_name: &str, origin: &str) -> String {
    format!("{}_{}", backend_name, origin)
}

/// Fetch parameters for a backend, from its capabilities and arguments.
///
/// `resume` overrides the argument of the matching capability. An epoch
/// `from_date` and a zero offset are never forwarded.
pub fn fetch_params(
    caps: &Capabilities,
    args: &FetchArgs,
    resume: Option<&Position>,
    from_archive: bool,
) -> FetchParams {
    let mut params = FetchParams {
        from_archive,
        ..FetchParams::default()
    };

    if caps.by_timestamp {
        let from_date = match resume {
            Some(Position::Timestamp(ts)) => Some(*ts),
            _ => args.from_date,
        };
        params.from_date = from_date.filter(|ts| !is_epoch(ts));
    }
    if caps.by_offset {
        let offset = match resume {
            Some(Position::Offset(offset)) => Some(*offset),
            _ => args.offset,
        };
        params.from_offset = offset.filter(|offset| *offset != 0);
    }
    if caps.category {
        params.category = args.category.clone().filter(|c| !c.is_empty());
    }
    if caps.filter_classified {
        params.filter_classified = args.filter_classified;
    }
    if caps.latest_items {
        params.latest_items = args.latest_items;
    }

    params
}

/// Feeds raw indexes from registered backends.
pub struct OceanFeeder {
    registry: Arc<BackendRegistry>,
    store: Arc<dyn DocumentStore>,
    policy: FailurePolicy,
}

impl OceanFeeder {
    pub fn new(registry: Arc<BackendRegistry>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            registry,
            store,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Feeds one backend source into its raw index.
    ///
    /// Unknown backends are an error whatever the policy; every other
    /// failure is a feed error settled by the failure policy.
    pub async fn feed(
        &self,
        request: &FeedRequest,
        queue: Option<&mut QueueDrain>,
    ) -> Result<RunOutcome<FeedReport>> {
        request.validate().map_err(|e| Error::config(e.to_string()))?;

        let name = request.backend_name.as_str();
        let connector = self.registry.get(name)?;

        let backend = match build_backend(connector, request) {
            Ok(backend) => backend,
            Err(e) => {
                metrics().feed_failures.inc();
                return self.policy.settle(Err(as_feed_error(e, name, None)), name, None);
            }
        };
        let origin = backend.origin().to_string();

        let result = self
            .feed_backend(connector, backend.as_ref(), request, queue)
            .await
            .map_err(|e| as_feed_error(e, name, Some(&origin)));
        if result.is_err() {
            metrics().feed_failures.inc();
        }

        let outcome = self.policy.settle(result, name, Some(&origin))?;
        info!(backend = %name, origin = %origin, "Done feeding");
        Ok(outcome)
    }

    async fn feed_backend(
        &self,
        connector: &Connector,
        backend: &dyn Backend,
        request: &FeedRequest,
        queue: Option<&mut QueueDrain>,
    ) -> Result<FeedReport> {
        let started_at = Utc::now();
        let origin = backend.origin();

        // A named raw index may be shared with other sources
        let clean = request.clean && request.raw_index.is_none();
        let raw_index = request
            .raw_index
            .clone()
            .unwrap_or_else(|| raw_index_name(&request.backend_name, origin));

        info!(
            backend = %request.backend_name,
            origin = %origin,
            index = %raw_index,
            store = %self.store.url(),
            "Feeding raw index"
        );

        if clean {
            self.store.delete(&raw_index).await?;
        }
        self.store
            .create_if_absent(&raw_index, connector.ocean.mapping().as_ref(), &request.aliases)
            .await?;

        let items: ItemStream<'_, RawItem> = if request.use_queue {
            let queue = queue.ok_or_else(|| {
                Error::feed(
                    &request.backend_name,
                    Some(origin),
                    "queue feeding requested without a drain session",
                )
            })?;
            queue.take(backend.tag()).await?
        } else {
            let args = request.backend_params.fetch_args()?;
            let caps = backend.capabilities(request.fetch_archive);
            let params = fetch_params(&caps, &args, request.resume.as_ref(), request.fetch_archive);
            info!(
                backend = %request.backend_name,
                from_date = ?params.from_date,
                from_offset = ?params.from_offset,
                category = ?params.category,
                "Fetching items"
            );
            backend.fetch(params)
        };

        let fed = self.upload_items(items, &raw_index, request).await?;
        metrics().items_fed.inc_by(fed as u64);

        Ok(FeedReport {
            backend_name: request.backend_name.clone(),
            origin: origin.to_string(),
            raw_index,
            items: fed,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn upload_items(
        &self,
        mut items: ItemStream<'_, RawItem>,
        raw_index: &str,
        request: &FeedRequest,
    ) -> Result<usize> {
        let mut batch = DocumentBatch::new(self.store.as_ref(), raw_index, RAW_ID_FIELD);
        let mut count = 0;

        while let Some(item) = items.next().await {
            let mut item = item?;
            if item.backend_name.is_empty() {
                item.backend_name = request.backend_name.clone();
            }
            if let Some(project) = &request.project {
                item.project = Some(project.clone());
            }
            batch.push(item.to_document()?).await?;
            count += 1;
        }

        batch.finish().await?;
        Ok(count)
    }
}

fn build_backend(connector: &Connector, request: &FeedRequest) -> Result<Box<dyn Backend>> {
    let command = connector.command.as_ref().ok_or_else(|| {
        Error::feed(
            &request.backend_name,
            None,
            "backend has no collection command",
        )
    })?;
    command.build(&request.backend_params)
}

fn as_feed_error(err: Error, backend: &str, origin: Option<&str>) -> Error {
    match err {
        Error::Feed { .. } | Error::UnknownBackend(_) => err,
        other => {
            warn!(backend = %backend, error = %other, "Feed step failed");
            Error::feed(backend, origin, other.to_string())
        }
    }
}
