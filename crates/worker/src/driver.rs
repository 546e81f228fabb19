//! Enrichment driver.
//!
//! One `enrich` call runs the stages of a single backend and enrich index:
//! position resolution, then one of studies only, project refresh,
//! identity refresh or the normal path (identity loading, item or event
//! enrichment, studies).

use futures::{StreamExt, TryStreamExt};
use pipeline_core::{
    Backend, BackendParams, BackendRegistry, Connector, Document, DocumentStore, EnrichBackend,
    EnrichContext, EnrichedItem, Error, FailurePolicy, FieldMatch, IdentityRegistry, Item,
    Position, RawSource, ResumeMode, Result, RunOutcome,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use telemetry::metrics;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::bulk::{upload_stream, DocumentBatch};
use crate::feeder::raw_index_name;
use crate::identities::load_identities;
use crate::position::resolve_position;
use crate::refresh::{refresh_identities, refresh_projects, AuthorFilter};
use crate::studies::{run_studies, StudyArgs};

/// What an enrichment run does after resolving its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichMode {
    StudiesOnly,
    RefreshProjects,
    RefreshIdentities,
    Normal,
}

/// Driver states, in visiting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichStage {
    ResolvingPosition,
    LoadingIdentities,
    Enriching,
    RefreshingProjects,
    RefreshingIdentities,
    StudiesOnly,
    RunningStudies,
    Done,
}

/// One enrichment run of a backend source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EnrichTask {
    #[validate(length(min = 1))]
    pub backend_name: String,
    pub backend_params: BackendParams,
    /// Projects-file section the source belongs to
    pub cfg_section_name: Option<String>,
    pub raw_index: Option<String>,
    pub enrich_index: Option<String>,
    pub clean: bool,
    pub no_incremental: bool,
    pub only_identities: bool,
    pub studies: bool,
    pub only_studies: bool,
    /// Enrich into the `_events` index with event enrichment
    pub events: bool,
    pub refresh_projects: bool,
    pub refresh_identities: bool,
    pub author_id: Option<String>,
    pub author_uuid: Option<String>,
    /// `field:value` restriction of raw reads
    pub filter_raw: Option<String>,
    /// `field:prefix` alternatives restricting raw reads
    pub filters_raw_prefix: Vec<String>,
    pub studies_args: Vec<StudyArgs>,
    pub aliases: Vec<String>,
    pub last_enrich_date: Option<DateTime<Utc>>,
    /// Connector specific settings
    pub extra: Document,
}

impl EnrichTask {
    pub fn new(backend_name: impl Into<String>, backend_params: BackendParams) -> Self {
        Self {
            backend_name: backend_name.into(),
            backend_params,
            ..Self::default()
        }
    }

    /// Selected mode, by priority.
    pub fn mode(&self) -> EnrichMode {
        if self.only_studies {
            EnrichMode::StudiesOnly
        } else if self.refresh_projects {
            EnrichMode::RefreshProjects
        } else if self.refresh_identities {
            EnrichMode::RefreshIdentities
        } else {
            EnrichMode::Normal
        }
    }

    /// Raw index read by this run.
    pub fn raw_index_name(&self, origin: Option<&str>) -> Option<String> {
        self.raw_index
            .clone()
            .or_else(|| origin.map(|origin| raw_index_name(&self.backend_name, origin)))
    }

    /// Enrich index written by this run.
    pub fn enrich_index_name(&self, origin: Option<&str>) -> Result<String> {
        let mut index = match &self.enrich_index {
            Some(index) => index.clone(),
            None => {
                let raw = self.raw_index_name(origin).ok_or_else(|| {
                    Error::invalid_params(format!("raw index not defined for {}", self.backend_name))
                })?;
                format!("{}_enrich", raw)
            }
        };
        if self.events {
            index.push_str("_events");
        }
        Ok(index)
    }

    /// Whether the enrich index is recreated. Named indexes may be shared
    /// and refreshes work over existing eitems, so neither is ever cleaned.
    pub fn clean_enrich_index(&self) -> bool {
        self.clean
            && self.raw_index.is_none()
            && self.enrich_index.is_none()
            && !self.refresh_projects
            && !self.refresh_identities
    }

    pub fn author_filter(&self) -> Option<AuthorFilter> {
        AuthorFilter::from_author(self.author_id.as_deref(), self.author_uuid.as_deref())
    }

    /// Parsed `filter_raw` and `filters_raw_prefix`.
    pub fn raw_filters(&self) -> Result<(Option<FieldMatch>, Vec<FieldMatch>)> {
        let filter_raw = self.filter_raw.as_deref().map(FieldMatch::parse).transpose()?;
        let prefixes = self
            .filters_raw_prefix
            .iter()
            .map(|f| FieldMatch::parse(f))
            .collect::<Result<Vec<_>>>()?;
        Ok((filter_raw, prefixes))
    }

    /// Settings handed to the connector's enrich factory.
    ///
    /// The connector sees the prefix filters only when no exact raw
    /// filter is set.
    pub fn context(&self, registry: Option<Arc<dyn IdentityRegistry>>) -> Result<EnrichContext> {
        let (filter_raw, prefixes) = self.raw_filters()?;
        let filters_raw_prefix = if filter_raw.is_some() {
            Vec::new()
        } else {
            prefixes
        };

        Ok(EnrichContext {
            backend_name: self.backend_name.clone(),
            params: self.backend_params.clone(),
            cfg_section_name: self.cfg_section_name.clone(),
            filter_raw,
            filters_raw_prefix,
            last_enrich_date: self.last_enrich_date,
            registry,
            extra: self.extra.clone(),
        })
    }
}

/// Result of a completed enrichment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichReport {
    pub enrich_index: String,
    pub position: Option<Position>,
    pub identities: usize,
    /// Raw items that produced at least one eitem
    pub enriched: usize,
    pub refreshed: usize,
    pub studies: usize,
    pub stages: Vec<EnrichStage>,
}

impl EnrichReport {
    fn new(enrich_index: String) -> Self {
        Self {
            enrich_index,
            position: None,
            identities: 0,
            enriched: 0,
            refreshed: 0,
            studies: 0,
            stages: Vec::new(),
        }
    }

    fn enter(&mut self, stage: EnrichStage) {
        debug!(index = %self.enrich_index, stage = ?stage, "Enrichment stage");
        self.stages.push(stage);
    }
}

/// Runs enrichment tasks against the raw and enriched stores.
pub struct EnrichmentDriver {
    registry: Arc<BackendRegistry>,
    store: Arc<dyn DocumentStore>,
    enrich_store: Option<Arc<dyn DocumentStore>>,
    identities: Option<Arc<dyn IdentityRegistry>>,
    policy: FailurePolicy,
    retention_hours: Option<u64>,
}

impl EnrichmentDriver {
    pub fn new(registry: Arc<BackendRegistry>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            registry,
            store,
            enrich_store: None,
            identities: None,
            policy: FailurePolicy::default(),
            retention_hours: None,
        }
    }

    /// Writes eitems to a different store than the raw one.
    pub fn with_enrich_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.enrich_store = Some(store);
        self
    }

    pub fn with_identity_registry(mut self, registry: Arc<dyn IdentityRegistry>) -> Self {
        self.identities = Some(registry);
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Retention applied to study output indexes.
    pub fn with_retention_hours(mut self, hours: Option<u64>) -> Self {
        self.retention_hours = hours;
        self
    }

    pub fn identity_registry(&self) -> Option<Arc<dyn IdentityRegistry>> {
        self.identities.clone()
    }

    fn enrich_store(&self) -> &Arc<dyn DocumentStore> {
        self.enrich_store.as_ref().unwrap_or(&self.store)
    }

    /// Runs one enrichment task.
    ///
    /// Unknown backends and study failures are errors whatever the policy;
    /// every other failure is an enrich error settled by the failure policy.
    pub async fn enrich(&self, task: &EnrichTask) -> Result<RunOutcome<EnrichReport>> {
        task.validate().map_err(|e| Error::config(e.to_string()))?;

        let name = task.backend_name.as_str();
        let connector = self.registry.get(name)?;

        let backend = match connector
            .command
            .as_ref()
            .map(|command| command.build(&task.backend_params))
            .transpose()
        {
            Ok(backend) => backend,
            Err(e) => {
                metrics().enrich_failures.inc();
                return self
                    .policy
                    .settle(Err(as_enrich_error(e, name, None)), name, None);
            }
        };
        let origin = backend.as_ref().map(|b| b.origin().to_string());

        let result = self
            .run(connector, backend.as_deref(), task)
            .await
            .map_err(|e| as_enrich_error(e, name, origin.as_deref()));
        if matches!(&result, Err(e) if e.is_recoverable()) {
            metrics().enrich_failures.inc();
        }

        let outcome = self.policy.settle(result, name, origin.as_deref())?;
        info!(backend = %name, origin = origin.as_deref().unwrap_or("-"), "Done enriching");
        Ok(outcome)
    }

    /// Position the next run of `task` resumes from, settled by the
    /// failure policy like a failed enrichment.
    pub async fn resume_position(&self, task: &EnrichTask) -> Result<RunOutcome<Option<Position>>> {
        task.validate().map_err(|e| Error::config(e.to_string()))?;

        let name = task.backend_name.as_str();
        let connector = self.registry.get(name)?;

        let result = async {
            let backend = connector
                .command
                .as_ref()
                .map(|command| command.build(&task.backend_params))
                .transpose()?;
            let backend = backend.as_deref();
            let enrich_index = task.enrich_index_name(backend.map(|b| b.origin()))?;
            let ctx = task.context(self.identities.clone())?;

            resolve_position(
                backend,
                &ctx,
                self.enrich_store().as_ref(),
                &enrich_index,
                task.no_incremental,
            )
            .await
        }
        .await
        .map_err(|e| as_enrich_error(e, name, None));

        self.policy.settle(result, name, None)
    }

    async fn run(
        &self,
        connector: &Connector,
        backend: Option<&dyn Backend>,
        task: &EnrichTask,
    ) -> Result<EnrichReport> {
        let origin = backend.map(|b| b.origin());
        let enrich_index = task.enrich_index_name(origin)?;
        let raw_index = task.raw_index_name(origin).ok_or_else(|| {
            Error::invalid_params(format!("raw index not defined for {}", task.backend_name))
        })?;

        let (filter_raw, filters_raw_prefix) = task.raw_filters()?;
        let ctx = task.context(self.identities.clone())?;
        let enrich = connector.enrich.build(&ctx)?;
        let enrich = enrich.as_ref();
        let enrich_store = self.enrich_store().as_ref();

        if task.events && !enrich.supports_events() {
            return Err(Error::invalid_params(format!(
                "{} has no event enrichment",
                enrich.connector_name()
            )));
        }

        if task.clean_enrich_index() {
            enrich_store.delete(&enrich_index).await?;
        }
        enrich_store
            .create_if_absent(&enrich_index, enrich.mapping().as_ref(), &task.aliases)
            .await?;

        let mut report = EnrichReport::new(enrich_index.clone());

        report.enter(EnrichStage::ResolvingPosition);
        let position =
            resolve_position(backend, &ctx, enrich_store, &enrich_index, task.no_incremental)
                .await?;
        report.position = position.clone();

        let resume_mode =
            backend.map_or(ResumeMode::None, |b| b.capabilities(false).resume_mode());
        let mut ocean = RawSource::new(self.store.clone(), raw_index.clone())
            .with_position(position, resume_mode);
        if let Some(origin) = origin {
            ocean = ocean.with_origin(origin);
        }
        if let Some(filter) = filter_raw {
            ocean = ocean.with_filter_raw(filter);
        }
        if !filters_raw_prefix.is_empty() {
            ocean = ocean.with_filter_raw_should(filters_raw_prefix);
        }

        match task.mode() {
            EnrichMode::StudiesOnly => {
                info!(backend = %task.backend_name, "Running only studies (no identities and no enrichment)");
                report.enter(EnrichStage::StudiesOnly);
                report.studies = run_studies(
                    &ocean,
                    enrich,
                    enrich_store,
                    &task.studies_args,
                    self.retention_hours,
                )
                .await?;
            }
            EnrichMode::RefreshProjects => {
                report.enter(EnrichStage::RefreshingProjects);
                let eitems = refresh_projects(enrich_store, &enrich_index, enrich)
                    .map_ok(EnrichedItem::into_document);
                report.refreshed =
                    upload_stream(enrich_store, &enrich_index, enrich.unique_field(), eitems)
                        .await?;
            }
            EnrichMode::RefreshIdentities => {
                report.enter(EnrichStage::RefreshingIdentities);
                let eitems =
                    refresh_identities(enrich_store, &enrich_index, enrich, task.author_filter())
                        .map_ok(EnrichedItem::into_document);
                report.refreshed =
                    upload_stream(enrich_store, &enrich_index, enrich.unique_field(), eitems)
                        .await?;
            }
            EnrichMode::Normal => {
                self.store
                    .create_if_absent(&raw_index, connector.ocean.mapping().as_ref(), &[])
                    .await?;
                info!(
                    store = %enrich_store.url(),
                    index = %enrich_index,
                    "Adding enrichment data"
                );

                // Every identity must be registered before any eitem refers to it
                if let Some(registry) = self.identities.as_deref() {
                    if enrich.has_identities() {
                        report.enter(EnrichStage::LoadingIdentities);
                        let items = ocean.items().map_ok(Item::from);
                        report.identities = load_identities(items, enrich, registry).await?;
                    }
                }

                if task.only_identities {
                    info!(backend = %task.backend_name, "Only identities added. Enrich not done!");
                } else {
                    report.enter(EnrichStage::Enriching);
                    report.enriched =
                        enrich_items(&ocean, enrich, enrich_store, &enrich_index, task.events)
                            .await?;

                    if task.studies {
                        report.enter(EnrichStage::RunningStudies);
                        report.studies = run_studies(
                            &ocean,
                            enrich,
                            enrich_store,
                            &task.studies_args,
                            self.retention_hours,
                        )
                        .await?;
                    }
                }
            }
        }

        report.enter(EnrichStage::Done);
        Ok(report)
    }
}

/// Enriches the raw items of `ocean` into `enrich_index`.
///
/// Items failing enrichment are logged and skipped. Returns the number of
/// raw items that produced at least one eitem.
async fn enrich_items(
    ocean: &RawSource,
    enrich: &dyn EnrichBackend,
    store: &dyn DocumentStore,
    enrich_index: &str,
    events: bool,
) -> Result<usize> {
    let mut batch = DocumentBatch::new(store, enrich_index, enrich.unique_field());
    let mut items = ocean.items();
    let mut enriched = 0usize;

    while let Some(item) = items.next().await {
        let item = item?;
        let eitems = if events {
            enrich.enrich_events(&item).await
        } else {
            enrich.enrich_item(&item).await
        };

        match eitems {
            Ok(eitems) if eitems.is_empty() => {}
            Ok(eitems) => {
                enriched += 1;
                for eitem in eitems {
                    batch.push(eitem.into_document()).await?;
                }
            }
            Err(e) => {
                metrics().enrich_item_errors.inc();
                warn!(uuid = %item.uuid, origin = %item.origin, error = %e, "Skipping item");
            }
        }
    }

    batch.finish().await?;
    if !events {
        enrich.update_items(ocean, store, enrich_index).await?;
    }
    metrics().items_enriched.inc_by(enriched as u64);
    info!(
        index = %enrich_index,
        total = enriched,
        "Total {} enriched",
        if events { "events" } else { "items" }
    );

    Ok(enriched)
}

fn as_enrich_error(err: Error, backend: &str, origin: Option<&str>) -> Error {
    match err {
        Error::Enrich { .. }
        | Error::IdentityBatch { .. }
        | Error::Study { .. }
        | Error::UnknownBackend(_) => err,
        other => Error::enrich(backend, origin, other.to_string()),
    }
}
