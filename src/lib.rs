//! GrimoireLab-style collection and enrichment pipeline.
//!
//! Wires the ClickHouse document store, the Redpanda work queue and the
//! SortingHat registry into a `Pipeline` and runs its task set on a
//! schedule. Connectors are supplied by the embedding application through
//! a `BackendRegistry`.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use validator::Validate;

use clickhouse_client::{ClickHouseConfig, ClickHouseStore};
use pipeline_core::{limits::DEFAULT_QUEUE_KEY, BackendRegistry, DocumentStore, FailurePolicy};
use redpanda::{RedpandaConfig, RedpandaQueue};
use sortinghat::{SortingHatClient, SortingHatConfig};
use telemetry::health;
use worker::{Pipeline, PipelineScheduler, SchedulerConfig, TaskSet};

pub use pipeline_core;
pub use worker;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Raw (and by default enriched) index store
    #[serde(default)]
    pub store: ClickHouseConfig,
    /// Separate store for enriched indexes
    #[serde(default)]
    pub enrich_store: Option<ClickHouseConfig>,
    /// Work queue fed by remote schedulers
    #[serde(default)]
    pub queue: Option<RedpandaConfig>,
    #[serde(default = "default_queue_key")]
    pub queue_key: String,
    /// Identity registry
    #[serde(default)]
    pub sortinghat: Option<SortingHatConfig>,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Age after which study output documents are deleted
    #[serde(default)]
    pub studies_retention_hours: Option<u64>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub tasks: TaskSet,
}

fn default_queue_key() -> String {
    DEFAULT_QUEUE_KEY.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: ClickHouseConfig::default(),
            enrich_store: None,
            queue: None,
            queue_key: default_queue_key(),
            sortinghat: None,
            failure_policy: FailurePolicy::default(),
            studies_retention_hours: None,
            scheduler: SchedulerConfig::default(),
            tasks: TaskSet::default(),
        }
    }
}

/// Load configuration from files and environment.
pub fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("PIPELINE")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    config
        .tasks
        .validate()
        .context("Invalid task configuration")?;

    Ok(config)
}

/// Overrides for nested collaborator settings.
///
/// The config crate's nested parsing doesn't work reliably with underscored
/// field names, so secrets and endpoints are read explicitly.
pub fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(url) = var("PIPELINE_STORE_URL") {
        config.store.url = url;
    }
    if let Some(database) = var("PIPELINE_STORE_DATABASE") {
        config.store.database = database;
    }
    if let Some(username) = var("PIPELINE_STORE_USERNAME") {
        config.store.username = Some(username);
    }
    if let Some(password) = var("PIPELINE_STORE_PASSWORD") {
        config.store.password = Some(password);
    }

    if let Some(url) = var("PIPELINE_ENRICH_STORE_URL") {
        let base = config.store.clone();
        config.enrich_store.get_or_insert(base).url = url;
    }

    if let Some(brokers) = var("PIPELINE_QUEUE_BROKERS") {
        let queue = config.queue.get_or_insert_with(RedpandaConfig::default);
        queue.brokers = brokers.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Some(queue) = config.queue.as_mut() {
        if let Some(username) = var("PIPELINE_QUEUE_SASL_USERNAME") {
            queue.sasl_username = Some(username);
        }
        if let Some(password) = var("PIPELINE_QUEUE_SASL_PASSWORD") {
            queue.sasl_password = Some(password);
        }
    }

    if let Some(url) = var("PIPELINE_SORTINGHAT_URL") {
        let registry = config.sortinghat.get_or_insert_with(SortingHatConfig::default);
        registry.url = url;
    }
    if let Some(registry) = config.sortinghat.as_mut() {
        if let Some(token) = var("PIPELINE_SORTINGHAT_TOKEN") {
            registry.token = Some(token);
        }
    }
}

/// Collaborators built from the configuration.
struct Collaborators {
    store: ClickHouseStore,
    enrich_store: Option<ClickHouseStore>,
    queue: Option<RedpandaQueue>,
    registry: Option<SortingHatClient>,
}

impl Collaborators {
    fn new(config: &Config) -> Result<Self> {
        let store = ClickHouseStore::new(config.store.clone())
            .context("Failed to create ClickHouse store")?;
        let enrich_store = config
            .enrich_store
            .clone()
            .map(ClickHouseStore::new)
            .transpose()
            .context("Failed to create enriched ClickHouse store")?;
        let queue = config.queue.clone().map(RedpandaQueue::new);
        let registry = config
            .sortinghat
            .clone()
            .map(SortingHatClient::new)
            .transpose()
            .context("Failed to create SortingHat client")?;

        Ok(Self {
            store,
            enrich_store,
            queue,
            registry,
        })
    }
}

/// Check component health on startup.
async fn check_health(config: &Config, collaborators: &Collaborators) {
    for store in std::iter::once(&collaborators.store).chain(collaborators.enrich_store.as_ref()) {
        if let Err(e) = clickhouse_client::init_database(store.client()).await {
            error!(url = %store.url(), "Failed to initialize ClickHouse database: {}", e);
        }
    }

    let mut store_healthy = clickhouse_client::check_connection(collaborators.store.client()).await;
    if let Some(enrich) = &collaborators.enrich_store {
        store_healthy &= clickhouse_client::check_connection(enrich.client()).await;
    }
    if store_healthy {
        health().store.set_healthy();
        info!("ClickHouse connection: healthy");
    } else {
        health().store.set_unhealthy("Connection failed");
        error!("ClickHouse connection: unhealthy");
    }

    if let Some(queue) = &collaborators.queue {
        let healthy = queue.health_check().await;
        health().queue.record(healthy);
        if healthy {
            let missing = redpanda::missing_queues(queue.config(), &[config.queue_key.as_str()]).await;
            if !missing.is_empty() {
                warn!(queues = ?missing, "Queue topics missing");
            }
            info!("Redpanda connection: healthy");
        } else {
            error!("Redpanda connection: unhealthy");
        }
    }

    if let Some(registry) = &collaborators.registry {
        let healthy = registry.health_check().await;
        health().registry.record(healthy);
        if healthy {
            info!("SortingHat connection: healthy");
        } else {
            error!("SortingHat connection: unhealthy");
        }
    }

    info!(report = ?health().report(), "Startup health");
}

/// Builds a pipeline session over the configured collaborators.
pub async fn build_pipeline(config: &Config, registry: BackendRegistry) -> Result<Pipeline> {
    let collaborators = Collaborators::new(config)?;
    check_health(config, &collaborators).await;

    let Collaborators {
        store,
        enrich_store,
        queue,
        registry: identities,
    } = collaborators;

    let mut builder = Pipeline::builder(Arc::new(registry), Arc::new(store))
        .failure_policy(config.failure_policy)
        .studies_retention_hours(config.studies_retention_hours);

    if let Some(store) = enrich_store {
        builder = builder.enrich_store(Arc::new(store));
    }
    if let Some(queue) = queue {
        builder = builder.work_queue(Arc::new(queue), config.queue_key.clone());
    }
    if let Some(identities) = identities {
        builder = builder.identity_registry(Arc::new(identities));
    }

    Ok(builder.build())
}

/// Runs the configured task set until `shutdown` resolves or, with
/// `run_once`, after a single round.
pub async fn run_until<F>(config: Config, registry: BackendRegistry, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    if config.tasks.is_empty() {
        warn!("No tasks configured");
    }
    if registry.names().is_empty() {
        warn!("No connectors registered; every task will fail with an unknown backend");
    } else {
        info!(connectors = ?registry.names(), "Connectors registered");
    }

    let pipeline = build_pipeline(&config, registry).await?;
    let scheduler = PipelineScheduler::new(config.scheduler.clone(), pipeline, config.tasks);

    tokio::select! {
        _ = scheduler.run() => {
            info!("Scheduler finished");
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    info!(metrics = ?telemetry::metrics().snapshot(), "Shutdown complete");
    Ok(())
}
