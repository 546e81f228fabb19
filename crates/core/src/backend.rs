//! Connector contracts: data source backends, enrichers and studies.
//!
//! A connector is the triad registered under a backend name: the ocean
//! factory describing the raw index, the enrich factory building the
//! connector's enricher, and (for collectable sources) the command that
//! builds a live backend out of its parameters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::item::{Document, EnrichedItem, Item, RawItem, RAW_ID_FIELD};
use crate::ocean::RawSource;
use crate::position::parse_date;
use crate::registry::IdentityRegistry;
use crate::store::{DocumentStore, FieldMatch, IndexMapping, ItemStream};

/// How a backend resumes an interrupted collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeMode {
    ByTimestamp,
    ByOffset,
    None,
}

/// Fetch parameters a backend accepts, declared up front.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub by_timestamp: bool,
    pub by_offset: bool,
    pub category: bool,
    pub filter_classified: bool,
    pub latest_items: bool,
}

impl Capabilities {
    /// Resumable by date.
    pub fn timestamp() -> Self {
        Self {
            by_timestamp: true,
            ..Self::default()
        }
    }

    /// Resumable by offset.
    pub fn offset() -> Self {
        Self {
            by_offset: true,
            ..Self::default()
        }
    }

    pub fn with_category(mut self) -> Self {
        self.category = true;
        self
    }

    pub fn with_filter_classified(mut self) -> Self {
        self.filter_classified = true;
        self
    }

    pub fn with_latest_items(mut self) -> Self {
        self.latest_items = true;
        self
    }

    /// Preferred resume mode; dates win when both are declared.
    pub fn resume_mode(&self) -> ResumeMode {
        if self.by_timestamp {
            ResumeMode::ByTimestamp
        } else if self.by_offset {
            ResumeMode::ByOffset
        } else {
            ResumeMode::None
        }
    }
}

/// Parameters handed to a backend fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchParams {
    pub from_date: Option<DateTime<Utc>>,
    pub from_offset: Option<i64>,
    pub category: Option<String>,
    pub filter_classified: bool,
    pub latest_items: bool,
    /// Replay from the backend's archive instead of the live source
    pub from_archive: bool,
}

/// Command-line style parameters of a backend (`--from-date 2024-01-01`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendParams(Vec<String>);

/// Fetch arguments parsed out of backend parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchArgs {
    pub from_date: Option<DateTime<Utc>>,
    pub offset: Option<i64>,
    pub category: Option<String>,
    pub filter_classified: bool,
    pub latest_items: bool,
}

impl BackendParams {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(args.into_iter().map(Into::into).collect())
    }

    pub fn args(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value of `--flag value` or `--flag=value`.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        let prefix = format!("{}=", flag);
        let mut args = self.0.iter();
        while let Some(arg) = args.next() {
            if arg == flag {
                return args.next().map(String::as_str);
            }
            if let Some(value) = arg.strip_prefix(&prefix) {
                return Some(value);
            }
        }
        None
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.0.iter().any(|arg| arg == flag)
    }

    pub fn from_date(&self) -> Result<Option<DateTime<Utc>>> {
        self.value_of("--from-date").map(parse_date).transpose()
    }

    pub fn fetch_args(&self) -> Result<FetchArgs> {
        let offset = self
            .value_of("--offset")
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| Error::invalid_params(format!("--offset must be an integer, got {}", v)))
            })
            .transpose()?;

        Ok(FetchArgs {
            from_date: self.from_date()?,
            offset,
            category: self.value_of("--category").map(str::to_string),
            filter_classified: self.has_flag("--filter-classified"),
            latest_items: self.has_flag("--latest-items"),
        })
    }
}

/// A live data source handle built from backend parameters.
pub trait Backend: Send + Sync {
    /// Source identity, e.g. the repository URL.
    fn origin(&self) -> &str;

    /// Queue partition key for items of this source.
    fn tag(&self) -> &str {
        self.origin()
    }

    /// Accepted fetch parameters for live or archive fetching.
    fn capabilities(&self, from_archive: bool) -> Capabilities;

    fn fetch(&self, params: FetchParams) -> ItemStream<'_, RawItem>;
}

/// Builds a live backend out of its parameters.
pub trait BackendCommand: Send + Sync {
    fn build(&self, params: &BackendParams) -> Result<Box<dyn Backend>>;
}

/// Describes the raw index of a connector.
pub trait OceanFactory: Send + Sync {
    fn mapping(&self) -> Option<IndexMapping> {
        None
    }
}

/// Everything a connector's enricher is configured with.
#[derive(Clone, Default)]
pub struct EnrichContext {
    pub backend_name: String,
    pub params: BackendParams,
    /// Section of the projects file the source belongs to
    pub cfg_section_name: Option<String>,
    pub filter_raw: Option<FieldMatch>,
    pub filters_raw_prefix: Vec<FieldMatch>,
    pub last_enrich_date: Option<DateTime<Utc>>,
    pub registry: Option<Arc<dyn IdentityRegistry>>,
    /// Connector specific settings (tokens, rename files, regexes...)
    pub extra: Document,
}

/// Builds a connector's enricher.
pub trait EnrichFactory: Send + Sync {
    fn build(&self, ctx: &EnrichContext) -> Result<Box<dyn EnrichBackend>>;
}

/// Connector specific enrichment logic.
#[async_trait]
pub trait EnrichBackend: Send + Sync {
    fn connector_name(&self) -> &str;

    /// Whether enriched items reference registry identities.
    fn has_identities(&self) -> bool;

    /// Unique id field of enriched items.
    fn unique_field(&self) -> &str;

    /// Identity role fields refreshed by identity refresh.
    fn roles(&self) -> Option<Vec<String>> {
        None
    }

    fn mapping(&self) -> Option<IndexMapping> {
        None
    }

    /// Fields holding registry uuids.
    fn uuid_fields(&self) -> Vec<String> {
        Vec::new()
    }

    /// Id of the raw item an eitem was derived from.
    fn item_id(&self, eitem: &EnrichedItem) -> Option<String> {
        eitem.get_str(RAW_ID_FIELD).map(str::to_string)
    }

    fn identities(&self, item: &Item) -> Vec<Identity>;

    /// Enriches one raw item into zero or more eitems.
    async fn enrich_item(&self, item: &RawItem) -> Result<Vec<EnrichedItem>>;

    /// Whether `enrich_events` is implemented.
    fn supports_events(&self) -> bool {
        false
    }

    /// Event-mode enrichment; connectors without events keep the default.
    async fn enrich_events(&self, _item: &RawItem) -> Result<Vec<EnrichedItem>> {
        Err(Error::internal(format!(
            "{} does not support event enrichment",
            self.connector_name()
        )))
    }

    /// Post-pass over `enrich_index` once item enrichment is done.
    async fn update_items(
        &self,
        _ocean: &RawSource,
        _store: &dyn DocumentStore,
        _enrich_index: &str,
    ) -> Result<()> {
        Ok(())
    }

    /// Project fields for an eitem.
    async fn project(&self, eitem: &EnrichedItem) -> Result<Document>;

    /// Fresh identity fields for an eitem, from the registry.
    async fn identity_fields(
        &self,
        eitem: &EnrichedItem,
        roles: Option<&[String]>,
    ) -> Result<Document>;

    fn studies(&self) -> Vec<Arc<dyn Study>> {
        Vec::new()
    }
}

/// A post-enrichment aggregate computation.
#[async_trait]
pub trait Study: Send + Sync {
    /// Identifier matched against the `type` of study arguments.
    fn id(&self) -> &str;

    async fn run(
        &self,
        ocean: &RawSource,
        enrich: &dyn EnrichBackend,
        params: &Document,
    ) -> Result<()>;
}

/// The triad registered for a backend name.
#[derive(Clone)]
pub struct Connector {
    pub ocean: Arc<dyn OceanFactory>,
    pub enrich: Arc<dyn EnrichFactory>,
    /// Absent for sources that are only enriched, never collected
    pub command: Option<Arc<dyn BackendCommand>>,
}

/// Lookup table of connectors by backend name.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    connectors: HashMap<String, Connector>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, connector: Connector) {
        self.connectors.insert(name.into(), connector);
    }

    pub fn with(mut self, name: impl Into<String>, connector: Connector) -> Self {
        self.register(name, connector);
        self
    }

    pub fn lookup(&self, name: &str) -> Option<&Connector> {
        self.connectors.get(name)
    }

    /// Like `lookup`, failing with `UnknownBackend`.
    pub fn get(&self, name: &str) -> Result<&Connector> {
        self.lookup(name).ok_or_else(|| Error::unknown_backend(name))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.connectors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
