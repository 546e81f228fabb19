//! Document store contract shared by the raw and enriched stages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::item::Document;

/// A lazily produced sequence of fallible items.
pub type ItemStream<'a, T> = BoxStream<'a, Result<T>>;

/// Field types understood by index mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Keyword,
    Text,
    Date,
    Long,
    Float,
    Boolean,
    Object,
}

/// Explicit field mapping for an index, passed around as plain data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMapping {
    pub properties: BTreeMap<String, FieldType>,
}

impl IndexMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, field_type: FieldType) -> Self {
        self.properties.insert(field.into(), field_type);
        self
    }
}

/// Equality (or prefix) condition on a possibly nested field.
///
/// Nested fields use dots: `data.product`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub field: String,
    pub value: String,
}

impl FieldMatch {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Parses the `field:value` form used by raw filters.
    pub fn parse(expr: &str) -> Result<Self> {
        match expr.split_once(':') {
            Some((field, value)) if !field.trim().is_empty() => {
                Ok(Self::new(field.trim(), value.trim()))
            }
            _ => Err(Error::invalid_params(format!(
                "filter must look like field:value, got {}",
                expr
            ))),
        }
    }

    /// Path segments of the field.
    pub fn path(&self) -> Vec<&str> {
        self.field.split('.').collect()
    }
}

/// Filter applied when streaming documents out of an index.
///
/// All populated conditions must hold. `any_of` and `prefixes` are each a
/// disjunction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchFilter {
    /// Only documents updated at or after this time
    pub from_date: Option<DateTime<Utc>>,
    /// Only documents at or after this offset
    pub from_offset: Option<i64>,
    pub origin: Option<String>,
    /// Field value must be one of the given values
    pub terms: Option<(String, Vec<String>)>,
    pub must: Vec<FieldMatch>,
    pub any_of: Vec<FieldMatch>,
    pub prefixes: Vec<FieldMatch>,
}

impl FetchFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_terms(mut self, field: impl Into<String>, values: Vec<String>) -> Self {
        self.terms = Some((field.into(), values));
        self
    }
}

/// Document store holding raw and enriched indexes.
///
/// Wire-level retries and backoff belong to the implementation.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store location with credentials stripped, for logging.
    fn url(&self) -> String;

    /// Documents per bulk upload.
    fn bulk_size(&self) -> usize;

    /// Values allowed in a single terms clause.
    fn max_clause_size(&self) -> usize;

    async fn create_if_absent(
        &self,
        index: &str,
        mapping: Option<&IndexMapping>,
        aliases: &[String],
    ) -> Result<()>;

    async fn delete(&self, index: &str) -> Result<()>;

    /// Writes documents keyed by `id_field`, replacing existing ones.
    async fn bulk_upload(&self, index: &str, docs: Vec<Document>, id_field: &str) -> Result<usize>;

    /// Deletes documents written more than `retention_hours` ago.
    async fn delete_older_than(&self, index: &str, retention_hours: u64) -> Result<u64>;

    /// Latest document update time, optionally restricted to one origin.
    async fn latest_enriched_timestamp(
        &self,
        index: &str,
        origin: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Latest document offset, optionally restricted to one origin.
    async fn latest_enriched_offset(&self, index: &str, origin: Option<&str>)
        -> Result<Option<i64>>;

    async fn all_field_names(&self, index: &str) -> Result<BTreeSet<String>>;

    /// Streams matching documents page by page.
    fn fetch<'a>(&'a self, index: &'a str, filter: FetchFilter) -> ItemStream<'a, Document>;

    /// Documents with the given ids; missing ids are skipped.
    async fn get_many(&self, index: &str, ids: &[String]) -> Result<Vec<Document>>;
}
