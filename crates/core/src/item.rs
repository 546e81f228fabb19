//! Raw and enriched item representations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// A JSON document as stored in an index.
pub type Document = Map<String, Value>;

/// Unique id field of raw items in the raw store.
pub const RAW_ID_FIELD: &str = "uuid";

/// A raw record collected from a data source backend.
///
/// Owned by the raw store once written. Only `origin`, `tag` and the
/// bookkeeping fields are interpreted by the pipeline; `data` is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    /// Unique id of the item within the raw store
    pub uuid: String,
    /// Source the item was collected from (repository URL, mailing list...)
    pub origin: String,
    /// Queue partition key
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub backend_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Last update of the item at the source, in unix seconds
    pub updated_on: f64,
    /// Position of the item for offset-resumable backends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl RawItem {
    /// Creates a raw item with an empty payload.
    pub fn new(uuid: impl Into<String>, origin: impl Into<String>, updated_on: f64) -> Self {
        Self {
            uuid: uuid.into(),
            origin: origin.into(),
            tag: String::new(),
            backend_name: String::new(),
            category: None,
            updated_on,
            offset: None,
            project: None,
            data: Value::Null,
        }
    }

    /// Source update time. Out of range values collapse to the epoch.
    pub fn updated_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis((self.updated_on * 1000.0) as i64).unwrap_or_default()
    }

    /// Converts the item into a store document.
    pub fn to_document(&self) -> Result<Document> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(crate::Error::internal(format!(
                "raw item serialized to non-object: {}",
                other
            ))),
        }
    }

    /// Reads an item back from a store document.
    pub fn from_document(doc: Document) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(doc))?)
    }
}

/// An enriched document (eitem).
///
/// Always carries the connector's unique-id field; identity-aware
/// connectors add `*_uuid` fields referencing registry identities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnrichedItem(Document);

impl EnrichedItem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// String value of a field, if present and a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Overwrites fields with the given values, keeping the rest.
    pub fn update(&mut self, fields: Document) {
        self.0.extend(fields);
    }

    pub fn fields(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn into_document(self) -> Document {
        self.0
    }
}

impl From<Document> for EnrichedItem {
    fn from(doc: Document) -> Self {
        Self(doc)
    }
}

/// An item fed to the identity loader.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Raw(RawItem),
    Enriched(EnrichedItem),
}

impl From<RawItem> for Item {
    fn from(item: RawItem) -> Self {
        Self::Raw(item)
    }
}

impl From<EnrichedItem> for Item {
    fn from(item: EnrichedItem) -> Self {
        Self::Enriched(item)
    }
}

/// A record drained from the external work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub tag: String,
    pub payload: RawItem,
}
