//! Batch insert helpers for ClickHouse.

use crate::client::{store_error, ClickHouseClient};
use chrono::DateTime;
use clickhouse::Row;
use pipeline_core::{Document, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Date fields checked, in order, for the update time of a document.
const DATE_FIELDS: [&str; 3] = ["metadata__updated_on", "updated_on", "last_seen"];

/// Row of an index table. `ingested_at` is filled by the server.
#[derive(Debug, Clone, PartialEq, Row, Serialize, Deserialize)]
pub struct DocumentRow {
    pub id: String,
    pub origin: String,
    pub updated_at: i64, // DateTime64(3) as milliseconds
    pub item_offset: Option<i64>,
    pub doc: String, // JSON document
}

impl DocumentRow {
    /// Builds a row keyed by the value of `id_field`.
    pub fn from_document(doc: &Document, id_field: &str) -> Result<Self> {
        let id = match doc.get(id_field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(Error::store(format!(
                    "document has no usable {} field",
                    id_field
                )))
            }
        };

        Ok(Self {
            id,
            origin: doc
                .get("origin")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            updated_at: updated_at_millis(doc),
            item_offset: doc.get("offset").and_then(Value::as_i64),
            doc: serde_json::to_string(doc)?,
        })
    }
}

/// Update time of a document in milliseconds, 0 when it has none.
///
/// Numbers are unix seconds, strings RFC 3339.
pub fn updated_at_millis(doc: &Document) -> i64 {
    DATE_FIELDS
        .iter()
        .filter_map(|field| doc.get(*field))
        .find_map(|value| match value {
            Value::Number(n) => n.as_f64().map(|secs| (secs * 1000.0) as i64),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.timestamp_millis()),
            _ => None,
        })
        .unwrap_or(0)
}

/// Inserts documents into the table backing `index`.
pub async fn insert_documents(
    client: &ClickHouseClient,
    index: &str,
    docs: &[Document],
    id_field: &str,
) -> Result<usize> {
    if docs.is_empty() {
        return Ok(0);
    }

    let rows = docs
        .iter()
        .map(|doc| DocumentRow::from_document(doc, id_field))
        .collect::<Result<Vec<_>>>()?;

    let mut insert = client
        .inner()
        .insert(&client.table(index))
        .map_err(store_error("Insert error"))?;

    for row in &rows {
        insert.write(row).await.map_err(store_error("Write error"))?;
    }

    insert.end().await.map_err(store_error("End error"))?;

    debug!(index = %index, count = rows.len(), "Inserted documents to ClickHouse");

    Ok(rows.len())
}
