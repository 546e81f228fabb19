//! Identities-cache index: which registry identities are in use.

use chrono::Utc;
use futures::StreamExt;
use pipeline_core::{
    Document, DocumentStore, FetchFilter, FieldType, IndexMapping, Result,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::bulk::DocumentBatch;

/// Index holding one document per registry identity in use.
pub const IDENTITIES_INDEX: &str = "grimoirelab-identities-cache";

const SH_UUID_FIELD: &str = "sh_uuid";

/// Mapping of the identities-cache index.
pub fn identities_mapping() -> IndexMapping {
    IndexMapping::new()
        .with(SH_UUID_FIELD, FieldType::Keyword)
        .with("last_seen", FieldType::Date)
}

/// Registry uuid fields among an index's field names.
///
/// `git_uuid` style fields are item ids, not registry references.
pub fn sh_uuid_fields<'a>(fields: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    fields
        .into_iter()
        .filter(|f| f.ends_with("_uuid") && !f.starts_with("git_"))
        .cloned()
        .collect()
}

/// Records every registry uuid referenced by `enrich_index`.
///
/// Returns the number of cache documents written.
pub async fn populate_identities_index(
    store: &dyn DocumentStore,
    enrich_index: &str,
) -> Result<usize> {
    store
        .create_if_absent(IDENTITIES_INDEX, Some(&identities_mapping()), &[])
        .await?;

    let fields = store.all_field_names(enrich_index).await?;
    let uuid_fields = sh_uuid_fields(&fields);
    debug!(index = %enrich_index, fields = ?uuid_fields, "Add identities to {}", IDENTITIES_INDEX);

    let mut batch = DocumentBatch::new(store, IDENTITIES_INDEX, SH_UUID_FIELD);
    let mut docs = store.fetch(enrich_index, FetchFilter::all());

    while let Some(eitem) = docs.next().await {
        let eitem = eitem?;
        let last_seen = Utc::now().to_rfc3339();

        for field in &uuid_fields {
            let Some(sh_uuid) = eitem.get(field).and_then(Value::as_str) else {
                continue;
            };

            let mut doc = Document::new();
            doc.insert(SH_UUID_FIELD.into(), Value::from(sh_uuid));
            doc.insert("last_seen".into(), Value::from(last_seen.clone()));
            batch.push(doc).await?;
        }
    }

    let written = batch.finish().await?;
    info!(index = %enrich_index, written = written, "Identities cache populated");
    Ok(written)
}
