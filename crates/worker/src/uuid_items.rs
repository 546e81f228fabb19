//! Raw items behind the eitems of a registry identity.

use futures::TryStreamExt;
use pipeline_core::{
    DocumentStore, EnrichBackend, EnrichedItem, FetchFilter, FieldMatch, RawItem, RawSource,
    Result,
};
use tracing::debug;

/// Raw items whose eitems reference registry identity `uuid`.
///
/// Used to re-enrich the items of merged identities. Several eitems may
/// come from one raw item; each raw item is returned once.
pub async fn items_for_uuid(
    uuid: &str,
    enrich: &dyn EnrichBackend,
    store: &dyn DocumentStore,
    enrich_index: &str,
    ocean: &RawSource,
) -> Result<Vec<RawItem>> {
    let uuid_fields = enrich.uuid_fields();
    if uuid_fields.is_empty() {
        return Ok(Vec::new());
    }

    let filter = FetchFilter {
        any_of: uuid_fields
            .iter()
            .map(|field| FieldMatch::new(field.as_str(), uuid))
            .collect(),
        ..FetchFilter::default()
    };

    let eitems: Vec<_> = store.fetch(enrich_index, filter).try_collect().await?;
    if eitems.is_empty() {
        return Ok(Vec::new());
    }

    let mut item_ids: Vec<String> = Vec::new();
    for doc in eitems {
        if let Some(id) = enrich.item_id(&EnrichedItem::from(doc)) {
            if !item_ids.contains(&id) {
                item_ids.push(id);
            }
        }
    }
    debug!(uuid = %uuid, items = ?item_ids, "Items to be re-enriched for merged uuid");

    ocean
        .store()
        .get_many(ocean.index(), &item_ids)
        .await?
        .into_iter()
        .map(RawItem::from_document)
        .collect()
}
