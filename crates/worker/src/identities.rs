//! Identity loading into the registry.

use futures::{Stream, StreamExt};
use pipeline_core::limits::IDENTITY_BATCH_SIZE;
use pipeline_core::{EnrichBackend, Error, Identity, IdentityRegistry, Item, Result};
use telemetry::metrics;
use tracing::{debug, info};

/// Registers the identities found in `items`, one registry call per batch.
///
/// A batch is submitted as soon as it holds more than
/// `IDENTITY_BATCH_SIZE` distinct identities; the remainder is flushed at
/// the end. Duplicates collapse within a batch only. Returns the number of
/// identities submitted.
pub async fn load_identities<S>(
    items: S,
    enrich: &dyn EnrichBackend,
    registry: &dyn IdentityRegistry,
) -> Result<usize>
where
    S: Stream<Item = Result<Item>>,
{
    let connector = enrich.connector_name();
    let mut batch: Vec<Identity> = Vec::with_capacity(IDENTITY_BATCH_SIZE + 1);
    let mut items_count = 0usize;
    let mut identities_count = 0usize;

    futures::pin_mut!(items);
    while let Some(item) = items.next().await {
        let item = item?;
        items_count += 1;

        for identity in enrich.identities(&item) {
            if !batch.contains(&identity) {
                batch.push(identity);
            }

            if batch.len() > IDENTITY_BATCH_SIZE {
                identities_count += submit(&batch, items_count, connector, registry).await?;
                batch.clear();
            }
        }
    }

    if !batch.is_empty() {
        identities_count += submit(&batch, items_count, connector, registry).await?;
    }

    info!(
        connector = %connector,
        items = items_count,
        identities = identities_count,
        "Identities loaded"
    );
    Ok(identities_count)
}

async fn submit(
    batch: &[Identity],
    items_count: usize,
    connector: &str,
    registry: &dyn IdentityRegistry,
) -> Result<usize> {
    registry
        .add_identities(batch, connector)
        .await
        .map_err(|e| Error::identity_batch(connector, batch.len(), e.to_string()))?;

    metrics().identity_batches.inc();
    metrics().identities_loaded.inc_by(batch.len() as u64);
    debug!(
        connector = %connector,
        items = items_count,
        identities = batch.len(),
        "Processed items identities"
    );

    Ok(batch.len())
}
