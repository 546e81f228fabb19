//! Refresh jobs recomputing derived fields of already enriched items.
//!
//! Both jobs are lazy streams over the enriched index: nothing is read
//! until the caller polls, and each eitem is updated as a whole before it
//! is yielded. The driver uploads the stream keyed by the unique field.

use async_stream::try_stream;
use futures::StreamExt;
use pipeline_core::{DocumentStore, EnrichBackend, EnrichedItem, FetchFilter, ItemStream};
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tracing::info;

/// Restricts identity refresh to items of some authors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorFilter {
    pub field: String,
    pub values: Vec<String>,
}

impl AuthorFilter {
    /// Filter on `author_id`, else on `author_uuid`.
    pub fn from_author(author_id: Option<&str>, author_uuid: Option<&str>) -> Option<Self> {
        match (author_id, author_uuid) {
            (Some(id), _) => Some(Self {
                field: "author_id".to_string(),
                values: vec![id.to_string()],
            }),
            (None, Some(uuid)) => Some(Self {
                field: "author_uuid".to_string(),
                values: vec![uuid.to_string()],
            }),
            (None, None) => None,
        }
    }
}

/// Splits author values into query groups.
///
/// A group is flushed once it holds more than `max_clause_size` values, so
/// full groups carry `max_clause_size + 1` values.
pub fn author_chunks(values: &[String], max_clause_size: usize) -> Vec<Vec<String>> {
    let mut chunks = Vec::new();
    let mut group = Vec::new();

    for value in values {
        group.push(value.clone());
        if group.len() > max_clause_size {
            chunks.push(std::mem::take(&mut group));
        }
    }
    if !group.is_empty() {
        chunks.push(group);
    }

    chunks
}

/// Every eitem of `index` with its project fields recomputed.
pub fn refresh_projects<'a>(
    store: &'a dyn DocumentStore,
    index: &'a str,
    enrich: &'a dyn EnrichBackend,
) -> ItemStream<'a, EnrichedItem> {
    info!(store = %store.url(), index = %index, "Refreshing project field");

    Box::pin(try_stream! {
        let mut total = 0usize;
        let mut docs = store.fetch(index, FetchFilter::all());

        while let Some(doc) = docs.next().await {
            let mut eitem = EnrichedItem::from(doc?);
            let project = enrich.project(&eitem).await?;
            eitem.update(project);

            total += 1;
            metrics().eitems_refreshed.inc();
            yield eitem;
        }

        info!(index = %index, total = total, "Total eitems refreshed for project field");
    })
}

/// Eitems of `index` with identity fields refreshed from the registry.
///
/// Without a filter every eitem is refreshed; otherwise one filtered fetch
/// is issued per group of `author_chunks`.
pub fn refresh_identities<'a>(
    store: &'a dyn DocumentStore,
    index: &'a str,
    enrich: &'a dyn EnrichBackend,
    author: Option<AuthorFilter>,
) -> ItemStream<'a, EnrichedItem> {
    info!(store = %store.url(), index = %index, "Refreshing identities fields");

    Box::pin(try_stream! {
        let roles = enrich.roles();
        let filters: Vec<FetchFilter> = match author {
            None => vec![FetchFilter::all()],
            Some(author) => author_chunks(&author.values, store.max_clause_size())
                .into_iter()
                .map(|group| FetchFilter::all().with_terms(author.field.clone(), group))
                .collect(),
        };

        let mut total = 0usize;
        for filter in filters {
            let mut docs = store.fetch(index, filter);

            while let Some(doc) = docs.next().await {
                let mut eitem = EnrichedItem::from(doc?);
                let fields = enrich.identity_fields(&eitem, roles.as_deref()).await?;
                eitem.update(fields);

                total += 1;
                metrics().eitems_refreshed.inc();
                yield eitem;
            }
        }

        info!(index = %index, total = total, "Total eitems refreshed for identities fields");
    })
}
