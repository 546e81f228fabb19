//! Read access to raw items in the raw store.

use futures::StreamExt;
use std::sync::Arc;

use crate::backend::ResumeMode;
use crate::item::RawItem;
use crate::position::Position;
use crate::store::{DocumentStore, FetchFilter, FieldMatch, ItemStream};

/// Raw items of one raw index, restricted to what still needs enriching.
#[derive(Clone)]
pub struct RawSource {
    store: Arc<dyn DocumentStore>,
    index: String,
    filter: FetchFilter,
}

impl RawSource {
    pub fn new(store: Arc<dyn DocumentStore>, index: impl Into<String>) -> Self {
        Self {
            store,
            index: index.into(),
            filter: FetchFilter::default(),
        }
    }

    /// Restricts reads to one origin, so shared raw indexes stay separated.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.filter.origin = Some(origin.into());
        self
    }

    /// Starts reading at `position`, interpreted according to `mode`.
    ///
    /// A timestamp position is still honored by backends without a resume
    /// mode; an offset position only by offset-resumable ones.
    pub fn with_position(mut self, position: Option<Position>, mode: ResumeMode) -> Self {
        match (position, mode) {
            (Some(Position::Offset(offset)), ResumeMode::ByOffset) => {
                self.filter.from_offset = Some(offset);
            }
            (Some(Position::Timestamp(ts)), ResumeMode::ByTimestamp | ResumeMode::None) => {
                self.filter.from_date = Some(ts);
            }
            _ => {}
        }
        self
    }

    pub fn with_filter_raw(mut self, filter: FieldMatch) -> Self {
        self.filter.must.push(filter);
        self
    }

    pub fn with_filter_raw_should(mut self, prefixes: Vec<FieldMatch>) -> Self {
        self.filter.prefixes.extend(prefixes);
        self
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn filter(&self) -> &FetchFilter {
        &self.filter
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Streams the raw items matching this source.
    pub fn items(&self) -> ItemStream<'_, RawItem> {
        self.store
            .fetch(&self.index, self.filter.clone())
            .map(|doc| doc.and_then(RawItem::from_document))
            .boxed()
    }
}

impl std::fmt::Debug for RawSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawSource")
            .field("store", &self.store.url())
            .field("index", &self.index)
            .field("filter", &self.filter)
            .finish()
    }
}
