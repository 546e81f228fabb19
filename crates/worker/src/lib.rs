//! Pipeline stages and the session running them.
//!
//! - Queue drain (work queue → session table)
//! - Ocean feeder (backend or queue → raw index)
//! - Position resolution, identity loading, enrichment driver
//! - Refresh jobs and studies over enriched indexes
//! - Identities cache and merged-identity lookups
//! - Scheduler running configured task sets

pub mod bulk;
pub mod driver;
pub mod feeder;
pub mod identities;
pub mod identities_cache;
pub mod pipeline;
pub mod position;
pub mod queue_drain;
pub mod refresh;
pub mod scheduler;
pub mod studies;
pub mod tasks;
pub mod uuid_items;

pub use driver::{EnrichMode, EnrichReport, EnrichStage, EnrichTask, EnrichmentDriver};
pub use feeder::{fetch_params, FeedReport, FeedRequest, OceanFeeder};
pub use identities::load_identities;
pub use identities_cache::{populate_identities_index, IDENTITIES_INDEX};
pub use pipeline::{CollectReport, Pipeline, PipelineBuilder};
pub use position::resolve_position;
pub use queue_drain::QueueDrain;
pub use refresh::{author_chunks, refresh_identities, refresh_projects, AuthorFilter};
pub use scheduler::*;
pub use studies::{run_studies, StudyArgs};
pub use tasks::{SourceTask, TaskSet};
pub use uuid_items::items_for_uuid;
