//! Studies runner.

use pipeline_core::{Document, DocumentStore, EnrichBackend, Error, RawSource, Result};
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tracing::{error, info};

/// Studies whose output index is recreated on every run.
const SELF_RECREATING_PREFIX: &str = "enrich_onion";

/// Param keys containing this name an auxiliary output index.
const OUT_INDEX_KEY: &str = "out_index";

/// One configured study invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyArgs {
    pub name: String,
    /// Id of the study to run
    #[serde(rename = "type")]
    pub study_type: String,
    #[serde(default)]
    pub params: Document,
}

impl StudyArgs {
    pub fn new(name: impl Into<String>, study_type: impl Into<String>, params: Document) -> Self {
        Self {
            name: name.into(),
            study_type: study_type.into(),
            params,
        }
    }

    /// Output indexes subject to retention.
    pub fn retained_indexes(&self) -> Vec<&str> {
        if self.name.starts_with(SELF_RECREATING_PREFIX) {
            return Vec::new();
        }
        self.params
            .iter()
            .filter(|(key, _)| key.contains(OUT_INDEX_KEY))
            .filter_map(|(_, value)| value.as_str())
            .collect()
    }
}

/// Runs every configured study of the enrich backend.
///
/// Args are matched to studies by type, keeping their order. A failing
/// study stops the run and is returned as a `Study` error. Returns the
/// number of studies run.
pub async fn run_studies(
    ocean: &RawSource,
    enrich: &dyn EnrichBackend,
    store: &dyn DocumentStore,
    studies_args: &[StudyArgs],
    retention_hours: Option<u64>,
) -> Result<usize> {
    let mut run = 0;

    for study in enrich.studies() {
        let selected = studies_args.iter().filter(|args| args.study_type == study.id());

        for args in selected {
            info!(study = %args.name, params = ?args.params, "Starting study");

            if let Err(e) = study.run(ocean, enrich, &args.params).await {
                error!(study = %args.name, error = %e, "Problem executing study");
                metrics().studies_failed.inc();
                return Err(match e {
                    Error::Study { .. } => e,
                    other => Error::study(&args.name, other.to_string()),
                });
            }
            metrics().studies_run.inc();
            run += 1;

            let Some(hours) = retention_hours else {
                continue;
            };
            for index in args.retained_indexes() {
                let deleted = store.delete_older_than(index, hours).await?;
                metrics().documents_expired.inc_by(deleted);
                info!(
                    study = %args.name,
                    index = %index,
                    retention_hours = hours,
                    deleted = deleted,
                    "Study retention applied"
                );
            }
        }
    }

    Ok(run)
}
