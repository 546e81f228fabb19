//! Scheduler running the configured tasks in rounds.

use pipeline_core::{Result, RunOutcome};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::pipeline::Pipeline;
use crate::tasks::TaskSet;

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Time between round starts, in seconds
    pub interval_secs: u64,
    /// Stop after the first round
    pub run_once: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600, // 1 hour
            run_once: false,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Tally of one round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundReport {
    pub completed: usize,
    pub failed: usize,
    pub identities_cached: usize,
}

impl RoundReport {
    fn record<T>(&mut self, outcome: &RunOutcome<T>) {
        if outcome.is_completed() {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Runs a task set sequentially on a fixed interval.
pub struct PipelineScheduler {
    config: SchedulerConfig,
    pipeline: Pipeline,
    tasks: TaskSet,
}

impl PipelineScheduler {
    pub fn new(config: SchedulerConfig, pipeline: Pipeline, tasks: TaskSet) -> Self {
        Self {
            config,
            pipeline,
            tasks,
        }
    }

    /// Runs rounds in the background.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs rounds until `run_once` stops it.
    ///
    /// An error aborts the current round only; the next tick starts over.
    pub async fn run(mut self) {
        let mut ticker = interval(self.config.interval());
        info!(
            interval_secs = self.config.interval_secs,
            collect = self.tasks.collect.len(),
            sources = self.tasks.sources.len(),
            enrich = self.tasks.enrich.len(),
            "Pipeline scheduler started"
        );

        loop {
            ticker.tick().await;

            match self.run_round().await {
                Ok(report) => info!(
                    completed = report.completed,
                    failed = report.failed,
                    identities_cached = report.identities_cached,
                    "Round complete"
                ),
                Err(e) => error!(code = e.code(), error = %e, "Round aborted"),
            }
            info!(metrics = ?telemetry::metrics().snapshot(), "Pipeline metrics");

            if self.config.run_once {
                break;
            }
        }
    }

    /// Runs every task once, in configuration order.
    pub async fn run_round(&mut self) -> Result<RoundReport> {
        let mut report = RoundReport::default();

        for request in &self.tasks.collect {
            let outcome = self.pipeline.feed(request).await?;
            report.record(&outcome);
        }

        for source in &self.tasks.sources {
            let collected = self
                .pipeline
                .collect_and_enrich(&source.collect, &source.enrich)
                .await?;
            if let Some(fed) = &collected.feed {
                report.record(fed);
            }
            report.record(&collected.enrich);
        }

        for task in &self.tasks.enrich {
            let outcome = self.pipeline.enrich(task).await?;
            report.record(&outcome);
        }

        for index in &self.tasks.identities_cache {
            match self.pipeline.populate_identities_index(index).await {
                Ok(written) => report.identities_cached += written,
                Err(e) => warn!(index = %index, error = %e, "Identities cache not populated"),
            }
        }

        Ok(report)
    }
}
