// ABOUTME: Entry point for one orchestration run
// ABOUTME: Validates inputs, resolves names, prepares the control database, runs the pool

use futures::future::join;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::events::{self, Aggregator, ProgressSink, RunSummary};
use super::job::{control_url, is_reserved, JobOptions};
use super::pipeline::{Pipeline, PipelineSettings};
use super::registrar::Registrar;
use super::scheduler::{effective_concurrency, Scheduler};
use crate::config::{DatabaseSelection, RunConfig, RunPlan};
use crate::error::Result;
use crate::store::StoreClient;

pub struct Orchestrator {
    store: Arc<dyn StoreClient>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self::with_cancellation(store, CancellationToken::new())
    }

    /// Cancelling `cancel` stops observation; submitted replications keep running.
    pub fn with_cancellation(store: Arc<dyn StoreClient>, cancel: CancellationToken) -> Self {
        Self { store, cancel }
    }

    /// Names to enqueue for `plan`, with reserved system databases removed.
    pub async fn resolve_databases(&self, plan: &RunPlan) -> Result<Vec<String>> {
        let names = match &plan.selection {
            DatabaseSelection::Url(name) => vec![name.clone()],
            DatabaseSelection::List(names) => names.clone(),
            DatabaseSelection::All => self.store.list_databases(&plan.source).await?,
        };

        Ok(names.into_iter().filter(|name| !is_reserved(name)).collect())
    }

    /// Runs every job of `config` to a final record.
    ///
    /// Fails only on run-level problems; per-job failures are in the summary.
    pub async fn run<S: ProgressSink>(
        &self,
        config: &RunConfig,
        sink: S,
    ) -> Result<(RunSummary, S)> {
        let plan = config.validate()?;
        let databases = self.resolve_databases(&plan).await?;
        let concurrency = effective_concurrency(plan.concurrency, plan.live, databases.len())?;

        Registrar::new(self.store.clone())
            .ensure_control_database(&control_url(&plan.source)?)
            .await?;

        info!(
            databases = databases.len(),
            concurrency,
            live = plan.live,
            copy_security = plan.copy_security,
            "Starting replication run"
        );

        let settings = PipelineSettings {
            source: plan.source.clone(),
            target: plan.target.clone(),
            options: JobOptions {
                live: plan.live,
                urls_name_database: plan.urls_name_database(),
            },
            copy_security: plan.copy_security,
            monitor: plan.monitor,
        };
        let pipeline = Pipeline::new(self.store.clone(), settings, self.cancel.clone());
        let scheduler = Scheduler::new(pipeline, concurrency);

        let (tx, rx) = events::channel();
        let aggregator = Aggregator::new(sink, databases.len());
        let (_, (summary, sink)) = join(scheduler.run(databases, tx), aggregator.run(rx)).await;

        info!(
            completed = summary.completed(),
            detached = summary.detached(),
            failed = summary.failed(),
            "Replication run finished"
        );
        Ok((summary, sink))
    }
}
