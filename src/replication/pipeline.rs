// ABOUTME: Per-database pipeline: build, register, observe, copy security
// ABOUTME: Always ends in exactly one final record, whatever stage failed

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use url::Url;

use super::events::{EventSender, JobEvent, JobOutcome, JobRecord, StatusEvent};
use super::job::{build_job, Job, JobOptions, JobState};
use super::poller::{PollOutcome, StatusPoller};
use super::registrar::Registrar;
use super::security::SecurityMigrator;
use crate::store::StoreClient;

pub struct Pipeline {
    registrar: Registrar,
    poller: StatusPoller,
    security: Option<SecurityMigrator>,
    source: Url,
    target: Url,
    options: JobOptions,
    monitor: bool,
    cancel: CancellationToken,
}

/// Settings shared by every pipeline of one run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub source: Url,
    pub target: Url,
    pub options: JobOptions,
    pub copy_security: bool,
    /// When false, live jobs are left running right after submission.
    pub monitor: bool,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn StoreClient>,
        settings: PipelineSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registrar: Registrar::new(store.clone()),
            poller: StatusPoller::new(store.clone()),
            security: settings
                .copy_security
                .then(|| SecurityMigrator::new(store)),
            source: settings.source,
            target: settings.target,
            options: settings.options,
            monitor: settings.monitor,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Runs every stage for `database` and returns its final record.
    ///
    /// Status events are sent for each stage and poll cycle; the final record is
    /// left to the caller to publish.
    pub async fn run(&self, database: &str, events: &EventSender) -> JobRecord {
        let mut job = match build_job(&self.source, &self.target, database, self.options) {
            Ok(job) => job,
            Err(e) => return JobRecord::unbuilt(database, e.to_string()),
        };
        publish(events, &job);

        if let Err(e) = self.register(&mut job).await {
            warn!(database = %job.database_name, error = %e, "Registration failed");
            job.advance(JobState::Error);
            job.fail(e.to_string());
            publish(events, &job);
            return JobRecord::from_job(&job, JobOutcome::Failed);
        }
        publish(events, &job);

        let outcome = if job.is_live && !self.monitor {
            JobOutcome::Detached
        } else {
            let polled = self
                .poller
                .poll_until_complete(&mut job, &self.cancel, |job| publish(events, job))
                .await;
            match polled {
                PollOutcome::Completed => JobOutcome::Completed,
                PollOutcome::Failed => JobOutcome::Failed,
                // A live replication is meant to keep running; a one-shot one never finished.
                PollOutcome::Cancelled if job.is_live => JobOutcome::Detached,
                PollOutcome::Cancelled => {
                    job.fail("observation interrupted before the replication finished");
                    publish(events, &job);
                    JobOutcome::Failed
                }
            }
        };

        if outcome == JobOutcome::Failed {
            warn!(
                database = %job.database_name,
                reason = job.error_reason.as_deref().unwrap_or("unknown"),
                "Replication failed"
            );
        }

        let mut record = JobRecord::from_job(&job, outcome);
        if let (Some(security), false) = (&self.security, record.is_error()) {
            if let Err(e) = security.migrate(&job).await {
                warn!(database = %job.database_name, error = %e, "Security copy failed");
                record.security_error = Some(e.to_string());
            }
        }
        record
    }

    async fn register(&self, job: &mut Job) -> crate::error::Result<()> {
        self.registrar.record_source_count(job).await?;
        self.registrar.submit_job(job).await
    }
}

fn publish(events: &EventSender, job: &Job) {
    // A closed channel means nobody is listening any more; the pipeline still finishes.
    let _ = events.send(JobEvent::Status(StatusEvent::from(job)));
}
