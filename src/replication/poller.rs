// ABOUTME: Polls a submitted replication until the store reports a terminal state
// ABOUTME: Tracks target document counts and classifies store-reported failures

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::job::{Job, JobState};
use crate::error::MigratorError;
use crate::store::{ReplicationDocument, StoreClient};

/// Wait between two poll cycles of the same job.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How observation of a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The store reported `completed` with no document write failures.
    Completed,
    /// The store reported a failure, or success with write failures.
    Failed,
    /// Observation stopped by cancellation before a terminal state.
    Cancelled,
}

pub struct StatusPoller {
    store: Arc<dyn StoreClient>,
}

impl StatusPoller {
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self { store }
    }

    /// Runs one observation cycle, updating `job` from whatever could be fetched.
    pub async fn poll_once(&self, job: &mut Job) {
        let (doc, info) = tokio::join!(
            self.store.get_document(&job.control_url, &job.job_id),
            self.store.get_database_info(&job.target_url),
        );

        match doc {
            Ok(Some(raw)) => match serde_json::from_value::<ReplicationDocument>(raw) {
                Ok(doc) => apply_document(job, &doc),
                Err(e) => transient(job, format!("malformed replication document: {e}")),
            },
            Ok(None) => transient(job, "replication document not found".to_string()),
            Err(e) => transient(job, e.to_string()),
        }

        match info {
            Ok(info) => job.set_target_count(info.total()),
            Err(e) => transient(job, e.to_string()),
        }
    }

    /// Polls until a terminal state or cancellation, calling `callback` after every cycle.
    ///
    /// Live jobs never reach a terminal state on their own; they are observed until
    /// `cancel` fires.
    pub async fn poll_until_complete(
        &self,
        job: &mut Job,
        cancel: &CancellationToken,
        callback: impl Fn(&Job),
    ) -> PollOutcome {
        loop {
            self.poll_once(job).await;

            let outcome = classify(job);
            callback(job);
            if let Some(outcome) = outcome {
                return outcome;
            }

            tokio::select! {
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }
}

fn apply_document(job: &mut Job, doc: &ReplicationDocument) {
    if let Some(stats) = doc.stats {
        job.doc_failures = stats.doc_write_failures;
    }

    let Some(raw) = doc.state.as_deref() else {
        return;
    };
    let Some(state) = JobState::from_store(raw) else {
        debug!(database = %job.database_name, state = raw, "Ignoring unknown replication state");
        return;
    };
    if !job.advance(state) {
        return;
    }

    if matches!(state, JobState::Error | JobState::Failed) {
        let reason = match doc.state_reason.as_deref() {
            Some(reason) => format!("{state} - {reason}"),
            None => state.to_string(),
        };
        job.fail(reason);
    }
}

fn classify(job: &mut Job) -> Option<PollOutcome> {
    match job.state {
        JobState::Error | JobState::Failed => Some(PollOutcome::Failed),
        JobState::Completed if job.doc_failures > 0 => {
            let reason = format!("{} document write failures", job.doc_failures);
            job.fail(reason);
            // Reported as an error so sinks reading only the state see the failure.
            job.state = JobState::Error;
            Some(PollOutcome::Failed)
        }
        JobState::Completed => Some(PollOutcome::Completed),
        _ => None,
    }
}

fn transient(job: &Job, message: String) {
    let err = MigratorError::ObservationTransientFailure {
        database: job.database_name.clone(),
        message,
    };
    debug!(job_id = %job.job_id, error = %err, "No new information this cycle");
}
