// ABOUTME: Status events emitted by replication pipelines and their aggregation
// ABOUTME: Fans per-job events out to a progress sink and collects final records

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::job::{Job, JobState};

/// Snapshot of a job, emitted once per poll cycle and on completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    pub database_name: String,
    pub state: JobState,
    pub source_doc_count: u64,
    pub target_doc_count: u64,
    pub percent_complete: f64,
    pub doc_failures: u64,
    pub has_error: bool,
}

impl From<&Job> for StatusEvent {
    fn from(job: &Job) -> Self {
        Self {
            database_name: job.database_name.clone(),
            state: job.state,
            source_doc_count: job.source_doc_count,
            target_doc_count: job.target_doc_count,
            percent_complete: job.percent_complete,
            doc_failures: job.doc_failures,
            has_error: job.has_error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOutcome {
    Completed,
    /// A live replication left running on the store without being observed.
    Detached,
    Failed,
}

/// Final record for one database, reported exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub status: StatusEvent,
    pub job_id: Option<String>,
    pub outcome: JobOutcome,
    pub error: Option<String>,
    /// Set when copying the security document failed; does not change `outcome`.
    pub security_error: Option<String>,
}

impl JobRecord {
    pub fn from_job(job: &Job, outcome: JobOutcome) -> Self {
        Self {
            status: StatusEvent::from(job),
            job_id: Some(job.job_id.clone()),
            outcome,
            error: job.error_reason.clone(),
            security_error: None,
        }
    }

    /// Record for a database whose job could not even be built.
    pub fn unbuilt(database: &str, error: String) -> Self {
        Self {
            status: StatusEvent {
                database_name: database.to_string(),
                state: JobState::Error,
                source_doc_count: 0,
                target_doc_count: 0,
                percent_complete: 0.0,
                doc_failures: 0,
                has_error: true,
            },
            job_id: None,
            outcome: JobOutcome::Failed,
            error: Some(error),
            security_error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.outcome == JobOutcome::Failed
    }
}

#[derive(Debug, Clone)]
pub enum JobEvent {
    Status(StatusEvent),
    Finished(Box<JobRecord>),
}

pub type EventSender = mpsc::UnboundedSender<JobEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<JobEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Consumer of aggregated progress, e.g. a progress display or a silent counter.
pub trait ProgressSink: Send {
    fn on_status(&mut self, event: &StatusEvent);

    fn on_finished(&mut self, record: &JobRecord);

    fn on_run_complete(&mut self, _summary: &RunSummary) {}
}

/// All final records of one orchestration run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub records: Vec<JobRecord>,
}

impl RunSummary {
    pub fn completed(&self) -> usize {
        self.count(JobOutcome::Completed)
    }

    pub fn detached(&self) -> usize {
        self.count(JobOutcome::Detached)
    }

    pub fn failed(&self) -> usize {
        self.count(JobOutcome::Failed)
    }

    pub fn has_errors(&self) -> bool {
        self.records
            .iter()
            .any(|r| r.is_error() || r.security_error.is_some())
    }

    fn count(&self, outcome: JobOutcome) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }
}

/// Forwards job events to a sink until every expected job has finished.
pub struct Aggregator<S: ProgressSink> {
    sink: S,
    expected: usize,
}

impl<S: ProgressSink> Aggregator<S> {
    pub fn new(sink: S, expected: usize) -> Self {
        Self { sink, expected }
    }

    /// Drains `events`, returning once all jobs finalized or every sender is gone.
    pub async fn run(mut self, mut events: EventReceiver) -> (RunSummary, S) {
        let mut summary = RunSummary::default();

        while summary.records.len() < self.expected {
            let Some(event) = events.recv().await else {
                warn!(
                    finished = summary.records.len(),
                    expected = self.expected,
                    "Event stream closed before every job finished"
                );
                break;
            };

            match event {
                JobEvent::Status(status) => {
                    debug!(
                        database = %status.database_name,
                        state = %status.state,
                        percent = status.percent_complete,
                        "Job status"
                    );
                    self.sink.on_status(&status);
                }
                JobEvent::Finished(record) => {
                    info!(
                        database = %record.status.database_name,
                        outcome = ?record.outcome,
                        "Job finished"
                    );
                    self.sink.on_finished(&record);
                    summary.records.push(*record);
                }
            }
        }

        self.sink.on_run_complete(&summary);
        (summary, self.sink)
    }
}
