// ABOUTME: Replication orchestration module
// ABOUTME: Job building, registration, polling, security copy and scheduling

pub mod events;
pub mod job;
pub mod orchestrator;
pub mod pipeline;
pub mod poller;
pub mod registrar;
pub mod scheduler;
pub mod security;

pub use events::{
    Aggregator, JobEvent, JobOutcome, JobRecord, ProgressSink, RunSummary, StatusEvent,
};
pub use job::{build_job, Job, JobOptions, JobState};
pub use orchestrator::Orchestrator;
pub use poller::{PollOutcome, StatusPoller, POLL_INTERVAL};
pub use registrar::Registrar;
pub use scheduler::{effective_concurrency, Scheduler, MAX_LIVE_REPLICATIONS};
pub use security::{SecurityMigration, SecurityMigrator};
