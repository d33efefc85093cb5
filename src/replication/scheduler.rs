// ABOUTME: Bounded worker pool draining a queue of database names
// ABOUTME: Enforces the live-replication cap and never stops on a single job failure

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::events::{EventSender, JobEvent, JobRecord};
use super::pipeline::Pipeline;
use crate::error::{MigratorError, Result};

/// Hard ceiling on continuous replications started by one run.
pub const MAX_LIVE_REPLICATIONS: usize = 50;

/// Worker count for a run of `databases` jobs.
///
/// Live runs always use the live cap: continuous jobs are set up and left
/// running, so they should not queue behind a small caller-supplied limit.
pub fn effective_concurrency(requested: usize, live: bool, databases: usize) -> Result<usize> {
    if live && databases > MAX_LIVE_REPLICATIONS {
        return Err(MigratorError::TooManyLiveReplications {
            requested: databases,
            limit: MAX_LIVE_REPLICATIONS,
        });
    }
    if live {
        return Ok(MAX_LIVE_REPLICATIONS);
    }
    Ok(requested.max(1))
}

pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    concurrency: usize,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline, concurrency: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            concurrency: concurrency.max(1),
        }
    }

    /// Processes every name exactly once with at most `concurrency` pipelines in flight.
    ///
    /// Publishes one `Finished` event per name and returns once every worker exited.
    /// `events` is dropped on return, closing the stream for the aggregator.
    pub async fn run(&self, databases: Vec<String>, events: EventSender) -> usize {
        let total = databases.len();
        let workers = self.concurrency.min(total);
        let queue = Arc::new(Mutex::new(VecDeque::from(databases)));

        info!(databases = total, workers, "Starting replication workers");

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            let queue = queue.clone();
            let pipeline = self.pipeline.clone();
            let events = events.clone();
            pool.spawn(async move { drain(worker, queue, pipeline, events).await });
        }
        drop(events);

        let mut processed = 0;
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(count) => processed += count,
                Err(e) => error!(error = %e, "Replication worker aborted"),
            }
        }

        info!(processed, "All replication workers finished");
        processed
    }
}

async fn drain(
    worker: usize,
    queue: Arc<Mutex<VecDeque<String>>>,
    pipeline: Arc<Pipeline>,
    events: EventSender,
) -> usize {
    let mut processed = 0;
    loop {
        // Lock scope ends before the pipeline runs.
        let next = queue.lock().await.pop_front();
        let Some(database) = next else {
            break;
        };

        debug!(worker, database = %database, "Worker picked up database");
        let record = if pipeline.is_cancelled() {
            JobRecord::unbuilt(&database, "run cancelled before replication started".to_string())
        } else {
            pipeline.run(&database, &events).await
        };
        let _ = events.send(JobEvent::Finished(Box::new(record)));
        processed += 1;
    }
    processed
}
