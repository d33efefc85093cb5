// ABOUTME: Registers replication requests with the store's replicator
// ABOUTME: Ensures the control database exists and writes one request per job

use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use super::job::Job;
use crate::error::{MigratorError, Result};
use crate::store::{redact, CreateDatabase, ReplicationRequest, StoreClient};

pub struct Registrar {
    store: Arc<dyn StoreClient>,
}

impl Registrar {
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self { store }
    }

    /// Creates the control database if needed. Safe to call repeatedly and concurrently.
    pub async fn ensure_control_database(&self, control_url: &Url) -> Result<()> {
        match self.store.create_database(control_url).await {
            Ok(CreateDatabase::Created) => {
                info!(url = %redact(control_url), "Created control database");
                Ok(())
            }
            Ok(CreateDatabase::AlreadyExists) => {
                debug!(url = %redact(control_url), "Control database already exists");
                Ok(())
            }
            Err(source) => Err(MigratorError::ControlDatabase {
                url: redact(control_url),
                source,
            }),
        }
    }

    /// Reads the source database size so progress has a denominator.
    pub async fn record_source_count(&self, job: &mut Job) -> Result<()> {
        let info = self
            .store
            .get_database_info(&job.source_url)
            .await
            .map_err(|e| MigratorError::Registration {
                database: job.database_name.clone(),
                message: format!("cannot read source database: {}", e.reason()),
            })?;
        job.set_source_count(info.total());
        Ok(())
    }

    /// Writes the replication request document for `job` into the control database.
    pub async fn submit_job(&self, job: &Job) -> Result<()> {
        let request = ReplicationRequest {
            id: job.job_id.clone(),
            source: job.source_url.to_string(),
            target: job.target_url.to_string(),
            create_target: true,
            continuous: job.is_live,
        };
        let doc = serde_json::to_value(&request).map_err(|e| MigratorError::Registration {
            database: job.database_name.clone(),
            message: e.to_string(),
        })?;

        self.store
            .insert_document(&job.control_url, &doc)
            .await
            .map_err(|e| MigratorError::Registration {
                database: job.database_name.clone(),
                message: e.reason(),
            })?;

        info!(
            database = %job.database_name,
            job_id = %job.job_id,
            live = job.is_live,
            "Submitted replication request"
        );
        Ok(())
    }
}
