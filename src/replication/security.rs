// ABOUTME: Copies a database's _security document from source to target
// ABOUTME: Removes the source account's own grant before writing the copy

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::job::Job;
use crate::error::{MigratorError, Result};
use crate::store::StoreClient;

pub const SECURITY_DOCUMENT: &str = "_security";

/// Result of a security migration that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMigration {
    Copied,
    /// The source had no access-control entries; nothing was written.
    Skipped,
}

pub struct SecurityMigrator {
    store: Arc<dyn StoreClient>,
}

impl SecurityMigrator {
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self { store }
    }

    pub async fn migrate(&self, job: &Job) -> Result<SecurityMigration> {
        let error = |message: String| MigratorError::SecurityMigration {
            database: job.database_name.clone(),
            message,
        };

        let doc = self
            .store
            .get_document(&job.source_url, SECURITY_DOCUMENT)
            .await
            .map_err(|e| error(format!("cannot read source: {}", e.reason())))?;

        let Some(mut doc) = doc.filter(|d| !is_empty_document(d)) else {
            debug!(database = %job.database_name, "Source security document is empty");
            return Ok(SecurityMigration::Skipped);
        };

        if let Some(user) = job.source_username() {
            strip_user(&mut doc, &user);
        }

        self.store
            .update_document(&job.target_url, SECURITY_DOCUMENT, &doc)
            .await
            .map_err(|e| error(format!("cannot write target: {}", e.reason())))?;

        info!(database = %job.database_name, "Copied security document");
        Ok(SecurityMigration::Copied)
    }
}

fn is_empty_document(doc: &Value) -> bool {
    match doc {
        Value::Object(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

/// Drops `cloudant.<user>` so the target does not inherit the source account's grant.
fn strip_user(doc: &mut Value, user: &str) {
    if let Some(Value::Object(grants)) = doc.get_mut("cloudant") {
        grants.remove(user);
    }
}
