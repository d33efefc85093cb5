//! Security document copying after replication.

mod common;

use common::{MockStore, PollStep, RecordingSink, SOURCE, TARGET};
use couchreplicate::replication::{
    build_job, JobOptions, JobOutcome, SecurityMigration, SecurityMigrator,
};
use couchreplicate::{Orchestrator, RunConfig};
use serde_json::json;
use std::sync::Arc;
use url::Url;

fn config(databases: &[&str]) -> RunConfig {
    RunConfig {
        source: SOURCE.to_string(),
        target: TARGET.to_string(),
        databases: databases.iter().map(|d| d.to_string()).collect(),
        copy_security: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_empty_security_document_is_skipped() {
    let store = Arc::new(MockStore::new().with_source_security("orders", json!({})));
    let job = build_job(
        &Url::parse(SOURCE).unwrap(),
        &Url::parse(TARGET).unwrap(),
        "orders",
        JobOptions::default(),
    )
    .unwrap();

    let outcome = SecurityMigrator::new(store.clone())
        .migrate(&job)
        .await
        .unwrap();

    assert_eq!(outcome, SecurityMigration::Skipped);
    assert!(store.security_writes().is_empty());
}

#[tokio::test]
async fn test_source_account_is_stripped() {
    let store = Arc::new(MockStore::new().with_source_security(
        "orders",
        json!({
            "cloudant": {
                "alice": ["_reader", "_writer", "_admin", "_replicator"],
                "bob": ["_reader"]
            }
        }),
    ));
    let job = build_job(
        &Url::parse(SOURCE).unwrap(),
        &Url::parse(TARGET).unwrap(),
        "orders",
        JobOptions::default(),
    )
    .unwrap();

    let outcome = SecurityMigrator::new(store.clone())
        .migrate(&job)
        .await
        .unwrap();

    assert_eq!(outcome, SecurityMigration::Copied);
    let writes = store.security_writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, "orders");
    assert_eq!(writes[0].1, json!({"cloudant": {"bob": ["_reader"]}}));
}

#[tokio::test(start_paused = true)]
async fn test_security_copied_after_successful_replication() {
    let store = Arc::new(
        MockStore::new()
            .with_quick_database("orders", 2)
            .with_source_security("orders", json!({"cloudant": {"bob": ["_reader"]}})),
    );

    let (summary, _) = Orchestrator::new(store.clone())
        .run(&config(&["orders"]), RecordingSink::default())
        .await
        .unwrap();

    assert_eq!(summary.completed(), 1);
    assert!(summary.records[0].security_error.is_none());
    assert_eq!(store.security_writes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_security_skipped_after_failed_replication() {
    let store = Arc::new(
        MockStore::new()
            .with_database("orders", 2, vec![PollStep::state("error", 0)])
            .with_source_security("orders", json!({"cloudant": {"bob": ["_reader"]}})),
    );

    let (summary, _) = Orchestrator::new(store.clone())
        .run(&config(&["orders"]), RecordingSink::default())
        .await
        .unwrap();

    assert_eq!(summary.failed(), 1);
    assert!(store.security_writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_security_failure_keeps_replication_outcome() {
    let store = Arc::new(
        MockStore::new()
            .with_quick_database("orders", 2)
            .with_source_security("orders", json!({"cloudant": {"bob": ["_reader"]}}))
            .failing_security_write(),
    );

    let (summary, _) = Orchestrator::new(store)
        .run(&config(&["orders"]), RecordingSink::default())
        .await
        .unwrap();

    let record = &summary.records[0];
    assert_eq!(record.outcome, JobOutcome::Completed);
    assert!(record
        .security_error
        .as_deref()
        .unwrap()
        .contains("forbidden"));
    assert!(summary.has_errors());
}
