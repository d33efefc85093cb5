//! In-memory StoreClient for orchestration tests.
//!
//! Databases are keyed by name (last path segment). Source and target are told
//! apart by host: anything on `source` is the source cluster.
//! Replication progress is scripted per database as a queue of poll responses;
//! the last response repeats once the queue is exhausted.

#![allow(dead_code)]

use async_trait::async_trait;
use couchreplicate::replication::{JobRecord, ProgressSink, RunSummary, StatusEvent};
use couchreplicate::store::{CreateDatabase, DatabaseInfo, StoreClient, StoreError, StoreResult};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use url::Url;

pub const SOURCE: &str = "http://alice:pw@source:5984";
pub const TARGET: &str = "http://target:5984";

/// One scripted poll: what the replication document and target info report.
#[derive(Debug, Clone)]
pub struct PollStep {
    pub doc: Option<Value>,
    pub target_count: Option<u64>,
}

impl PollStep {
    pub fn state(state: &str, target_count: u64) -> Self {
        Self {
            doc: Some(json!({ "_replication_state": state })),
            target_count: Some(target_count),
        }
    }

    pub fn doc(doc: Value, target_count: u64) -> Self {
        Self {
            doc: Some(doc),
            target_count: Some(target_count),
        }
    }

    /// Both fetches fail this cycle.
    pub fn unavailable() -> Self {
        Self {
            doc: None,
            target_count: None,
        }
    }
}

#[derive(Default)]
struct Inner {
    control_created: bool,
    create_calls: usize,
    fail_control: bool,
    all_databases: Vec<String>,
    source_counts: HashMap<String, u64>,
    scripts: HashMap<String, VecDeque<PollStep>>,
    current: HashMap<String, PollStep>,
    reject_submit: HashSet<String>,
    /// Replication doc id -> database name.
    submitted: HashMap<String, String>,
    submitted_docs: Vec<Value>,
    polls: HashMap<String, usize>,
    active: HashSet<String>,
    max_active: usize,
    source_security: HashMap<String, Value>,
    fail_security_write: bool,
    security_writes: Vec<(String, Value)>,
}

#[derive(Default)]
pub struct MockStore {
    inner: Mutex<Inner>,
}

fn database_of(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    urlencoding::decode(last).unwrap().into_owned()
}

fn is_source(url: &Url) -> bool {
    url.host_str() == Some("source")
}

fn http_error(url: &Url, status: u16, error: &str) -> StoreError {
    StoreError::Http {
        url: url.to_string(),
        status,
        error: error.to_string(),
        reason: None,
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(self, name: &str, source_count: u64, steps: Vec<PollStep>) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.source_counts.insert(name.to_string(), source_count);
            inner.scripts.insert(name.to_string(), steps.into());
            inner.all_databases.push(name.to_string());
        }
        self
    }

    /// A database that completes on the first poll.
    pub fn with_quick_database(self, name: &str, docs: u64) -> Self {
        self.with_database(name, docs, vec![PollStep::state("completed", docs)])
    }

    pub fn with_listed(self, name: &str) -> Self {
        self.inner.lock().unwrap().all_databases.push(name.to_string());
        self
    }

    pub fn rejecting_submit(self, name: &str) -> Self {
        self.inner.lock().unwrap().reject_submit.insert(name.to_string());
        self
    }

    pub fn failing_control_database(self) -> Self {
        self.inner.lock().unwrap().fail_control = true;
        self
    }

    pub fn with_source_security(self, name: &str, doc: Value) -> Self {
        self.inner
            .lock()
            .unwrap()
            .source_security
            .insert(name.to_string(), doc);
        self
    }

    pub fn failing_security_write(self) -> Self {
        self.inner.lock().unwrap().fail_security_write = true;
        self
    }

    pub fn create_calls(&self) -> usize {
        self.inner.lock().unwrap().create_calls
    }

    pub fn submitted_docs(&self) -> Vec<Value> {
        self.inner.lock().unwrap().submitted_docs.clone()
    }

    pub fn polls(&self, name: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .polls
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn max_active(&self) -> usize {
        self.inner.lock().unwrap().max_active
    }

    pub fn security_writes(&self) -> Vec<(String, Value)> {
        self.inner.lock().unwrap().security_writes.clone()
    }
}

impl Inner {
    /// Advances the script for `name` when its replication document is read.
    fn next_step(&mut self, name: &str) -> PollStep {
        let next = self.scripts.get_mut(name).and_then(|script| script.pop_front());
        let step = match next {
            Some(step) => step,
            None => self
                .current
                .get(name)
                .cloned()
                .unwrap_or_else(|| PollStep::state("completed", 0)),
        };
        self.current.insert(name.to_string(), step.clone());
        step
    }
}

#[async_trait]
impl StoreClient for MockStore {
    async fn create_database(&self, db_url: &Url) -> StoreResult<CreateDatabase> {
        let mut inner = self.inner.lock().unwrap();
        inner.create_calls += 1;
        if inner.fail_control {
            return Err(http_error(db_url, 401, "unauthorized"));
        }
        if inner.control_created {
            return Ok(CreateDatabase::AlreadyExists);
        }
        inner.control_created = true;
        Ok(CreateDatabase::Created)
    }

    async fn get_database_info(&self, db_url: &Url) -> StoreResult<DatabaseInfo> {
        let inner = self.inner.lock().unwrap();
        let name = database_of(db_url);

        if is_source(db_url) {
            return match inner.source_counts.get(&name) {
                Some(count) => Ok(DatabaseInfo {
                    doc_count: *count,
                    doc_del_count: 0,
                }),
                None => Err(http_error(db_url, 404, "not_found")),
            };
        }

        // Target info follows whatever the replication document last reported.
        match inner.current.get(&name).and_then(|step| step.target_count) {
            Some(count) => Ok(DatabaseInfo {
                doc_count: count,
                doc_del_count: 0,
            }),
            None => Err(http_error(db_url, 404, "not_found")),
        }
    }

    async fn list_databases(&self, _cluster_url: &Url) -> StoreResult<Vec<String>> {
        Ok(self.inner.lock().unwrap().all_databases.clone())
    }

    async fn insert_document(&self, db_url: &Url, doc: &Value) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let source = Url::parse(doc["source"].as_str().unwrap_or_default())
            .map_err(|_| http_error(db_url, 400, "bad_request"))?;
        let name = database_of(&source);

        if inner.reject_submit.contains(&name) {
            return Err(http_error(db_url, 403, "forbidden"));
        }

        let id = doc["_id"].as_str().unwrap_or_default().to_string();
        inner.submitted.insert(id, name.clone());
        inner.submitted_docs.push(doc.clone());
        inner.active.insert(name);
        inner.max_active = inner.max_active.max(inner.active.len());
        Ok(())
    }

    async fn get_document(&self, db_url: &Url, id: &str) -> StoreResult<Option<Value>> {
        let mut inner = self.inner.lock().unwrap();

        if id == "_security" {
            let name = database_of(db_url);
            return Ok(Some(
                inner
                    .source_security
                    .get(&name)
                    .cloned()
                    .unwrap_or_else(|| json!({})),
            ));
        }

        let Some(name) = inner.submitted.get(id).cloned() else {
            return Ok(None);
        };
        *inner.polls.entry(name.clone()).or_default() += 1;

        let step = inner.next_step(&name);
        let Some(doc) = step.doc else {
            return Err(http_error(db_url, 503, "service_unavailable"));
        };
        if matches!(
            doc["_replication_state"].as_str(),
            Some("completed" | "error" | "failed")
        ) {
            inner.active.remove(&name);
        }
        Ok(Some(doc))
    }

    async fn update_document(&self, db_url: &Url, id: &str, doc: &Value) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_security_write {
            return Err(http_error(db_url, 403, "forbidden"));
        }
        assert_eq!(id, "_security");
        inner
            .security_writes
            .push((database_of(db_url), doc.clone()));
        Ok(())
    }
}

/// Sink that keeps every event for assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub statuses: Vec<StatusEvent>,
    pub finished: Vec<JobRecord>,
    pub run_completed: bool,
}

impl RecordingSink {
    pub fn statuses_for(&self, name: &str) -> Vec<&StatusEvent> {
        self.statuses
            .iter()
            .filter(|s| s.database_name == name)
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn on_status(&mut self, event: &StatusEvent) {
        self.statuses.push(event.clone());
    }

    fn on_finished(&mut self, record: &JobRecord) {
        self.finished.push(record.clone());
    }

    fn on_run_complete(&mut self, _summary: &RunSummary) {
        self.run_completed = true;
    }
}
