// ABOUTME: Wire structures exchanged with the document store
// ABOUTME: Replication request/state documents, database info and error bodies

use serde::{Deserialize, Serialize};

/// Subset of `GET /{db}` used for progress accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    #[serde(default)]
    pub doc_count: u64,
    #[serde(default)]
    pub doc_del_count: u64,
}

impl DatabaseInfo {
    /// Live plus deleted documents; deletions are replicated too.
    pub fn total(&self) -> u64 {
        self.doc_count + self.doc_del_count
    }
}

/// Document written to the control database to start a replication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationRequest {
    #[serde(rename = "_id")]
    pub id: String,
    pub source: String,
    pub target: String,
    pub create_target: bool,
    pub continuous: bool,
}

/// The store-maintained view of a replication request document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplicationDocument {
    #[serde(rename = "_replication_state")]
    pub state: Option<String>,
    #[serde(rename = "_replication_state_reason")]
    pub state_reason: Option<String>,
    #[serde(rename = "_replication_stats")]
    pub stats: Option<ReplicationStats>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ReplicationStats {
    #[serde(default)]
    pub doc_write_failures: u64,
}

/// CouchDB error body, e.g. `{"error":"file_exists","reason":"..."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub reason: Option<String>,
}
