// ABOUTME: Custom error types for the replicator
// ABOUTME: Separates run-level validation failures from per-job failures

use thiserror::Error;

use crate::store::StoreError;

/// Result type alias for orchestration operations.
pub type Result<T> = std::result::Result<T, MigratorError>;

/// Which side of the replication a URL belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlRole {
    Source,
    Target,
}

impl std::fmt::Display for UrlRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrlRole::Source => write!(f, "source"),
            UrlRole::Target => write!(f, "target"),
        }
    }
}

#[derive(Debug, Error)]
pub enum MigratorError {
    /// Malformed or incomplete source/target URL. Rejected before any job starts.
    #[error("invalid {role} URL: {reason}")]
    InvalidUrl { role: UrlRole, reason: String },

    /// Database names given in the URL path and via an explicit list or `--all`.
    #[error("database names supplied in URLs and as other command-line options")]
    AmbiguousDatabaseSelection,

    #[error("no source or target database names supplied")]
    NoDatabases,

    #[error("--nomonitor is only applicable with the --live option")]
    MonitorRequiresLive,

    #[error("maximum number of continuous replications is {limit}, {requested} requested")]
    TooManyLiveReplications { requested: usize, limit: usize },

    /// The shared control database could not be created. Blocks the whole run.
    #[error("failed to prepare control database {url}: {source}")]
    ControlDatabase {
        url: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to register replication for {database}: {message}")]
    Registration { database: String, message: String },

    /// A single poll cycle could not fetch fresh state. Retried on the next cycle.
    #[error("transient observation failure for {database}: {message}")]
    ObservationTransientFailure { database: String, message: String },

    #[error("replication of {database} failed: {reason}")]
    ReplicationFailed { database: String, reason: String },

    #[error("failed to copy security document for {database}: {message}")]
    SecurityMigration { database: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MigratorError {
    /// Errors raised before scheduling; these abort the run with no partial work.
    pub fn is_fatal_for_run(&self) -> bool {
        match self {
            Self::InvalidUrl { .. }
            | Self::AmbiguousDatabaseSelection
            | Self::NoDatabases
            | Self::MonitorRequiresLive
            | Self::TooManyLiveReplications { .. }
            | Self::ControlDatabase { .. }
            | Self::Store(_) => true,
            Self::Registration { .. }
            | Self::ObservationTransientFailure { .. }
            | Self::ReplicationFailed { .. }
            | Self::SecurityMigration { .. } => false,
        }
    }

    /// Process exit code reported by the command-line front end.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidUrl {
                role: UrlRole::Source,
                ..
            } => 1,
            Self::InvalidUrl {
                role: UrlRole::Target,
                ..
            } => 2,
            Self::MonitorRequiresLive => 3,
            Self::NoDatabases => 4,
            Self::AmbiguousDatabaseSelection => 5,
            _ => 6,
        }
    }
}
