// ABOUTME: Job descriptor for a single database replication
// ABOUTME: Builds jobs from source/target URLs and tracks their observed state

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use url::Url;

use crate::error::{MigratorError, Result, UrlRole};
use crate::store::client::{child_url, cluster_root, split_credentials};

/// Name of the store-managed database that holds replication requests.
pub const CONTROL_DATABASE: &str = "_replicator";

/// Databases whose names start with this are internal to the store.
pub const RESERVED_PREFIX: char = '_';

/// Replication state as reported by the store's replicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    New,
    Triggered,
    Running,
    Completed,
    Error,
    Failed,
}

impl JobState {
    /// Maps a `_replication_state` value onto a job state.
    ///
    /// Scheduler-era states are folded in: `pending` waits like `triggered`,
    /// `crashing` is retried by the store like `running`.
    pub fn from_store(raw: &str) -> Option<Self> {
        match raw {
            "new" => Some(Self::New),
            "triggered" | "pending" => Some(Self::Triggered),
            "running" | "crashing" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Triggered => "triggered",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Failed => "failed",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::New => 0,
            Self::Triggered | Self::Running => 1,
            Self::Completed | Self::Error | Self::Failed => 2,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One database being migrated. Owned by exactly one pipeline stage at a time.
#[derive(Debug, Clone)]
pub struct Job {
    pub source_url: Url,
    pub target_url: Url,
    pub database_name: String,
    pub control_url: Url,
    pub job_id: String,
    pub state: JobState,
    pub source_doc_count: u64,
    pub target_doc_count: u64,
    pub doc_failures: u64,
    pub percent_complete: f64,
    pub is_live: bool,
    pub has_error: bool,
    pub error_reason: Option<String>,
}

impl Job {
    /// Moves the job to `next` unless that would go backwards or leave a terminal state.
    pub fn advance(&mut self, next: JobState) -> bool {
        if self.state.is_terminal() || next.rank() < self.state.rank() {
            return false;
        }
        self.state = next;
        true
    }

    pub fn set_source_count(&mut self, count: u64) {
        self.source_doc_count = count;
        self.recompute_percent();
    }

    pub fn set_target_count(&mut self, count: u64) {
        self.target_doc_count = count;
        self.recompute_percent();
    }

    /// Flags the job as failed, keeping the first reason recorded.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.has_error = true;
        if self.error_reason.is_none() {
            self.error_reason = Some(reason.into());
        }
    }

    // The source may change during migration, so this is not clamped or kept monotonic.
    fn recompute_percent(&mut self) {
        self.percent_complete = if self.source_doc_count > 0 {
            self.target_doc_count as f64 / self.source_doc_count as f64
        } else {
            0.0
        };
    }

    /// Username embedded in the source URL credentials, if any.
    pub fn source_username(&self) -> Option<String> {
        split_credentials(&self.source_url)
            .1
            .map(|(user, _)| user)
            .filter(|user| !user.is_empty())
    }
}

/// Per-run flags that shape how jobs are built.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobOptions {
    pub live: bool,
    /// The source and target URLs already address specific databases.
    pub urls_name_database: bool,
}

/// Parses a caller-supplied URL and checks it is absolute with a scheme and host.
pub fn parse_url(raw: &str, role: UrlRole) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| MigratorError::InvalidUrl {
        role,
        reason: e.to_string(),
    })?;
    validate_url(&url, role)?;
    Ok(url)
}

pub fn validate_url(url: &Url, role: UrlRole) -> Result<()> {
    if url.cannot_be_a_base() || url.scheme().is_empty() {
        return Err(MigratorError::InvalidUrl {
            role,
            reason: "URL must be absolute".to_string(),
        });
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(MigratorError::InvalidUrl {
            role,
            reason: "URL has no host".to_string(),
        }),
    }
}

/// Decoded database name carried in a URL path, if the path names one.
pub fn database_from_path(url: &Url) -> Option<String> {
    let path = url.path().trim_start_matches('/').trim_end_matches('/');
    if path.is_empty() {
        return None;
    }
    let name = urlencoding::decode(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string());
    Some(name)
}

/// Location of the control database on the source cluster.
pub fn control_url(source: &Url) -> Result<Url> {
    Ok(child_url(&cluster_root(source), CONTROL_DATABASE)?)
}

pub fn is_reserved(database: &str) -> bool {
    database.starts_with(RESERVED_PREFIX)
}

/// Builds a job in state `new` for `database`.
pub fn build_job(source: &Url, target: &Url, database: &str, options: JobOptions) -> Result<Job> {
    validate_url(source, UrlRole::Source)?;
    validate_url(target, UrlRole::Target)?;

    let (source_url, target_url) = if options.urls_name_database {
        (source.clone(), target.clone())
    } else {
        (child_url(source, database)?, child_url(target, database)?)
    };

    Ok(Job {
        control_url: control_url(source)?,
        source_url,
        target_url,
        database_name: database.to_string(),
        job_id: next_job_id(database),
        state: JobState::New,
        source_doc_count: 0,
        target_doc_count: 0,
        doc_failures: 0,
        percent_complete: 0.0,
        is_live: options.live,
        has_error: false,
        error_reason: None,
    })
}

static LAST_ID_MILLIS: AtomicI64 = AtomicI64::new(0);

/// `<alphanumeric name>_<millis>`, with the timestamp strictly increasing per process.
fn next_job_id(database: &str) -> String {
    let now = chrono::Utc::now().timestamp_millis();
    let mut stamp = now;
    let _ = LAST_ID_MILLIS.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        stamp = now.max(last + 1);
        Some(stamp)
    });

    let sanitized: String = database
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    format!("{sanitized}_{stamp}")
}
