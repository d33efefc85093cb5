// ABOUTME: Run-level configuration and its validation
// ABOUTME: Resolves where database names come from before any job is scheduled

use url::Url;

use crate::error::{MigratorError, Result, UrlRole};
use crate::replication::job::{database_from_path, parse_url};
use crate::store::client::child_url;

/// Inputs for one orchestration run, as supplied by the command line.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source: String,
    pub target: String,
    pub databases: Vec<String>,
    pub all: bool,
    pub concurrency: usize,
    pub live: bool,
    pub copy_security: bool,
    pub quiet: bool,
    /// Observe jobs after submission. Only `false` together with `live`.
    pub monitor: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            target: String::new(),
            databases: Vec::new(),
            all: false,
            concurrency: 1,
            live: false,
            copy_security: false,
            quiet: false,
            monitor: true,
        }
    }
}

/// Where the names of the databases to replicate come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseSelection {
    /// The source and target URLs address one database each.
    Url(String),
    List(Vec<String>),
    /// Every database on the source cluster.
    All,
}

/// A validated run: URLs parsed and the database selection unambiguous.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub source: Url,
    pub target: Url,
    pub selection: DatabaseSelection,
    pub concurrency: usize,
    pub live: bool,
    pub copy_security: bool,
    pub monitor: bool,
}

impl RunConfig {
    /// Performs every run-level check, in the order the exit codes are numbered.
    pub fn validate(&self) -> Result<RunPlan> {
        let source = parse_url(&self.source, UrlRole::Source)?;
        let mut target = parse_url(&self.target, UrlRole::Target)?;

        if !self.monitor && !self.live {
            return Err(MigratorError::MonitorRequiresLive);
        }

        let listed: Vec<String> = self
            .databases
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        let source_name = database_from_path(&source);
        let target_name = database_from_path(&target);
        let named_in_urls = source_name.is_some() || target_name.is_some();

        if named_in_urls && (!listed.is_empty() || self.all) {
            return Err(MigratorError::AmbiguousDatabaseSelection);
        }

        let selection = match (source_name, target_name) {
            (Some(name), Some(_)) => DatabaseSelection::Url(name),
            (Some(name), None) => {
                target = child_url(&target, &name)?;
                DatabaseSelection::Url(name)
            }
            (None, Some(_)) => {
                return Err(MigratorError::InvalidUrl {
                    role: UrlRole::Source,
                    reason: "source URL must name a database when the target URL does".to_string(),
                })
            }
            (None, None) if !listed.is_empty() => DatabaseSelection::List(listed),
            (None, None) if self.all => DatabaseSelection::All,
            (None, None) => return Err(MigratorError::NoDatabases),
        };

        Ok(RunPlan {
            source,
            target,
            selection,
            concurrency: self.concurrency,
            live: self.live,
            copy_security: self.copy_security,
            monitor: self.monitor,
        })
    }
}

impl RunPlan {
    pub fn urls_name_database(&self) -> bool {
        matches!(self.selection, DatabaseSelection::Url(_))
    }
}
