//! Orchestrator configuration.
//!
//! Defaults suit local development against the in-memory collaborators;
//! deployments override them through `STRATA_*` environment variables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::job::{EnvVar, JobKind};

/// Where a job of a given kind is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTarget {
    /// Cluster job queue.
    pub queue: String,
    /// Cluster job definition.
    pub definition: String,
}

impl JobTarget {
    fn for_kind(kind: JobKind) -> Self {
        let name = kind.as_str().replace('_', "-");
        Self {
            queue: format!("strata-{name}-queue"),
            definition: format!("strata-{name}"),
        }
    }
}

/// Connection settings handed to job containers.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConnection {
    /// Host name.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
}

impl std::fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl DatabaseConnection {
    fn local(user: &str) -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "geostore".to_string(),
            user: user.to_string(),
            password: String::new(),
        }
    }

    /// Returns the `PG*` variables the job scripts read.
    #[must_use]
    pub fn env(&self) -> Vec<EnvVar> {
        vec![
            EnvVar::new("PGHOST", &self.host),
            EnvVar::new("PGPORT", self.port.to_string()),
            EnvVar::new("PGDATABASE", &self.database),
            EnvVar::new("PGUSER", &self.user),
            EnvVar::new("PGPASSWORD", &self.password),
        ]
    }
}

/// Configuration of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Bucket holding source-derived files and raster tile sets.
    pub data_lake_bucket: String,
    /// Bucket holding rendered tiles.
    pub tile_cache_bucket: String,
    /// CDN distribution in front of the tile cache.
    pub cdn_distribution_id: String,
    /// Public base URL of the tile cache.
    pub tile_cache_url: String,
    /// Callback URL jobs report status to.
    pub status_url: String,
    /// Cluster region passed to jobs.
    pub region: String,
    /// Queue and definition per job kind.
    pub job_targets: BTreeMap<JobKind, JobTarget>,
    /// Most parents a cluster job may have.
    pub max_parents_per_job: usize,
    /// Most parallel load chains per vector import.
    pub max_load_queues: usize,
    /// Connection used by import and client jobs.
    pub writer: DatabaseConnection,
    /// Connection used by export jobs.
    pub reader: DatabaseConnection,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            data_lake_bucket: "strata-data-lake".to_string(),
            tile_cache_bucket: "strata-tile-cache".to_string(),
            cdn_distribution_id: "local".to_string(),
            tile_cache_url: "http://localhost:8088".to_string(),
            status_url: "http://localhost:8008/tasks".to_string(),
            region: "us-east-1".to_string(),
            job_targets: JobKind::ALL
                .into_iter()
                .map(|kind| (kind, JobTarget::for_kind(kind)))
                .collect(),
            max_parents_per_job: 20,
            max_load_queues: 16,
            writer: DatabaseConnection::local("strata_writer"),
            reader: DatabaseConnection::local("strata_reader"),
        }
    }
}

impl OrchestratorConfig {
    /// Loads configuration from `STRATA_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a variable is set but malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a variable is set but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let mut config = Self::default();

        if let Some(v) = env.string("STRATA_DATA_LAKE_BUCKET") {
            config.data_lake_bucket = v;
        }
        if let Some(v) = env.string("STRATA_TILE_CACHE_BUCKET") {
            config.tile_cache_bucket = v;
        }
        if let Some(v) = env.string("STRATA_CDN_DISTRIBUTION_ID") {
            config.cdn_distribution_id = v;
        }
        if let Some(v) = env.string("STRATA_TILE_CACHE_URL") {
            config.tile_cache_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = env.string("STRATA_STATUS_URL") {
            config.status_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = env.string("STRATA_REGION") {
            config.region = v;
        }

        for kind in JobKind::ALL {
            let upper = kind.as_str().to_ascii_uppercase();
            let target = config
                .job_targets
                .entry(kind)
                .or_insert_with(|| JobTarget::for_kind(kind));
            if let Some(v) = env.string(&format!("STRATA_{upper}_JOB_QUEUE")) {
                target.queue = v;
            }
            if let Some(v) = env.string(&format!("STRATA_{upper}_JOB_DEFINITION")) {
                target.definition = v;
            }
        }

        if let Some(v) = env.usize("STRATA_MAX_PARENTS_PER_JOB")? {
            config.max_parents_per_job = v;
        }
        if let Some(v) = env.usize("STRATA_MAX_LOAD_QUEUES")? {
            config.max_load_queues = v;
        }

        env.connection("WRITER", &mut config.writer)?;
        env.connection("READER", &mut config.reader)?;

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.max_parents_per_job == 0 {
            return Err(invalid("max_parents_per_job must be at least 1"));
        }
        if self.max_load_queues == 0 || self.max_load_queues > self.max_parents_per_job {
            return Err(invalid(
                "max_load_queues must be between 1 and max_parents_per_job",
            ));
        }
        Ok(())
    }

    /// Returns the queue and definition for a job kind.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the kind has no target.
    pub fn job_target(&self, kind: JobKind) -> Result<&JobTarget> {
        self.job_targets
            .get(&kind)
            .ok_or_else(|| invalid(format!("no job queue configured for {kind}")))
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidConfig {
        message: message.into(),
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name).and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    fn u16(&self, name: &str) -> Result<Option<u16>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        v.parse::<u16>()
            .map(Some)
            .map_err(|e| invalid(format!("{name} must be a u16: {e}")))
    }

    fn usize(&self, name: &str) -> Result<Option<usize>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        v.parse::<usize>()
            .map(Some)
            .map_err(|e| invalid(format!("{name} must be a usize: {e}")))
    }

    fn connection(&self, role: &str, connection: &mut DatabaseConnection) -> Result<()> {
        if let Some(v) = self.string(&format!("STRATA_DB_{role}_HOST")) {
            connection.host = v;
        }
        if let Some(v) = self.u16(&format!("STRATA_DB_{role}_PORT"))? {
            connection.port = v;
        }
        if let Some(v) = self.string(&format!("STRATA_DB_{role}_DATABASE")) {
            connection.database = v;
        }
        if let Some(v) = self.string(&format!("STRATA_DB_{role}_USER")) {
            connection.user = v;
        }
        if let Some(v) = self.string(&format!("STRATA_DB_{role}_PASSWORD")) {
            connection.password = v;
        }
        Ok(())
    }
}
