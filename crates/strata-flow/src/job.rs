//! Job model: one unit of external compute work, not yet submitted.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Container image family a job runs in.
///
/// The kind fixes queue, job definition and default resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// `psql` client scripts against the database.
    DatabaseClient,
    /// GDAL imports into the database.
    GdalImport,
    /// GDAL exports out of the database.
    GdalExport,
    /// Vector tile rendering.
    TileCache,
    /// Raster processing.
    RasterProcessing,
}

impl JobKind {
    /// All kinds, in a stable order.
    pub const ALL: [Self; 5] = [
        Self::DatabaseClient,
        Self::GdalImport,
        Self::GdalExport,
        Self::TileCache,
        Self::RasterProcessing,
    ];

    /// Returns the snake case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DatabaseClient => "database_client",
            Self::GdalImport => "gdal_import",
            Self::GdalExport => "gdal_export",
            Self::TileCache => "tile_cache",
            Self::RasterProcessing => "raster_processing",
        }
    }

    /// Default resource request.
    #[must_use]
    pub const fn default_resources(self) -> ResourceHints {
        match self {
            Self::DatabaseClient => ResourceHints::new(1, 1_500),
            Self::GdalImport | Self::GdalExport => ResourceHints::new(1, 2_500),
            Self::TileCache => ResourceHints::new(48, 96_000),
            Self::RasterProcessing => ResourceHints::new(48, 350_000),
        }
    }

    /// Default number of attempts the cluster makes.
    #[must_use]
    pub const fn default_attempts(self) -> u32 {
        match self {
            Self::RasterProcessing => 2,
            _ => 1,
        }
    }

    /// Default attempt timeout in seconds.
    #[must_use]
    pub const fn default_attempt_duration_secs(self) -> u64 {
        match self {
            Self::DatabaseClient | Self::GdalImport | Self::GdalExport => 7_500,
            Self::TileCache => 3_600,
            Self::RasterProcessing => 9_600,
        }
    }

    /// Whether the job gets reader (instead of writer) database credentials.
    #[must_use]
    pub const fn reads_only(self) -> bool {
        matches!(self, Self::GdalExport | Self::TileCache)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU and memory request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHints {
    /// Virtual CPUs.
    pub vcpus: u32,
    /// Memory in MiB.
    pub memory_mib: u32,
}

impl ResourceHints {
    /// Creates a resource request.
    #[must_use]
    pub const fn new(vcpus: u32, memory_mib: u32) -> Self {
        Self { vcpus, memory_mib }
    }
}

/// Environment variable passed to a job container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvVar {
    /// Variable name.
    pub name: String,
    /// Variable value.
    pub value: String,
}

impl EnvVar {
    /// Creates an environment variable.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A unit of work in an asset pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Name, unique within its graph.
    pub name: String,
    /// Container family.
    pub kind: JobKind,
    /// Command line.
    pub command: Vec<String>,
    /// Environment variables.
    pub environment: Vec<EnvVar>,
    /// Names of jobs this one depends on.
    pub parents: Vec<String>,
    /// Resource request.
    pub resources: ResourceHints,
    /// Retry budget.
    pub attempts: u32,
    /// Attempt timeout in seconds.
    pub attempt_duration_secs: u64,
}

impl Job {
    /// Creates a job with the defaults of its kind and no parents.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: JobKind, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            command,
            environment: Vec::new(),
            parents: Vec::new(),
            resources: kind.default_resources(),
            attempts: kind.default_attempts(),
            attempt_duration_secs: kind.default_attempt_duration_secs(),
        }
    }

    /// Sets the parents.
    #[must_use]
    pub fn with_parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents = parents.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the environment.
    #[must_use]
    pub fn with_environment(mut self, environment: Vec<EnvVar>) -> Self {
        self.environment = environment;
        self
    }

    /// Overrides the attempt timeout when `timeout` is set.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<u64>) -> Self {
        if let Some(secs) = timeout {
            self.attempt_duration_secs = secs;
        }
        self
    }

    /// Overrides the resource request.
    #[must_use]
    pub const fn with_resources(mut self, resources: ResourceHints) -> Self {
        self.resources = resources;
        self
    }
}

/// Builds a command line from string-like parts.
#[must_use]
pub fn command<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_defaults() {
        let job = Job::new("create_vector_schema", JobKind::GdalImport, command(["x.sh"]));
        assert_eq!(job.resources, ResourceHints::new(1, 2_500));
        assert_eq!(job.attempts, 1);
        assert_eq!(job.attempt_duration_secs, 7_500);

        assert_eq!(JobKind::RasterProcessing.default_attempts(), 2);
        assert_eq!(JobKind::TileCache.default_resources().vcpus, 48);
    }

    #[test]
    fn timeout_override_is_optional() {
        let job = Job::new("load", JobKind::GdalImport, Vec::new()).with_timeout(None);
        assert_eq!(job.attempt_duration_secs, 7_500);
        let job = job.with_timeout(Some(600));
        assert_eq!(job.attempt_duration_secs, 600);
    }

    #[test]
    fn parents_builder() {
        let job = Job::new("add_gfw_fields", JobKind::DatabaseClient, Vec::new())
            .with_parents(["load_vector_data_layer_0", "load_vector_data_layer_1"]);
        assert_eq!(job.parents.len(), 2);
    }
}
