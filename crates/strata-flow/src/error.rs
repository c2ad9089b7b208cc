//! Error types for the orchestration domain.
//!
//! Variants map one-to-one onto the status codes the route layer returns,
//! see [`Error::status_code`].

use strata_core::{AssetId, TaskId};

/// The result type used throughout strata-flow.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in orchestration operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An entity (dataset, version, asset or task) does not exist.
    #[error("{entity} not found: {key}")]
    RecordNotFound {
        /// Kind of entity that was looked up.
        entity: &'static str,
        /// The key that was looked up.
        key: String,
    },

    /// An entity with the same key already exists (duplicate asset URI, version name...).
    #[error("{entity} already exists: {key}")]
    RecordAlreadyExists {
        /// Kind of entity.
        entity: &'static str,
        /// The conflicting key.
        key: String,
    },

    /// The source type has no job template.
    #[error("unsupported source type: {source_type}")]
    UnsupportedSourceType {
        /// The source type that was requested.
        source_type: String,
    },

    /// The operation exists conceptually but has no implementation for this asset type.
    #[error("not implemented: {message}")]
    NotImplemented {
        /// What is not implemented.
        message: String,
    },

    /// An entity invariant would be violated by the operation.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the violated invariant.
        message: String,
    },

    /// The request itself is malformed.
    #[error("bad request: {message}")]
    BadRequest {
        /// What is wrong with the request.
        message: String,
    },

    /// Creation options failed validation at the DAG builder boundary.
    #[error("invalid creation options: {message}")]
    InvalidCreationOptions {
        /// Description of the validation failure.
        message: String,
    },

    /// A configuration value is missing or malformed.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration problem.
        message: String,
    },

    /// A cycle was detected in the job graph.
    #[error("cycle detected in job graph: {cycle:?}")]
    CycleDetected {
        /// Job names participating in the cycle.
        cycle: Vec<String>,
    },

    /// A job references a parent that is not part of the graph.
    #[error("job graph node not found: {node}")]
    DagNodeNotFound {
        /// The missing node (job name or index).
        node: String,
    },

    /// Submitting a job to the compute cluster failed.
    #[error("failed to submit job {job_name} for asset {asset_id}: {message}")]
    Submission {
        /// Asset whose pipeline was being submitted.
        asset_id: AssetId,
        /// Job that failed to submit.
        job_name: String,
        /// Description of the failure.
        message: String,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An external collaborator (cluster, object store, CDN, database) failed.
    #[error("{collaborator} error: {message}")]
    Collaborator {
        /// Which collaborator failed.
        collaborator: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// An error from strata-core.
    #[error("core error: {0}")]
    Core(#[from] strata_core::Error),
}

impl Error {
    /// Creates a record-not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, key: impl std::fmt::Display) -> Self {
        Self::RecordNotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Creates a record-already-exists error.
    #[must_use]
    pub fn already_exists(entity: &'static str, key: impl std::fmt::Display) -> Self {
        Self::RecordAlreadyExists {
            entity,
            key: key.to_string(),
        }
    }

    /// Creates a task-not-found error.
    #[must_use]
    pub fn task_not_found(task_id: &TaskId) -> Self {
        Self::not_found("task", task_id)
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a not-implemented error.
    #[must_use]
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::NotImplemented {
            message: message.into(),
        }
    }

    /// Creates an invalid creation options error.
    #[must_use]
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::InvalidCreationOptions {
            message: message.into(),
        }
    }

    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a collaborator error.
    #[must_use]
    pub fn collaborator(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator,
            message: message.into(),
        }
    }

    /// Returns the HTTP-equivalent status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::RecordNotFound { .. } => 404,
            Self::RecordAlreadyExists { .. }
            | Self::BadRequest { .. }
            | Self::InvalidCreationOptions { .. }
            | Self::Core(_) => 400,
            Self::Conflict { .. } => 409,
            Self::UnsupportedSourceType { .. } | Self::NotImplemented { .. } => 501,
            Self::InvalidConfig { .. }
            | Self::CycleDetected { .. }
            | Self::DagNodeNotFound { .. }
            | Self::Submission { .. }
            | Self::Storage { .. }
            | Self::Collaborator { .. } => 500,
        }
    }
}
