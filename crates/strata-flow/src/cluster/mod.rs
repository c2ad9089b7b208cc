//! Compute cluster abstraction.
//!
//! The cluster runs containerized jobs and enforces run-time ordering
//! through its own dependency mechanism: a submitted job lists the cluster
//! ids of the jobs it waits for. Strata only submits and reads back attempt
//! history; it never cancels.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use strata_core::TaskId;

use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::job::{EnvVar, Job, ResourceHints};

/// A job as handed to the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Job name.
    pub job_name: String,
    /// Cluster queue.
    pub queue: String,
    /// Cluster job definition.
    pub definition: String,
    /// Command line.
    pub command: Vec<String>,
    /// Environment variables.
    pub environment: Vec<EnvVar>,
    /// Cluster ids of jobs that must finish first.
    pub depends_on: Vec<TaskId>,
    /// Resource request.
    pub resources: ResourceHints,
    /// Retry budget.
    pub attempts: u32,
    /// Attempt timeout in seconds.
    pub attempt_duration_secs: u64,
}

impl SubmitRequest {
    /// Resolves a job against the configured queues.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the job kind has no queue.
    pub fn for_job(job: &Job, config: &OrchestratorConfig, depends_on: Vec<TaskId>) -> Result<Self> {
        let target = config.job_target(job.kind)?;
        Ok(Self {
            job_name: job.name.clone(),
            queue: target.queue.clone(),
            definition: target.definition.clone(),
            command: job.command.clone(),
            environment: job.environment.clone(),
            depends_on,
            resources: job.resources,
            attempts: job.attempts,
            attempt_duration_secs: job.attempt_duration_secs,
        })
    }
}

/// One finished attempt of a cluster job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobAttempt {
    /// Termination reason reported by the container runtime.
    pub reason: Option<String>,
    /// Container exit code.
    pub exit_code: Option<i32>,
}

impl JobAttempt {
    /// Creates an attempt record.
    #[must_use]
    pub fn new(reason: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            reason: Some(reason.into()),
            exit_code,
        }
    }
}

/// Job submission and attempt history.
#[async_trait]
pub trait ComputeCluster: Send + Sync {
    /// Submits a job and returns the cluster-assigned id.
    ///
    /// # Errors
    ///
    /// Returns a `Collaborator` error if the cluster rejects the job.
    async fn submit(&self, request: &SubmitRequest) -> Result<TaskId>;

    /// Returns the finished attempts of a job, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the job is unknown or the cluster is unreachable.
    async fn attempt_history(&self, task_id: &TaskId) -> Result<Vec<JobAttempt>>;
}
