//! In-memory compute cluster for testing.
//!
//! Records every submission, hands out ULID job ids and lets tests inject
//! submission failures by job name and attempt histories by job id.
//!
//! ## Limitations
//!
//! - **Nothing runs**: jobs are recorded, never executed
//! - **Single-process only**

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use ulid::Ulid;

use strata_core::TaskId;

use super::{ComputeCluster, JobAttempt, SubmitRequest};
use crate::error::{Error, Result};

/// A recorded submission.
#[derive(Debug, Clone)]
pub struct SubmittedJob {
    /// Id handed back to the caller.
    pub task_id: TaskId,
    /// The request as submitted.
    pub request: SubmitRequest,
}

#[derive(Debug, Default)]
struct ClusterState {
    submitted: Vec<SubmittedJob>,
    histories: HashMap<TaskId, Vec<JobAttempt>>,
    failing_jobs: HashSet<String>,
}

/// In-memory cluster for testing.
///
/// ## Example
///
/// ```rust
/// use strata_flow::cluster::memory::InMemoryCluster;
///
/// let cluster = InMemoryCluster::new();
/// cluster.fail_job("add_gfw_fields").unwrap();
/// ```
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    state: RwLock<ClusterState>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("cluster lock poisoned")
}

impl InMemoryCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later submission of `job_name` fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn fail_job(&self, job_name: impl Into<String>) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.failing_jobs.insert(job_name.into());
        Ok(())
    }

    /// Sets the attempt history returned for a job id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn set_history(&self, task_id: &TaskId, attempts: Vec<JobAttempt>) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.histories.insert(task_id.clone(), attempts);
        Ok(())
    }

    /// Returns all submissions in submission order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn submitted(&self) -> Result<Vec<SubmittedJob>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.submitted.clone())
    }

    /// Returns the id assigned to the most recent submission of `job_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn task_id_of(&self, job_name: &str) -> Result<Option<TaskId>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .submitted
            .iter()
            .rev()
            .find(|job| job.request.job_name == job_name)
            .map(|job| job.task_id.clone()))
    }
}

#[async_trait]
impl ComputeCluster for InMemoryCluster {
    async fn submit(&self, request: &SubmitRequest) -> Result<TaskId> {
        let mut state = self.state.write().map_err(poison_err)?;

        if state.failing_jobs.contains(&request.job_name) {
            return Err(Error::collaborator(
                "cluster",
                format!("job {} rejected", request.job_name),
            ));
        }
        // Same contract as a real cluster: dependencies must already exist.
        for dependency in &request.depends_on {
            if !state.submitted.iter().any(|job| &job.task_id == dependency) {
                return Err(Error::collaborator(
                    "cluster",
                    format!(
                        "job {} depends on unknown job {dependency}",
                        request.job_name
                    ),
                ));
            }
        }

        let task_id = TaskId::new(Ulid::new().to_string())?;
        state.submitted.push(SubmittedJob {
            task_id: task_id.clone(),
            request: request.clone(),
        });
        drop(state);
        Ok(task_id)
    }

    async fn attempt_history(&self, task_id: &TaskId) -> Result<Vec<JobAttempt>> {
        let state = self.state.read().map_err(poison_err)?;
        if let Some(history) = state.histories.get(task_id) {
            return Ok(history.clone());
        }
        if state.submitted.iter().any(|job| &job.task_id == task_id) {
            return Ok(Vec::new());
        }
        Err(Error::task_not_found(task_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::job::{Job, JobKind};

    fn request(name: &str, depends_on: Vec<TaskId>) -> SubmitRequest {
        let job = Job::new(name, JobKind::DatabaseClient, Vec::new());
        SubmitRequest::for_job(&job, &OrchestratorConfig::default(), depends_on).unwrap()
    }

    #[tokio::test]
    async fn submit_records_jobs() {
        let cluster = InMemoryCluster::new();
        let schema = cluster.submit(&request("schema", Vec::new())).await.unwrap();
        cluster
            .submit(&request("load", vec![schema.clone()]))
            .await
            .unwrap();

        let submitted = cluster.submitted().unwrap();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[1].request.depends_on, vec![schema.clone()]);
        assert_eq!(cluster.task_id_of("schema").unwrap(), Some(schema));
    }

    #[tokio::test]
    async fn unknown_dependency_is_rejected() {
        let cluster = InMemoryCluster::new();
        let missing = TaskId::new("nope").unwrap();
        let err = cluster
            .submit(&request("load", vec![missing]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Collaborator { .. }));
    }

    #[tokio::test]
    async fn failure_injection_and_history() {
        let cluster = InMemoryCluster::new();
        cluster.fail_job("load").unwrap();
        assert!(cluster.submit(&request("load", Vec::new())).await.is_err());

        let id = cluster.submit(&request("index", Vec::new())).await.unwrap();
        assert!(cluster.attempt_history(&id).await.unwrap().is_empty());
        cluster
            .set_history(&id, vec![JobAttempt::new("Essential container exited", Some(1))])
            .unwrap();
        assert_eq!(cluster.attempt_history(&id).await.unwrap().len(), 1);

        let unknown = TaskId::new("unknown").unwrap();
        assert!(cluster.attempt_history(&unknown).await.is_err());
    }
}
