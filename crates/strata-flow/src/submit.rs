//! Submits a job graph to the cluster and records one task per job.
//!
//! Jobs go out in topological order, so every parent already has a cluster
//! id when its children are submitted; run-time ordering is left to the
//! cluster's own dependency mechanism. The first failed submission aborts
//! the rest of the graph and fails the asset with a single entry.
//!
//! A job that reached the cluster but whose task could not be written is
//! retried a few times; if the write keeps failing, the failure entry names
//! the cluster id so the running job can be found and cancelled.

use std::collections::HashMap;

use tracing::{error, info, warn};

use strata_core::TaskId;

use crate::aggregator;
use crate::cascade::Outcome;
use crate::cluster::SubmitRequest;
use crate::context::FlowContext;
use crate::dag::JobGraph;
use crate::error::{Error, Result};
use crate::job::Job;
use crate::metrics::{FAILURE, SUCCESS, TimingGuard};
use crate::model::{Asset, ChangeLogEntry, Task};

/// Attempts made to record a task for a job the cluster accepted.
pub const TASK_WRITE_ATTEMPTS: usize = 3;

/// Result of a fully submitted graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Cluster ids by job name.
    pub task_ids: HashMap<String, TaskId>,
    /// Number of submitted jobs.
    pub submitted: u32,
}

/// Submits every job of `graph` on behalf of `asset`.
///
/// Tasks are recorded as they are submitted, so a partial failure leaves a
/// task for every job that reached the cluster.
///
/// # Errors
///
/// Returns `Submission` naming the first job that could not be submitted or
/// recorded; the asset has been marked failed by then.
pub async fn submit_graph(ctx: &FlowContext, asset: &Asset, graph: &JobGraph) -> Result<Submission> {
    let timer = TimingGuard::new(|d| ctx.metrics.observe_submission(FAILURE, d));
    let mut task_ids: HashMap<String, TaskId> = HashMap::with_capacity(graph.len());

    for job in graph.toposort()? {
        match submit_one(ctx, asset, job, &task_ids).await {
            Ok(task_id) => {
                ctx.metrics.record_job_submitted(job.kind.as_str(), SUCCESS);
                task_ids.insert(job.name.clone(), task_id);
            }
            Err(e) => {
                ctx.metrics.record_job_submitted(job.kind.as_str(), FAILURE);
                error!(
                    asset_id = %asset.asset_id,
                    job = %job.name,
                    submitted = task_ids.len(),
                    error = %e,
                    "job submission failed, aborting remaining jobs"
                );
                fail_asset(ctx, asset, &job.name, &e).await?;
                return Err(Error::Submission {
                    asset_id: asset.asset_id,
                    job_name: job.name.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    ctx.metrics.observe_submission(SUCCESS, timer.finish());
    let submitted = u32::try_from(task_ids.len())
        .map_err(|_| Error::invalid_options("job graph is too large"))?;
    info!(asset_id = %asset.asset_id, jobs = submitted, "job graph submitted");
    Ok(Submission {
        task_ids,
        submitted,
    })
}

async fn submit_one(
    ctx: &FlowContext,
    asset: &Asset,
    job: &Job,
    task_ids: &HashMap<String, TaskId>,
) -> Result<TaskId> {
    let depends_on = job
        .parents
        .iter()
        .map(|parent| {
            task_ids
                .get(parent)
                .cloned()
                .ok_or_else(|| Error::DagNodeNotFound {
                    node: parent.clone(),
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let request = SubmitRequest::for_job(job, &ctx.config, depends_on)?;
    let task_id = ctx.cluster.submit(&request).await?;

    let task = Task::new(
        task_id.clone(),
        asset.asset_id,
        ChangeLogEntry::pending(format!("Scheduled job {}", job.name)),
    );
    record_task(ctx, &task).await.map_err(|e| {
        Error::storage(format!(
            "cluster job {task_id} was submitted but its task could not be recorded: {e}"
        ))
    })?;
    Ok(task_id)
}

async fn record_task(ctx: &FlowContext, task: &Task) -> Result<()> {
    let mut attempt = 1;
    loop {
        match ctx.store.create_task(task).await {
            // A write that failed after landing shows up as a duplicate.
            Ok(()) | Err(Error::RecordAlreadyExists { .. }) => return Ok(()),
            Err(e) if attempt < TASK_WRITE_ATTEMPTS => {
                warn!(task_id = %task.task_id, attempt, error = %e, "task write failed, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn fail_asset(ctx: &FlowContext, asset: &Asset, job_name: &str, cause: &Error) -> Result<()> {
    let entry = ChangeLogEntry::failed(format!("Failed to submit job {job_name}"))
        .with_detail(cause.to_string());
    let outcome = Outcome::failed(asset, entry);
    let _guard = ctx.locks.lock(asset.asset_id).await?;
    aggregator::commit_outcome(ctx, asset, &outcome).await?;
    Ok(())
}
