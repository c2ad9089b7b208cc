//! Resource backoff for resubmitted jobs.
//!
//! Every prior attempt that died of memory exhaustion halves the requested
//! core or process count, rounding up, with a floor of 1. The calculation is
//! a pure function of the attempt history, so repeated calls against the same
//! history agree.

use std::sync::Arc;

use tracing::info;

use strata_core::TaskId;

use crate::cluster::{ComputeCluster, JobAttempt};
use crate::error::Result;

/// Termination reason the container runtime reports for memory exhaustion.
pub const OOM_REASON: &str = "OutOfMemoryError: Container killed due to memory usage";

/// Exit code of a process killed by the kernel OOM killer.
pub const OOM_EXIT_CODE: i32 = 137;

/// Which attempt signals count as out-of-memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OomSignal {
    /// Only the runtime's termination reason.
    Reason,
    /// The termination reason or exit code 137.
    ReasonOrExitCode,
}

impl OomSignal {
    /// Returns true if the attempt ran out of memory.
    #[must_use]
    pub fn matches(self, attempt: &JobAttempt) -> bool {
        let by_reason = attempt
            .reason
            .as_deref()
            .is_some_and(|reason| reason.starts_with(OOM_REASON));
        match self {
            Self::Reason => by_reason,
            Self::ReasonOrExitCode => by_reason || attempt.exit_code == Some(OOM_EXIT_CODE),
        }
    }
}

/// Halves `current` once per out-of-memory attempt, floor 1.
#[must_use]
pub fn halve_for_oom(current: u32, history: &[JobAttempt], signal: OomSignal) -> u32 {
    history
        .iter()
        .filter(|attempt| signal.matches(attempt))
        .fold(current, |value, _| value.div_ceil(2))
        .max(1)
}

/// New core count for a job about to be retried.
///
/// ```rust
/// use strata_flow::backoff::{OOM_REASON, calc_new_cores};
/// use strata_flow::cluster::JobAttempt;
///
/// let oom = JobAttempt::new(OOM_REASON, None);
/// let other = JobAttempt::new("Essential container in task exited", Some(1));
/// let history = [oom.clone(), other, oom];
/// assert_eq!(calc_new_cores(96, &history), 24);
/// assert_eq!(calc_new_cores(5, &history), 2);
/// assert_eq!(calc_new_cores(0, &history), 1);
/// ```
#[must_use]
pub fn calc_new_cores(current: u32, history: &[JobAttempt]) -> u32 {
    halve_for_oom(current, history, OomSignal::Reason)
}

/// New process count for a job about to be retried.
///
/// Also treats exit code 137 as memory exhaustion.
#[must_use]
pub fn calc_num_processes(current: u32, history: &[JobAttempt]) -> u32 {
    halve_for_oom(current, history, OomSignal::ReasonOrExitCode)
}

/// Reads attempt history from the cluster and applies the backoff rule.
#[derive(Clone)]
pub struct ResourceBackoff {
    cluster: Arc<dyn ComputeCluster>,
    signal: OomSignal,
}

impl std::fmt::Debug for ResourceBackoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceBackoff")
            .field("signal", &self.signal)
            .finish_non_exhaustive()
    }
}

impl ResourceBackoff {
    /// Backoff on core counts.
    #[must_use]
    pub fn for_cores(cluster: Arc<dyn ComputeCluster>) -> Self {
        Self {
            cluster,
            signal: OomSignal::Reason,
        }
    }

    /// Backoff on process counts.
    #[must_use]
    pub fn for_processes(cluster: Arc<dyn ComputeCluster>) -> Self {
        Self {
            cluster,
            signal: OomSignal::ReasonOrExitCode,
        }
    }

    /// Returns the value to request when resubmitting `task_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt history cannot be read.
    pub async fn next_value(&self, task_id: &TaskId, current: u32) -> Result<u32> {
        let history = self.cluster.attempt_history(task_id).await?;
        let next = halve_for_oom(current, &history, self.signal);
        if next != current {
            info!(
                task_id = %task_id,
                from = current,
                to = next,
                attempts = history.len(),
                "reducing resources after out-of-memory attempts"
            );
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::memory::InMemoryCluster;
    use crate::cluster::SubmitRequest;
    use crate::config::OrchestratorConfig;
    use crate::job::{Job, JobKind};

    fn oom() -> JobAttempt {
        JobAttempt::new(OOM_REASON, None)
    }

    fn killed() -> JobAttempt {
        JobAttempt::new("Essential container in task exited", Some(OOM_EXIT_CODE))
    }

    fn other() -> JobAttempt {
        JobAttempt::new("Essential container in task exited", Some(1))
    }

    #[test]
    fn cores_halve_per_oom_attempt() {
        let history = [oom(), other(), oom()];
        assert_eq!(calc_new_cores(96, &history), 24);
        assert_eq!(calc_new_cores(5, &history), 2);
        assert_eq!(calc_new_cores(0, &history), 1);
    }

    #[test]
    fn no_oom_keeps_value() {
        assert_eq!(calc_new_cores(48, &[other(), killed()]), 48);
        assert_eq!(calc_new_cores(48, &[]), 48);
    }

    #[test]
    fn processes_also_count_exit_code() {
        let history = [killed(), other(), oom()];
        assert_eq!(calc_num_processes(16, &history), 4);
        assert_eq!(calc_new_cores(16, &history), 8);
    }

    #[test]
    fn repeated_calls_agree() {
        let history = [oom(), oom(), oom()];
        let first = calc_new_cores(64, &history);
        assert_eq!(first, 8);
        assert_eq!(calc_new_cores(64, &history), first);
    }

    #[tokio::test]
    async fn backoff_reads_history_from_cluster() {
        let cluster = Arc::new(InMemoryCluster::new());
        let job = Job::new("create_vector_tile_cache", JobKind::TileCache, Vec::new());
        let request = SubmitRequest::for_job(&job, &OrchestratorConfig::default(), Vec::new()).unwrap();
        let task_id = cluster.submit(&request).await.unwrap();
        cluster.set_history(&task_id, vec![oom(), killed()]).unwrap();

        let cores = ResourceBackoff::for_cores(cluster.clone());
        assert_eq!(cores.next_value(&task_id, 48).await.unwrap(), 24);
        let processes = ResourceBackoff::for_processes(cluster);
        assert_eq!(processes.next_value(&task_id, 48).await.unwrap(), 12);
    }
}
