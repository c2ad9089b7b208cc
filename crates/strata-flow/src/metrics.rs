//! Orchestrator metrics.
//!
//! Metrics go through the `metrics` crate facade; the embedding service
//! installs whatever recorder it exports with.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `strata_flow_jobs_submitted_total` | Counter | `kind`, `result` | Cluster submissions |
//! | `strata_flow_submission_duration_seconds` | Histogram | `result` | Time to submit one job graph |
//! | `strata_flow_task_reports_total` | Counter | `status` | Completion reports received |
//! | `strata_flow_asset_transitions_total` | Counter | `asset_type`, `status` | Terminal asset transitions |
//! | `strata_flow_version_cascades_total` | Counter | `status` | Version status cascades |
//! | `strata_flow_teardown_actions_total` | Counter | `action`, `result` | Teardown steps run |
//!
//! ## Usage
//!
//! ```rust
//! use strata_flow::metrics::FlowMetrics;
//!
//! let metrics = FlowMetrics::new();
//! metrics.record_task_report("success");
//! metrics.record_version_cascade("saved");
//! ```

use std::time::{Duration, Instant};

use metrics::{counter, histogram};

/// Metric names.
pub mod names {
    /// Counter: cluster submissions.
    pub const JOBS_SUBMITTED_TOTAL: &str = "strata_flow_jobs_submitted_total";
    /// Histogram: seconds spent submitting one job graph.
    pub const SUBMISSION_DURATION_SECONDS: &str = "strata_flow_submission_duration_seconds";
    /// Counter: task completion reports.
    pub const TASK_REPORTS_TOTAL: &str = "strata_flow_task_reports_total";
    /// Counter: terminal asset transitions.
    pub const ASSET_TRANSITIONS_TOTAL: &str = "strata_flow_asset_transitions_total";
    /// Counter: version status cascades.
    pub const VERSION_CASCADES_TOTAL: &str = "strata_flow_version_cascades_total";
    /// Counter: teardown steps.
    pub const TEARDOWN_ACTIONS_TOTAL: &str = "strata_flow_teardown_actions_total";
}

/// Label keys.
pub mod labels {
    /// Job kind.
    pub const KIND: &str = "kind";
    /// Outcome (success, failure).
    pub const RESULT: &str = "result";
    /// Entity status.
    pub const STATUS: &str = "status";
    /// Asset type.
    pub const ASSET_TYPE: &str = "asset_type";
    /// Teardown action.
    pub const ACTION: &str = "action";
}

/// Label value for a successful operation.
pub const SUCCESS: &str = "success";
/// Label value for a failed operation.
pub const FAILURE: &str = "failure";

/// Records orchestrator metrics. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct FlowMetrics;

impl FlowMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Records one cluster submission.
    pub fn record_job_submitted(&self, kind: &str, result: &str) {
        counter!(
            names::JOBS_SUBMITTED_TOTAL,
            labels::KIND => kind.to_string(),
            labels::RESULT => result.to_string(),
        )
        .increment(1);
    }

    /// Records how long submitting a job graph took.
    pub fn observe_submission(&self, result: &str, duration: Duration) {
        histogram!(
            names::SUBMISSION_DURATION_SECONDS,
            labels::RESULT => result.to_string(),
        )
        .record(duration.as_secs_f64());
    }

    /// Records a completion report.
    pub fn record_task_report(&self, status: &str) {
        counter!(
            names::TASK_REPORTS_TOTAL,
            labels::STATUS => status.to_string(),
        )
        .increment(1);
    }

    /// Records a terminal asset transition.
    pub fn record_asset_transition(&self, asset_type: &str, status: &str) {
        counter!(
            names::ASSET_TRANSITIONS_TOTAL,
            labels::ASSET_TYPE => asset_type.to_string(),
            labels::STATUS => status.to_string(),
        )
        .increment(1);
    }

    /// Records a version status cascade.
    pub fn record_version_cascade(&self, status: &str) {
        counter!(
            names::VERSION_CASCADES_TOTAL,
            labels::STATUS => status.to_string(),
        )
        .increment(1);
    }

    /// Records a teardown step.
    pub fn record_teardown(&self, action: &str, result: &str) {
        counter!(
            names::TEARDOWN_ACTIONS_TOTAL,
            labels::ACTION => action.to_string(),
            labels::RESULT => result.to_string(),
        )
        .increment(1);
    }
}

/// RAII guard for timing operations.
///
/// Calls `on_drop` with the elapsed time unless [`TimingGuard::finish`]
/// consumed it first.
pub struct TimingGuard<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> TimingGuard<F>
where
    F: FnOnce(Duration),
{
    /// Starts timing.
    pub fn new(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }

    /// Returns the elapsed time since the guard was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stops timing and returns the elapsed time without calling `on_drop`.
    pub fn finish(mut self) -> Duration {
        self.on_drop = None;
        self.start.elapsed()
    }
}

impl<F> Drop for TimingGuard<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}
