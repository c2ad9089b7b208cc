//! Task completion reports and the asset/version cascade.
//!
//! A report appends to the task's change log, then re-evaluates the owning
//! asset from a fresh snapshot of all of its tasks. Both steps run under the
//! asset's lock, and the store applies the terminal transition with
//! compare-and-set, so sibling reports racing to "last task succeeded"
//! produce exactly one cascade.

use tracing::{debug, info, warn};

use strata_core::TaskId;

use crate::cascade::{self, CascadeAction, Outcome};
use crate::context::FlowContext;
use crate::error::{Error, Result};
use crate::model::{Asset, ChangeLogEntry, ChangeLogStatus, FieldMetadata, Task};
use crate::registrar;
use crate::store::TransitionResult;

/// A transition that was committed, with what still has to follow it.
#[derive(Debug, Clone)]
pub struct Committed {
    /// Asset after the commit.
    pub asset: Asset,
    /// A dynamic vector tile cache should be registered for the asset.
    pub register_tile_cache: bool,
}

/// Records a completion report and runs the cascade.
///
/// # Errors
///
/// - `BadRequest` if the entry is neither `success` nor `failed`
/// - `RecordNotFound` if the task is unknown
#[tracing::instrument(skip(ctx, entry), fields(status = entry.status.as_label()))]
pub async fn report_task_completion(
    ctx: &FlowContext,
    task_id: &TaskId,
    entry: ChangeLogEntry,
) -> Result<Task> {
    if !entry.status.is_terminal() {
        return Err(Error::bad_request(format!(
            "task status must be success or failed, got {}",
            entry.status.as_label()
        )));
    }
    ctx.metrics.record_task_report(entry.status.as_label());

    let task = ctx
        .store
        .get_task(task_id)
        .await?
        .ok_or_else(|| Error::task_not_found(task_id))?;

    let (task, committed) = {
        let _guard = ctx.locks.lock(task.asset_id).await?;
        let task = ctx.store.append_task_log(task_id, entry).await?;
        let committed = evaluate_and_commit(ctx, &task).await?;
        (task, committed)
    };

    if let Some(committed) = committed.filter(|c| c.register_tile_cache) {
        if let Err(e) = registrar::register_dynamic_tile_cache(ctx, &committed.asset).await {
            warn!(
                asset_id = %committed.asset.asset_id,
                error = %e,
                "dynamic tile cache registration failed"
            );
        }
    }
    Ok(task)
}

// Caller holds the asset lock.
async fn evaluate_and_commit(ctx: &FlowContext, task: &Task) -> Result<Option<Committed>> {
    let Some(asset) = ctx.store.get_asset(&task.asset_id).await? else {
        debug!(asset_id = %task.asset_id, "report for a deleted asset");
        return Ok(None);
    };
    let tasks = ctx.store.list_tasks(&asset.asset_id).await?;

    match cascade::evaluate(&asset, &tasks) {
        CascadeAction::Settled(status) => {
            debug!(asset_id = %asset.asset_id, status = %status, "asset already terminal");
            Ok(None)
        }
        CascadeAction::Wait => {
            debug!(
                asset_id = %asset.asset_id,
                recorded = tasks.len(),
                expected = ?asset.expected_tasks,
                "asset still pending"
            );
            Ok(None)
        }
        CascadeAction::Finish(outcome) => commit_outcome(ctx, &asset, &outcome).await,
    }
}

/// Re-evaluates an asset after its pipeline was recorded in full.
///
/// Covers reports that arrived before the expected task count was known.
///
/// # Errors
///
/// Returns an error if the store fails.
pub async fn reevaluate(ctx: &FlowContext, asset: &Asset) -> Result<Option<Committed>> {
    let _guard = ctx.locks.lock(asset.asset_id).await?;
    let Some(asset) = ctx.store.get_asset(&asset.asset_id).await? else {
        return Ok(None);
    };
    let tasks = ctx.store.list_tasks(&asset.asset_id).await?;
    match cascade::evaluate(&asset, &tasks) {
        CascadeAction::Finish(outcome) => commit_outcome(ctx, &asset, &outcome).await,
        CascadeAction::Settled(_) | CascadeAction::Wait => Ok(None),
    }
}

/// Commits a terminal outcome and runs its immediate side effects.
///
/// The caller holds the asset lock. Returns `None` if another writer got
/// there first or the asset was deleted.
///
/// # Errors
///
/// Returns an error if the store fails. Field capture and the tile service
/// redeploy are best effort.
pub(crate) async fn commit_outcome(
    ctx: &FlowContext,
    asset: &Asset,
    outcome: &Outcome,
) -> Result<Option<Committed>> {
    let fields = if outcome.attach_fields {
        fetch_fields(ctx, asset).await
    } else {
        None
    };

    let transition = outcome.transition(asset, fields);
    match ctx.store.commit_transition(&transition).await? {
        TransitionResult::Applied { asset, version } => {
            info!(
                asset_id = %asset.asset_id,
                dataset = %asset.dataset,
                version = %asset.version,
                status = %asset.status,
                "asset reached terminal status"
            );
            ctx.metrics
                .record_asset_transition(asset.asset_type.display_name(), asset.status.as_label());
            if let Some(version) = &version {
                info!(
                    dataset = %version.dataset,
                    version = %version.version,
                    status = %version.status,
                    "version status cascaded from default asset"
                );
                ctx.metrics.record_version_cascade(version.status.as_label());
            }

            if outcome.redeploy_tile_service {
                redeploy_tile_service(ctx, &asset).await;
            }
            Ok(Some(Committed {
                asset,
                register_tile_cache: outcome.register_tile_cache,
            }))
        }
        TransitionResult::AlreadyTerminal { status } => {
            debug!(asset_id = %asset.asset_id, status = %status, "lost terminal transition race");
            Ok(None)
        }
        TransitionResult::NotFound => {
            debug!(asset_id = %asset.asset_id, "asset deleted before transition");
            Ok(None)
        }
    }
}

async fn fetch_fields(ctx: &FlowContext, asset: &Asset) -> Option<Vec<FieldMetadata>> {
    match ctx.database.list_columns(&asset.dataset, &asset.version).await {
        Ok(columns) => Some(columns.into_iter().map(FieldMetadata::from).collect()),
        Err(e) => {
            warn!(asset_id = %asset.asset_id, error = %e, "could not read field metadata");
            None
        }
    }
}

async fn redeploy_tile_service(ctx: &FlowContext, asset: &Asset) {
    let Err(e) = ctx.tile_service.redeploy().await else {
        return;
    };
    warn!(asset_id = %asset.asset_id, error = %e, "tile cache service redeploy failed");
    let entry = ChangeLogEntry::new(ChangeLogStatus::Failed, "Failed to redeploy tile cache service")
        .with_detail(e.to_string());
    if let Err(e) = ctx.store.append_asset_log(&asset.asset_id, entry).await {
        warn!(asset_id = %asset.asset_id, error = %e, "could not record redeploy failure");
    }
}
