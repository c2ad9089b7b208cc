//! Runs an asset's creation pipeline: plan, submit, record, re-evaluate.
//!
//! [`prepare`] is synchronous with the request so invalid options and
//! unimplemented pipelines surface to the caller before anything is
//! persisted. [`run`] does the long part and is normally spawned.

use tracing::{info, instrument};

use crate::aggregator::{self, Committed};
use crate::cascade;
use crate::context::FlowContext;
use crate::dag::JobGraph;
use crate::error::Result;
use crate::model::{Asset, AssetType, FieldMetadata, Status};
use crate::plan::{PlanContext, build_plan};
use crate::submit;

/// Builds the job graph for `asset`.
///
/// `default_asset` supplies the field list static exports select from; pass
/// `None` when `asset` is itself the default.
///
/// # Errors
///
/// Returns the planning error (`InvalidCreationOptions`, `NotImplemented`, ...).
pub fn prepare(ctx: &FlowContext, asset: &Asset, default_asset: Option<&Asset>) -> Result<JobGraph> {
    let default_fields: &[FieldMetadata] =
        default_asset.map_or(&[], |default| default.metadata.fields.as_slice());
    build_plan(&PlanContext {
        config: &ctx.config,
        asset,
        default_fields,
    })
}

/// Submits `graph` for `asset` and evaluates the asset once it is recorded.
///
/// An empty graph means the asset is checked inline. Returns the committed
/// transition if the asset became terminal during this call.
///
/// # Errors
///
/// Returns `Submission` if the graph could not be submitted in full, or a
/// store error.
#[instrument(skip_all, fields(asset_id = %asset.asset_id, dataset = %asset.dataset, version = %asset.version))]
pub async fn run(ctx: &FlowContext, asset: &Asset, graph: JobGraph) -> Result<Option<Committed>> {
    if graph.is_empty() {
        return run_inline(ctx, asset).await;
    }

    let submission = submit::submit_graph(ctx, asset, &graph).await?;
    ctx.store
        .set_expected_tasks(&asset.asset_id, submission.submitted)
        .await?;
    info!(jobs = submission.submitted, "pipeline recorded");
    aggregator::reevaluate(ctx, asset).await
}

async fn run_inline(ctx: &FlowContext, asset: &Asset) -> Result<Option<Committed>> {
    let outcome = match asset.asset_type {
        AssetType::DynamicVectorTileCache => {
            let assets = ctx.store.list_assets(&asset.version_key()).await?;
            let table = assets
                .iter()
                .find(|a| a.asset_type.is_database() && a.status == Status::Saved);
            cascade::dynamic_tile_cache_outcome(asset, table)
        }
        _ => cascade::Outcome::saved(asset, cascade::asset_saved_entry(asset)),
    };

    ctx.store.set_expected_tasks(&asset.asset_id, 0).await?;
    let _guard = ctx.locks.lock(asset.asset_id).await?;
    aggregator::commit_outcome(ctx, asset, &outcome).await
}
