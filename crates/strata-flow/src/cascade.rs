//! The asset status state machine.
//!
//! [`evaluate`] looks at an asset and a snapshot of its tasks and decides
//! what, if anything, happens next. It performs no I/O; the aggregator runs
//! it under the asset's lock and commits the resulting [`Outcome`].
//!
//! ```text
//! asset:   pending --any task failed--------------------> failed
//!          pending --expected tasks present, all success--> saved
//! version: follows its default asset in the same commit
//! ```

use strata_core::TaskId;

use crate::creation_options::{CreationOptions, IndexType};
use crate::model::{Asset, ChangeLogEntry, FieldMetadata, Status, Task, TaskStatus};
use crate::store::AssetTransition;

/// Message of the entry recorded when a task fails.
pub const TASK_FAILED_MESSAGE: &str = "One or more tasks failed.";

/// What the state machine decided.
#[derive(Debug, Clone, PartialEq)]
pub enum CascadeAction {
    /// The asset is already terminal; reports only extend task history.
    Settled(Status),
    /// Tasks are still outstanding.
    Wait,
    /// The asset reaches a terminal status.
    Finish(Outcome),
}

/// A terminal transition together with the side effects it triggers.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Terminal status of the asset.
    pub status: Status,
    /// Entry appended to the asset (and version) change log.
    pub entry: ChangeLogEntry,
    /// The owning version takes the same status.
    pub cascade_version: bool,
    /// Column metadata is read from the backing database and attached.
    pub attach_fields: bool,
    /// The tile cache service is redeployed after the commit.
    pub redeploy_tile_service: bool,
    /// A dynamic vector tile cache is registered after the commit.
    pub register_tile_cache: bool,
}

impl Outcome {
    /// Success of `asset`.
    #[must_use]
    pub fn saved(asset: &Asset, entry: ChangeLogEntry) -> Self {
        let database = asset.is_managed && asset.asset_type.is_database();
        Self {
            status: Status::Saved,
            entry,
            cascade_version: asset.is_default,
            attach_fields: database,
            redeploy_tile_service: asset.asset_type.is_tile_cache(),
            register_tile_cache: database
                && asset
                    .creation_options
                    .as_ref()
                    .is_some_and(CreationOptions::wants_dynamic_tile_cache),
        }
    }

    /// Failure of `asset`.
    #[must_use]
    pub fn failed(asset: &Asset, entry: ChangeLogEntry) -> Self {
        Self {
            status: Status::Failed,
            entry,
            cascade_version: asset.is_default,
            attach_fields: asset.is_managed && asset.asset_type.is_database(),
            redeploy_tile_service: false,
            register_tile_cache: false,
        }
    }

    /// Builds the store transition, with the fields fetched for it.
    #[must_use]
    pub fn transition(&self, asset: &Asset, fields: Option<Vec<FieldMetadata>>) -> AssetTransition {
        AssetTransition {
            asset_id: asset.asset_id,
            status: self.status,
            entry: self.entry.clone(),
            fields,
            version: self
                .cascade_version
                .then(|| (self.status, self.entry.clone())),
        }
    }
}

/// Entry recorded against an asset when one of its tasks failed.
#[must_use]
pub fn task_failed_entry(task_id: &TaskId) -> ChangeLogEntry {
    ChangeLogEntry::failed(TASK_FAILED_MESSAGE)
        .with_detail(format!("Check /task/{task_id} for more detail"))
}

/// Entry recorded against an asset once all of its tasks succeeded.
#[must_use]
pub fn asset_saved_entry(asset: &Asset) -> ChangeLogEntry {
    ChangeLogEntry::success(format!("Successfully created asset {}.", asset.asset_id))
}

/// Decides the next step for `asset` given all of its tasks.
///
/// A failed task fails the asset at once. Success requires the full
/// pipeline to be recorded (`expected_tasks`) and every task's most recent
/// terminal entry to be a success.
#[must_use]
pub fn evaluate(asset: &Asset, tasks: &[Task]) -> CascadeAction {
    if asset.status.is_terminal() {
        return CascadeAction::Settled(asset.status);
    }

    if let Some(failed) = tasks.iter().find(|t| t.status() == TaskStatus::Failed) {
        return CascadeAction::Finish(Outcome::failed(asset, task_failed_entry(&failed.task_id)));
    }

    let Some(expected) = asset.expected_tasks else {
        return CascadeAction::Wait;
    };
    let recorded = u32::try_from(tasks.len()).unwrap_or(u32::MAX);
    if recorded < expected || tasks.iter().any(|t| t.status() != TaskStatus::Success) {
        return CascadeAction::Wait;
    }

    CascadeAction::Finish(Outcome::saved(asset, asset_saved_entry(asset)))
}

/// Whether a saved table qualifies for a dynamic vector tile cache.
///
/// The table must expose a `geom_wm` field and carry a gist index on exactly
/// that column.
#[must_use]
pub fn supports_dynamic_tiles(table: &Asset) -> bool {
    if !table.asset_type.is_database() || table.status != Status::Saved {
        return false;
    }
    let has_geom_wm = table.metadata.fields.iter().any(|f| f.name == "geom_wm");
    let indices = match &table.creation_options {
        Some(CreationOptions::VectorSource(o)) => o.indices.as_slice(),
        Some(CreationOptions::TableSource(o)) => o.indices.as_slice(),
        _ => &[],
    };
    let has_index = indices
        .iter()
        .any(|i| i.index_type == IndexType::Gist && i.column_names == ["geom_wm"]);
    has_geom_wm && has_index
}

/// Readiness outcome of a dynamic vector tile cache on top of `table`.
#[must_use]
pub fn dynamic_tile_cache_outcome(cache: &Asset, table: Option<&Asset>) -> Outcome {
    if table.is_some_and(supports_dynamic_tiles) {
        Outcome::saved(
            cache,
            ChangeLogEntry::success("Created Dynamic Vector Tile Cache Asset"),
        )
    } else {
        Outcome::failed(
            cache,
            ChangeLogEntry::failed("Failed to Create Dynamic Vector Tile Cache Asset.")
                .with_detail("Associated database table does not meet criteria."),
        )
    }
}
