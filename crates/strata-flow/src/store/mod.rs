//! Pluggable persistence for datasets, versions, assets and tasks.
//!
//! The store is the single source of truth for entity state. Operations that
//! touch more than one entity (promoting a version, committing an asset
//! transition together with its version cascade, cascading deletes) are
//! atomic: no reader observes a half-applied change.
//!
//! ## Design Principles
//!
//! - **Append-only logs**: change-log entries are only ever appended
//! - **CAS transitions**: asset status moves `pending -> terminal` exactly once
//! - **Invariants in the store**: deletion guards and `is_latest` exclusivity
//!   are checked under the same lock that applies the change

pub mod memory;

use async_trait::async_trait;

use strata_core::{AssetId, TaskId};

use crate::error::Result;
use crate::model::{
    Asset, AssetMetadata, ChangeLogEntry, Dataset, FieldMetadata, Status, Task, Version,
    VersionKey,
};

/// A terminal asset transition, optionally cascading to the version.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetTransition {
    /// Asset to transition.
    pub asset_id: AssetId,
    /// Terminal status to set.
    pub status: Status,
    /// Entry appended to the asset change log.
    pub entry: ChangeLogEntry,
    /// Field metadata to attach in the same commit.
    pub fields: Option<Vec<FieldMetadata>>,
    /// Status and entry applied to the owning version in the same commit.
    pub version: Option<(Status, ChangeLogEntry)>,
}

/// Outcome of [`Store::commit_transition`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// The transition was applied.
    Applied {
        /// Asset after the change.
        asset: Asset,
        /// Version after the change, if it cascaded.
        version: Option<Version>,
    },
    /// The asset was already terminal; nothing changed.
    AlreadyTerminal {
        /// The status found.
        status: Status,
    },
    /// The asset does not exist (deleted meanwhile).
    NotFound,
}

impl TransitionResult {
    /// Returns true if the transition was applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Storage abstraction for orchestrated entities.
///
/// ## Thread Safety
///
/// All methods are `Send + Sync` so request handlers and background work can
/// share one store.
#[async_trait]
pub trait Store: Send + Sync {
    // --- Datasets ---

    /// Creates a dataset.
    ///
    /// # Errors
    ///
    /// Returns `RecordAlreadyExists` if the name is taken.
    async fn create_dataset(&self, dataset: &Dataset) -> Result<()>;

    /// Gets a dataset by name.
    async fn get_dataset(&self, dataset: &str) -> Result<Option<Dataset>>;

    /// Deletes a dataset that owns no versions.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if unknown and `Conflict` if versions exist.
    async fn delete_dataset(&self, dataset: &str) -> Result<Dataset>;

    // --- Versions ---

    /// Creates a version together with its default asset.
    ///
    /// If the version is latest, the previous latest version of the dataset
    /// is demoted in the same commit.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if the dataset is unknown and
    /// `RecordAlreadyExists` if the version or the asset URI exists.
    async fn create_version(&self, version: &Version, default_asset: &Asset) -> Result<()>;

    /// Gets a version.
    async fn get_version(&self, key: &VersionKey) -> Result<Option<Version>>;

    /// Lists the versions of a dataset.
    async fn list_versions(&self, dataset: &str) -> Result<Vec<Version>>;

    /// Appends to a version's change log.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if the version is unknown.
    async fn append_version_log(&self, key: &VersionKey, entry: ChangeLogEntry) -> Result<()>;

    /// Promotes a version to latest and demotes the previous holder atomically.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if the version is unknown.
    async fn set_latest(&self, key: &VersionKey) -> Result<Version>;

    /// Deletes a version with its assets and tasks.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if unknown and `Conflict` if the version is
    /// latest while sibling versions exist.
    async fn delete_version(&self, key: &VersionKey) -> Result<Version>;

    // --- Assets ---

    /// Creates a non-default asset.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if the version is unknown and
    /// `RecordAlreadyExists` if the URI is taken.
    async fn create_asset(&self, asset: &Asset) -> Result<()>;

    /// Gets an asset.
    async fn get_asset(&self, asset_id: &AssetId) -> Result<Option<Asset>>;

    /// Lists the assets of a version, oldest first.
    async fn list_assets(&self, key: &VersionKey) -> Result<Vec<Asset>>;

    /// Replaces an asset's metadata.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if the asset is unknown.
    async fn update_asset_metadata(&self, asset_id: &AssetId, metadata: AssetMetadata)
    -> Result<()>;

    /// Appends to an asset's change log.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if the asset is unknown.
    async fn append_asset_log(&self, asset_id: &AssetId, entry: ChangeLogEntry) -> Result<()>;

    /// Records how many tasks the asset's pipeline consists of.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if the asset is unknown.
    async fn set_expected_tasks(&self, asset_id: &AssetId, expected: u32) -> Result<()>;

    /// Applies a terminal transition if the asset is still pending.
    async fn commit_transition(&self, transition: &AssetTransition) -> Result<TransitionResult>;

    /// Deletes a non-default asset and its tasks.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if unknown and `Conflict` if it is a default asset.
    async fn delete_asset(&self, asset_id: &AssetId) -> Result<Asset>;

    // --- Tasks ---

    /// Creates a task.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if the asset is unknown and
    /// `RecordAlreadyExists` if the task id is taken.
    async fn create_task(&self, task: &Task) -> Result<()>;

    /// Gets a task.
    async fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>>;

    /// Appends to a task's change log and returns the updated task.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if the task is unknown.
    async fn append_task_log(&self, task_id: &TaskId, entry: ChangeLogEntry) -> Result<Task>;

    /// Lists the tasks of an asset in creation order.
    async fn list_tasks(&self, asset_id: &AssetId) -> Result<Vec<Task>>;
}
