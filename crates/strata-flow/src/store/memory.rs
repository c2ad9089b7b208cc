//! In-memory store implementation for testing.
//!
//! This module provides [`InMemoryStore`], an implementation of the [`Store`]
//! trait that keeps every entity behind one `RwLock`, so multi-entity
//! operations are trivially atomic.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No durability, no cross-process coordination
//! - **No persistence**: All state is lost when the process exits

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use strata_core::{AssetId, TaskId};

use super::{AssetTransition, Store, TransitionResult};
use crate::error::{Error, Result};
use crate::model::{
    Asset, AssetMetadata, ChangeLogEntry, Dataset, Task, Version, VersionKey,
};

#[derive(Debug, Default)]
struct StoreState {
    datasets: BTreeMap<String, Dataset>,
    versions: BTreeMap<VersionKey, Version>,
    assets: HashMap<AssetId, Asset>,
    asset_uris: HashMap<String, AssetId>,
    tasks: HashMap<TaskId, Task>,
    asset_tasks: HashMap<AssetId, Vec<TaskId>>,
    rejected_task_writes: usize,
}

impl StoreState {
    fn version_mut(&mut self, key: &VersionKey) -> Result<&mut Version> {
        self.versions
            .get_mut(key)
            .ok_or_else(|| Error::not_found("version", key))
    }

    fn asset_mut(&mut self, asset_id: &AssetId) -> Result<&mut Asset> {
        self.assets
            .get_mut(asset_id)
            .ok_or_else(|| Error::not_found("asset", asset_id))
    }

    fn ensure_uri_free(&self, asset: &Asset) -> Result<()> {
        if self.asset_uris.contains_key(&asset.asset_uri) {
            return Err(Error::already_exists("asset", &asset.asset_uri));
        }
        Ok(())
    }

    fn insert_asset(&mut self, asset: &Asset) {
        self.asset_uris
            .insert(asset.asset_uri.clone(), asset.asset_id);
        self.assets.insert(asset.asset_id, asset.clone());
    }

    fn remove_asset(&mut self, asset_id: &AssetId) -> Option<Asset> {
        let asset = self.assets.remove(asset_id)?;
        self.asset_uris.remove(&asset.asset_uri);
        for task_id in self.asset_tasks.remove(asset_id).unwrap_or_default() {
            self.tasks.remove(&task_id);
        }
        Some(asset)
    }

    fn demote_latest(&mut self, dataset: &str, except: &VersionKey) {
        for (key, version) in &mut self.versions {
            if key.dataset == dataset && key != except {
                version.is_latest = false;
            }
        }
    }
}

/// In-memory store for testing.
///
/// ## Example
///
/// ```rust
/// use strata_flow::store::memory::InMemoryStore;
///
/// let store = InMemoryStore::new();
/// assert_eq!(store.task_count().unwrap(), 0);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of tasks stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn task_count(&self) -> Result<usize> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.tasks.len())
    }

    /// Makes the next `count` task writes fail with a storage error.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn reject_task_writes(&self, count: usize) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.rejected_task_writes = count;
        Ok(())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_dataset(&self, dataset: &Dataset) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        if state.datasets.contains_key(&dataset.dataset) {
            return Err(Error::already_exists("dataset", &dataset.dataset));
        }
        state
            .datasets
            .insert(dataset.dataset.clone(), dataset.clone());
        Ok(())
    }

    async fn get_dataset(&self, dataset: &str) -> Result<Option<Dataset>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.datasets.get(dataset).cloned())
    }

    async fn delete_dataset(&self, dataset: &str) -> Result<Dataset> {
        let mut state = self.state.write().map_err(poison_err)?;
        if !state.datasets.contains_key(dataset) {
            return Err(Error::not_found("dataset", dataset));
        }
        if state.versions.keys().any(|key| key.dataset == dataset) {
            return Err(Error::conflict(format!(
                "dataset {dataset} has versions; delete them first"
            )));
        }
        state
            .datasets
            .remove(dataset)
            .ok_or_else(|| Error::not_found("dataset", dataset))
    }

    async fn create_version(&self, version: &Version, default_asset: &Asset) -> Result<()> {
        let key = version.key();
        let mut state = self.state.write().map_err(poison_err)?;
        if !state.datasets.contains_key(&version.dataset) {
            return Err(Error::not_found("dataset", &version.dataset));
        }
        if state.versions.contains_key(&key) {
            return Err(Error::already_exists("version", &key));
        }
        state.ensure_uri_free(default_asset)?;

        if version.is_latest {
            state.demote_latest(&version.dataset, &key);
        }
        state.versions.insert(key, version.clone());
        state.insert_asset(default_asset);
        Ok(())
    }

    async fn get_version(&self, key: &VersionKey) -> Result<Option<Version>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.versions.get(key).cloned())
    }

    async fn list_versions(&self, dataset: &str) -> Result<Vec<Version>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .versions
            .values()
            .filter(|version| version.dataset == dataset)
            .cloned()
            .collect())
    }

    async fn append_version_log(&self, key: &VersionKey, entry: ChangeLogEntry) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.version_mut(key)?.change_log.push(entry);
        Ok(())
    }

    async fn set_latest(&self, key: &VersionKey) -> Result<Version> {
        let mut state = self.state.write().map_err(poison_err)?;
        if !state.versions.contains_key(key) {
            return Err(Error::not_found("version", key));
        }
        state.demote_latest(&key.dataset, key);
        let version = state.version_mut(key)?;
        version.is_latest = true;
        Ok(version.clone())
    }

    async fn delete_version(&self, key: &VersionKey) -> Result<Version> {
        let mut state = self.state.write().map_err(poison_err)?;
        let version = state
            .versions
            .get(key)
            .ok_or_else(|| Error::not_found("version", key))?;
        let has_siblings = state
            .versions
            .keys()
            .any(|other| other.dataset == key.dataset && other != key);
        if version.is_latest && has_siblings {
            return Err(Error::conflict(format!(
                "version {key} is tagged latest; promote another version first"
            )));
        }

        let owned: Vec<AssetId> = state
            .assets
            .values()
            .filter(|asset| asset.dataset == key.dataset && asset.version == key.version)
            .map(|asset| asset.asset_id)
            .collect();
        for asset_id in &owned {
            state.remove_asset(asset_id);
        }
        state
            .versions
            .remove(key)
            .ok_or_else(|| Error::not_found("version", key))
    }

    async fn create_asset(&self, asset: &Asset) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        if !state.versions.contains_key(&asset.version_key()) {
            return Err(Error::not_found("version", asset.version_key()));
        }
        if state.assets.contains_key(&asset.asset_id) {
            return Err(Error::already_exists("asset", asset.asset_id));
        }
        state.ensure_uri_free(asset)?;
        let key = asset.version_key();
        if asset.is_default
            && state
                .assets
                .values()
                .any(|a| a.is_default && a.version_key() == key)
        {
            return Err(Error::already_exists("default asset", key));
        }
        state.insert_asset(asset);
        Ok(())
    }

    async fn get_asset(&self, asset_id: &AssetId) -> Result<Option<Asset>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.assets.get(asset_id).cloned())
    }

    async fn list_assets(&self, key: &VersionKey) -> Result<Vec<Asset>> {
        let state = self.state.read().map_err(poison_err)?;
        let mut assets: Vec<Asset> = state
            .assets
            .values()
            .filter(|asset| asset.dataset == key.dataset && asset.version == key.version)
            .cloned()
            .collect();
        drop(state);
        assets.sort_by_key(|asset| asset.asset_id);
        Ok(assets)
    }

    async fn update_asset_metadata(
        &self,
        asset_id: &AssetId,
        metadata: AssetMetadata,
    ) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.asset_mut(asset_id)?.metadata = metadata;
        Ok(())
    }

    async fn append_asset_log(&self, asset_id: &AssetId, entry: ChangeLogEntry) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.asset_mut(asset_id)?.change_log.push(entry);
        Ok(())
    }

    async fn set_expected_tasks(&self, asset_id: &AssetId, expected: u32) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.asset_mut(asset_id)?.expected_tasks = Some(expected);
        Ok(())
    }

    async fn commit_transition(&self, transition: &AssetTransition) -> Result<TransitionResult> {
        let mut state = self.state.write().map_err(poison_err)?;
        let Some(asset) = state.assets.get_mut(&transition.asset_id) else {
            return Ok(TransitionResult::NotFound);
        };
        if asset.status.is_terminal() {
            return Ok(TransitionResult::AlreadyTerminal {
                status: asset.status,
            });
        }

        asset.status = transition.status;
        asset.change_log.push(transition.entry.clone());
        if let Some(fields) = &transition.fields {
            asset.metadata.fields.clone_from(fields);
        }
        let asset = asset.clone();

        let version = match &transition.version {
            Some((status, entry)) => state.versions.get_mut(&asset.version_key()).map(|version| {
                version.status = *status;
                version.change_log.push(entry.clone());
                version.clone()
            }),
            None => None,
        };

        Ok(TransitionResult::Applied { asset, version })
    }

    async fn delete_asset(&self, asset_id: &AssetId) -> Result<Asset> {
        let mut state = self.state.write().map_err(poison_err)?;
        let asset = state
            .assets
            .get(asset_id)
            .ok_or_else(|| Error::not_found("asset", asset_id))?;
        if asset.is_default {
            return Err(Error::conflict(format!(
                "asset {asset_id} is the default asset of {}; delete the version instead",
                asset.version_key()
            )));
        }
        state
            .remove_asset(asset_id)
            .ok_or_else(|| Error::not_found("asset", asset_id))
    }

    async fn create_task(&self, task: &Task) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        if state.rejected_task_writes > 0 {
            state.rejected_task_writes -= 1;
            return Err(Error::storage("task write rejected"));
        }
        if !state.assets.contains_key(&task.asset_id) {
            return Err(Error::not_found("asset", task.asset_id));
        }
        if state.tasks.contains_key(&task.task_id) {
            return Err(Error::already_exists("task", &task.task_id));
        }
        state
            .asset_tasks
            .entry(task.asset_id)
            .or_default()
            .push(task.task_id.clone());
        state.tasks.insert(task.task_id.clone(), task.clone());
        Ok(())
    }

    async fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.tasks.get(task_id).cloned())
    }

    async fn append_task_log(&self, task_id: &TaskId, entry: ChangeLogEntry) -> Result<Task> {
        let mut state = self.state.write().map_err(poison_err)?;
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| Error::task_not_found(task_id))?;
        task.change_log.push(entry);
        Ok(task.clone())
    }

    async fn list_tasks(&self, asset_id: &AssetId) -> Result<Vec<Task>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .asset_tasks
            .get(asset_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.tasks.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }
}
