//! Recording in-memory collaborators for testing.
//!
//! Every call is recorded in order. Failures are injected per collaborator
//! with `fail_next` style switches that stay on until cleared.
//!
//! ## Limitations
//!
//! - **No real side effects**: objects and tables only exist as map entries
//! - **Single-process only**

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{BackingDatabase, CdnInvalidator, ObjectStore, TileCacheService};
use crate::error::{Error, Result};
use crate::model::ColumnInfo;

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("collaborator lock poisoned")
}

#[derive(Debug, Default)]
struct ObjectState {
    objects: BTreeSet<(String, String)>,
    deleted: Vec<(String, String)>,
    failing: bool,
}

/// In-memory object store.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    state: RwLock<ObjectState>,
}

impl InMemoryObjectStore {
    /// Creates an empty object store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn put(&self, bucket: &str, key: &str) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.objects.insert((bucket.to_string(), key.to_string()));
        Ok(())
    }

    /// Returns whether an object exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn contains(&self, bucket: &str, key: &str) -> Result<bool> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .objects
            .contains(&(bucket.to_string(), key.to_string())))
    }

    /// Returns every delete request as `(bucket, key or prefix)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn deleted(&self) -> Result<Vec<(String, String)>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.deleted.clone())
    }

    /// Makes every later request fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn set_failing(&self, failing: bool) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.failing = failing;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        if state.failing {
            return Err(Error::collaborator("object store", "delete rejected"));
        }
        state.objects.remove(&(bucket.to_string(), key.to_string()));
        state.deleted.push((bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize> {
        let mut state = self.state.write().map_err(poison_err)?;
        if state.failing {
            return Err(Error::collaborator("object store", "delete rejected"));
        }
        let before = state.objects.len();
        state
            .objects
            .retain(|(b, key)| !(b == bucket && key.starts_with(prefix)));
        let removed = before - state.objects.len();
        state.deleted.push((bucket.to_string(), prefix.to_string()));
        Ok(removed)
    }
}

#[derive(Debug, Default)]
struct CdnState {
    invalidations: Vec<(String, Vec<String>)>,
    failing: bool,
}

/// In-memory CDN.
#[derive(Debug, Default)]
pub struct InMemoryCdn {
    state: RwLock<CdnState>,
}

impl InMemoryCdn {
    /// Creates a CDN with no recorded invalidations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every invalidated path across all requests, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn invalidated_paths(&self) -> Result<Vec<String>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .invalidations
            .iter()
            .flat_map(|(_, paths)| paths.iter().cloned())
            .collect())
    }

    /// Makes every later request fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn set_failing(&self, failing: bool) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.failing = failing;
        Ok(())
    }
}

#[async_trait]
impl CdnInvalidator for InMemoryCdn {
    async fn invalidate(&self, distribution_id: &str, paths: &[String]) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        if state.failing {
            return Err(Error::collaborator("cdn", "invalidation rejected"));
        }
        state
            .invalidations
            .push((distribution_id.to_string(), paths.to_vec()));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DatabaseState {
    tables: HashMap<(String, String), Vec<ColumnInfo>>,
    dropped: Vec<(String, String)>,
    failing: bool,
}

/// In-memory backing database.
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    state: RwLock<DatabaseState>,
}

impl InMemoryDatabase {
    /// Creates a database without tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a version table.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn create_table(&self, dataset: &str, version: &str, columns: Vec<ColumnInfo>) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state
            .tables
            .insert((dataset.to_string(), version.to_string()), columns);
        Ok(())
    }

    /// Returns whether a version table exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn has_table(&self, dataset: &str, version: &str) -> Result<bool> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .tables
            .contains_key(&(dataset.to_string(), version.to_string())))
    }

    /// Returns every dropped table as `(dataset, version)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn dropped(&self) -> Result<Vec<(String, String)>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.dropped.clone())
    }

    /// Makes every later request fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn set_failing(&self, failing: bool) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.failing = failing;
        Ok(())
    }
}

#[async_trait]
impl BackingDatabase for InMemoryDatabase {
    async fn list_columns(&self, dataset: &str, version: &str) -> Result<Vec<ColumnInfo>> {
        let state = self.state.read().map_err(poison_err)?;
        if state.failing {
            return Err(Error::collaborator("database", "introspection failed"));
        }
        state
            .tables
            .get(&(dataset.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| {
                Error::collaborator("database", format!("table {dataset}.{version} does not exist"))
            })
    }

    async fn drop_table(&self, dataset: &str, version: &str) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        if state.failing {
            return Err(Error::collaborator("database", "drop failed"));
        }
        let key = (dataset.to_string(), version.to_string());
        state.tables.remove(&key);
        state.dropped.push(key);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TileServiceState {
    redeploys: usize,
    failing: bool,
}

/// In-memory tile cache service.
#[derive(Debug, Default)]
pub struct InMemoryTileCacheService {
    state: RwLock<TileServiceState>,
}

impl InMemoryTileCacheService {
    /// Creates a service with no recorded redeploys.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many redeploys were requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn redeploys(&self) -> Result<usize> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.redeploys)
    }

    /// Makes every later request fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn set_failing(&self, failing: bool) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.failing = failing;
        Ok(())
    }
}

#[async_trait]
impl TileCacheService for InMemoryTileCacheService {
    async fn redeploy(&self) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        if state.failing {
            return Err(Error::collaborator("tile cache service", "redeploy failed"));
        }
        state.redeploys += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delete_prefix_removes_matching_objects_only() {
        let store = InMemoryObjectStore::new();
        store.put("lake", "wdpa/v1/a.geojson").unwrap();
        store.put("lake", "wdpa/v1/b.geojson").unwrap();
        store.put("lake", "wdpa/v10/a.geojson").unwrap();
        store.put("tiles", "wdpa/v1/a.pbf").unwrap();

        let removed = store.delete_prefix("lake", "wdpa/v1/").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.contains("lake", "wdpa/v10/a.geojson").unwrap());
        assert!(store.contains("tiles", "wdpa/v1/a.pbf").unwrap());
    }

    #[tokio::test]
    async fn failing_collaborators_reject_calls() {
        let cdn = InMemoryCdn::new();
        cdn.set_failing(true).unwrap();
        let err = cdn
            .invalidate("dist", &["/x/*".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Collaborator { .. }));
        assert!(cdn.invalidated_paths().unwrap().is_empty());
    }

    #[tokio::test]
    async fn database_lists_and_drops_tables() {
        let db = InMemoryDatabase::new();
        db.create_table("wdpa", "v1", vec![ColumnInfo::new("name", "text")])
            .unwrap();
        assert_eq!(db.list_columns("wdpa", "v1").await.unwrap().len(), 1);

        db.drop_table("wdpa", "v1").await.unwrap();
        assert!(!db.has_table("wdpa", "v1").unwrap());
        assert!(db.list_columns("wdpa", "v1").await.is_err());
    }
}
