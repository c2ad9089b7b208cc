//! Contracts of the external systems teardown and metadata capture rely on.
//!
//! Each collaborator is a narrow async trait so production adapters (object
//! storage, CDN, the backing database, the tile cache service) stay outside
//! this crate. [`memory`] holds recording test doubles.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::ColumnInfo;

/// Object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Deletes one object. Deleting a missing object succeeds.
    ///
    /// # Errors
    ///
    /// Returns a `Collaborator` error if the store rejects the request.
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Deletes every object under a prefix and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a `Collaborator` error if the store rejects the request.
    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize>;
}

/// CDN cache invalidation.
#[async_trait]
pub trait CdnInvalidator: Send + Sync {
    /// Invalidates the given paths of a distribution.
    ///
    /// # Errors
    ///
    /// Returns a `Collaborator` error if the invalidation is rejected.
    async fn invalidate(&self, distribution_id: &str, paths: &[String]) -> Result<()>;
}

/// The relational database holding version tables.
#[async_trait]
pub trait BackingDatabase: Send + Sync {
    /// Lists the columns of a version's table in ordinal order.
    ///
    /// # Errors
    ///
    /// Returns a `Collaborator` error if the table cannot be introspected.
    async fn list_columns(&self, dataset: &str, version: &str) -> Result<Vec<ColumnInfo>>;

    /// Drops a version's table if it exists.
    ///
    /// # Errors
    ///
    /// Returns a `Collaborator` error if the drop fails.
    async fn drop_table(&self, dataset: &str, version: &str) -> Result<()>;
}

/// The service serving dynamic tiles.
#[async_trait]
pub trait TileCacheService: Send + Sync {
    /// Redeploys the service so it picks up new caches.
    ///
    /// # Errors
    ///
    /// Returns a `Collaborator` error if the redeploy cannot be triggered.
    async fn redeploy(&self) -> Result<()>;
}
