//! Explicit dependencies of every orchestrator component.
//!
//! Nothing in this crate reaches for process-wide clients; the store, the
//! cluster and the collaborators are handed in through [`FlowContext`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use strata_core::AssetId;

use crate::cluster::ComputeCluster;
use crate::collaborators::{BackingDatabase, CdnInvalidator, ObjectStore, TileCacheService};
use crate::config::OrchestratorConfig;
use crate::error::{Error, Result};
use crate::metrics::FlowMetrics;
use crate::store::Store;

type LockTable = Mutex<HashMap<AssetId, Arc<AsyncMutex<()>>>>;

/// Per-asset mutual exclusion for status evaluation.
///
/// Holding an asset's guard serializes "append, evaluate, commit" for that
/// asset across every report handler in the process. An entry lives only
/// while its asset is locked or waited on.
#[derive(Debug, Default)]
pub struct AssetLocks {
    table: Arc<LockTable>,
}

/// Exclusive access to one asset; released on drop.
#[derive(Debug)]
pub struct AssetGuard {
    asset_id: AssetId,
    table: Arc<LockTable>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl AssetLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to an asset.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock table is poisoned.
    pub async fn lock(&self, asset_id: AssetId) -> Result<AssetGuard> {
        let lock = {
            let mut table = self.table.lock().map_err(poison_err)?;
            Arc::clone(table.entry(asset_id).or_default())
        };
        let guard = lock.lock_owned().await;
        Ok(AssetGuard {
            asset_id,
            table: Arc::clone(&self.table),
            guard: Some(guard),
        })
    }

    /// Number of assets currently locked or waited on.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock table is poisoned.
    pub fn tracked(&self) -> Result<usize> {
        let table = self.table.lock().map_err(poison_err)?;
        Ok(table.len())
    }
}

impl Drop for AssetGuard {
    fn drop(&mut self) {
        let Ok(mut table) = self.table.lock() else {
            return;
        };
        let Some(guard) = self.guard.take() else {
            return;
        };
        let lock = Arc::clone(OwnedMutexGuard::mutex(&guard));
        drop(guard);
        // The table and `lock` are the only owners: nobody is queued behind us.
        if Arc::strong_count(&lock) == 2 {
            table.remove(&self.asset_id);
        }
    }
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("asset lock table poisoned")
}

/// Shared handles used by the orchestrator components. Cheap to clone.
#[derive(Clone)]
pub struct FlowContext {
    /// Deployment configuration.
    pub config: Arc<OrchestratorConfig>,
    /// Entity store.
    pub store: Arc<dyn Store>,
    /// Compute cluster.
    pub cluster: Arc<dyn ComputeCluster>,
    /// Object storage.
    pub objects: Arc<dyn ObjectStore>,
    /// CDN.
    pub cdn: Arc<dyn CdnInvalidator>,
    /// Backing database.
    pub database: Arc<dyn BackingDatabase>,
    /// Tile cache service.
    pub tile_service: Arc<dyn TileCacheService>,
    /// Per-asset locks.
    pub locks: Arc<AssetLocks>,
    /// Metrics recorder.
    pub metrics: FlowMetrics,
}

impl std::fmt::Debug for FlowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_asset_is_serialized() {
        let locks = Arc::new(AssetLocks::new());
        let asset_id = AssetId::generate();

        let guard = locks.lock(asset_id).await.unwrap();
        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.lock(asset_id).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn released_assets_leave_no_entries() {
        let locks = AssetLocks::new();
        for _ in 0..1000 {
            let guard = locks.lock(AssetId::generate()).await.unwrap();
            drop(guard);
        }
        assert_eq!(locks.tracked().unwrap(), 0);
    }

    #[tokio::test]
    async fn entry_survives_while_someone_waits() {
        let locks = Arc::new(AssetLocks::new());
        let asset_id = AssetId::generate();

        let first = locks.lock(asset_id).await.unwrap();
        let released = Arc::new(AtomicBool::new(false));
        let waiter = {
            let locks = Arc::clone(&locks);
            let released = Arc::clone(&released);
            tokio::spawn(async move {
                let guard = locks.lock(asset_id).await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
                released.store(true, Ordering::SeqCst);
                drop(guard);
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        assert_eq!(locks.tracked().unwrap(), 1);

        // A third caller must queue behind the waiter, not get a fresh lock.
        let third = locks.lock(asset_id).await.unwrap();
        assert!(released.load(Ordering::SeqCst));
        drop(third);
        waiter.await.unwrap();
        assert_eq!(locks.tracked().unwrap(), 0);
    }

    #[tokio::test]
    async fn different_assets_do_not_contend() {
        let locks = AssetLocks::new();
        let _a = locks.lock(AssetId::generate()).await.unwrap();
        let _b = locks.lock(AssetId::generate()).await.unwrap();
    }
}
