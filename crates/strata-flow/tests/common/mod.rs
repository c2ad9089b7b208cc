//! Shared harness for orchestrator integration tests.

#![allow(clippy::expect_used, clippy::unwrap_used, dead_code)]

use std::sync::Arc;

use serde_json::{Value, json};

use strata_core::TaskId;
use strata_flow::cluster::memory::InMemoryCluster;
use strata_flow::collaborators::memory::{
    InMemoryCdn, InMemoryDatabase, InMemoryObjectStore, InMemoryTileCacheService,
};
use strata_flow::config::OrchestratorConfig;
use strata_flow::context::{AssetLocks, FlowContext};
use strata_flow::metrics::FlowMetrics;
use strata_flow::model::{Asset, ColumnInfo, Dataset, Version, VersionKey};
use strata_flow::orchestrator::{NewVersion, Orchestrator};
use strata_flow::store::Store;
use strata_flow::store::memory::InMemoryStore;

/// An orchestrator over in-memory collaborators, with typed handles to each.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub store: Arc<InMemoryStore>,
    pub cluster: Arc<InMemoryCluster>,
    pub objects: Arc<InMemoryObjectStore>,
    pub cdn: Arc<InMemoryCdn>,
    pub database: Arc<InMemoryDatabase>,
    pub tiles: Arc<InMemoryTileCacheService>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let cluster = Arc::new(InMemoryCluster::new());
        let objects = Arc::new(InMemoryObjectStore::new());
        let cdn = Arc::new(InMemoryCdn::new());
        let database = Arc::new(InMemoryDatabase::new());
        let tiles = Arc::new(InMemoryTileCacheService::new());

        let ctx = FlowContext {
            config: Arc::new(OrchestratorConfig::default()),
            store: store.clone(),
            cluster: cluster.clone(),
            objects: objects.clone(),
            cdn: cdn.clone(),
            database: database.clone(),
            tile_service: tiles.clone(),
            locks: Arc::new(AssetLocks::new()),
            metrics: FlowMetrics::new(),
        };
        Self {
            orchestrator: Orchestrator::new(ctx),
            store,
            cluster,
            objects,
            cdn,
            database,
            tiles,
        }
    }

    pub async fn dataset(&self, name: &str) {
        self.orchestrator
            .create_dataset(Dataset::new(name))
            .await
            .expect("create dataset");
    }

    /// Creates a vector version and waits until its graph is submitted.
    pub async fn vector_version(&self, dataset: &str, version: &str, options: Value) -> Asset {
        let request = NewVersion::new(dataset, version, "vector", options);
        let (_, handle) = self
            .orchestrator
            .create_version(request)
            .await
            .expect("create version");
        handle.wait().await.expect("pipeline submitted");
        self.default_asset(dataset, version).await
    }

    /// Backs a version with a table so field capture has columns to read.
    pub fn table(&self, dataset: &str, version: &str) {
        self.database
            .create_table(
                dataset,
                version,
                vec![
                    ColumnInfo::new("gfw_fid", "integer"),
                    ColumnInfo::new("name", "text"),
                    ColumnInfo::new("geom", "geometry"),
                    ColumnInfo::new("geom_wm", "geometry"),
                ],
            )
            .unwrap();
    }

    pub async fn default_asset(&self, dataset: &str, version: &str) -> Asset {
        self.assets(dataset, version)
            .await
            .into_iter()
            .find(|a| a.is_default)
            .expect("default asset")
    }

    pub async fn assets(&self, dataset: &str, version: &str) -> Vec<Asset> {
        self.store
            .list_assets(&VersionKey::new(dataset, version))
            .await
            .unwrap()
    }

    pub async fn asset(&self, asset: &Asset) -> Asset {
        self.store.get_asset(&asset.asset_id).await.unwrap().unwrap()
    }

    pub async fn version(&self, dataset: &str, version: &str) -> Version {
        self.store
            .get_version(&VersionKey::new(dataset, version))
            .await
            .unwrap()
            .expect("version")
    }

    pub async fn task_ids(&self, asset: &Asset) -> Vec<TaskId> {
        self.store
            .list_tasks(&asset.asset_id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.task_id)
            .collect()
    }
}

/// Vector options with explicit layers and indices and no derived tile cache.
pub fn vector_options(layers: &[&str], indices: Value) -> Value {
    json!({
        "source_driver": "GPKG",
        "source_uri": ["s3://uploads/d/source.gpkg"],
        "layers": layers,
        "indices": indices,
        "create_dynamic_vector_tile_cache": false,
    })
}
