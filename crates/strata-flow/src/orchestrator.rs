//! Route-layer facing operations.
//!
//! Every mutation of dataset, version, asset and task state goes through
//! [`Orchestrator`]. Work that outlives a request (pipelines, teardown) is
//! spawned on the orchestrator's [`BackgroundTasks`] and returned as a
//! [`WorkHandle`].
//!
//! Deleting an asset or version stops tracking its tasks but does not cancel
//! jobs already running on the cluster; their reports for deleted assets are
//! dropped.

use tracing::{Instrument, info, instrument, warn};

use strata_core::observability::{asset_span, version_span};
use strata_core::{AssetId, TaskId};

use crate::background::{BackgroundTasks, WorkHandle};
use crate::backoff::ResourceBackoff;
use crate::context::FlowContext;
use crate::creation_options::CreationOptions;
use crate::dag::JobGraph;
use crate::error::{Error, Result};
use crate::model::{Asset, AssetType, ChangeLogEntry, Dataset, Task, Version, VersionKey};
use crate::{aggregator, paths, pipeline, registrar, teardown};

/// A version creation request.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVersion {
    /// Dataset name.
    pub dataset: String,
    /// Version string.
    pub version: String,
    /// Tag the version as latest on creation.
    pub is_latest: bool,
    /// Whether data may still be appended.
    pub is_mutable: bool,
    /// Free-form metadata.
    pub metadata: serde_json::Value,
    /// `vector`, `table` or `raster`.
    pub source_type: String,
    /// Untyped creation options of the source.
    pub creation_options: serde_json::Value,
}

impl NewVersion {
    /// A non-latest, immutable version request.
    #[must_use]
    pub fn new(
        dataset: impl Into<String>,
        version: impl Into<String>,
        source_type: impl Into<String>,
        creation_options: serde_json::Value,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            version: version.into(),
            is_latest: false,
            is_mutable: false,
            metadata: serde_json::Value::Null,
            source_type: source_type.into(),
            creation_options,
        }
    }

    /// Tags the version as latest.
    #[must_use]
    pub const fn latest(mut self) -> Self {
        self.is_latest = true;
        self
    }
}

/// The asset orchestrator.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    ctx: FlowContext,
    background: BackgroundTasks,
}

impl Orchestrator {
    /// Creates an orchestrator over the given context.
    #[must_use]
    pub fn new(ctx: FlowContext) -> Self {
        Self {
            ctx,
            background: BackgroundTasks::new(),
        }
    }

    /// Returns the shared context.
    #[must_use]
    pub const fn context(&self) -> &FlowContext {
        &self.ctx
    }

    /// Returns the background work registry.
    #[must_use]
    pub const fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    // --- Datasets ---

    /// Creates a dataset.
    ///
    /// # Errors
    ///
    /// Returns `RecordAlreadyExists` if the name is taken.
    #[instrument(skip_all, fields(dataset = %dataset.dataset))]
    pub async fn create_dataset(&self, dataset: Dataset) -> Result<Dataset> {
        self.ctx.store.create_dataset(&dataset).await?;
        info!("dataset created");
        Ok(dataset)
    }

    /// Deletes a dataset without versions.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if unknown and `Conflict` if it owns versions.
    #[instrument(skip(self))]
    pub async fn delete_dataset(&self, dataset: &str) -> Result<Dataset> {
        let deleted = self.ctx.store.delete_dataset(dataset).await?;
        info!("dataset deleted");
        Ok(deleted)
    }

    // --- Versions ---

    /// Records a version with its default asset and schedules the pipeline.
    ///
    /// Options are parsed and the job graph is built before anything is
    /// stored, so malformed options and unimplemented pipelines leave no
    /// trace.
    ///
    /// # Errors
    ///
    /// - `UnsupportedSourceType`, `InvalidCreationOptions`, `NotImplemented`
    /// - `RecordNotFound` if the dataset is unknown
    /// - `RecordAlreadyExists` if the version or its asset URI exists
    #[instrument(skip_all, fields(dataset = %request.dataset, version = %request.version))]
    pub async fn create_version(&self, request: NewVersion) -> Result<(Version, WorkHandle)> {
        let options = CreationOptions::for_source(&request.source_type, request.creation_options)?;
        let asset = self.default_asset(&request.dataset, &request.version, options)?;
        let graph = pipeline::prepare(&self.ctx, &asset, None)?;

        let mut version = Version::new(&request.dataset, &request.version);
        version.is_latest = request.is_latest;
        version.is_mutable = request.is_mutable;
        version.metadata = request.metadata;
        self.ctx.store.create_version(&version, &asset).await?;
        info!(asset_id = %asset.asset_id, jobs = graph.len(), "version created");

        if version.is_latest {
            self.invalidate_latest(&version.key()).await;
        }
        let handle = self.schedule_pipeline(asset, graph)?;
        Ok((version, handle))
    }

    /// Creates the default asset of an existing version and schedules it.
    ///
    /// # Errors
    ///
    /// - `UnsupportedSourceType`, `InvalidCreationOptions`, `NotImplemented`
    /// - `RecordNotFound` if the version is unknown
    /// - `RecordAlreadyExists` if the version already has a default asset or
    ///   the URI is taken; no tasks are created then
    #[instrument(skip(self, creation_options))]
    pub async fn create_default_asset(
        &self,
        dataset: &str,
        version: &str,
        source_type: &str,
        creation_options: serde_json::Value,
    ) -> Result<(Asset, WorkHandle)> {
        let key = VersionKey::new(dataset, version);
        self.require_version(&key).await?;
        let options = CreationOptions::for_source(source_type, creation_options)?;
        let asset = self.default_asset(dataset, version, options)?;
        let graph = pipeline::prepare(&self.ctx, &asset, None)?;

        self.ctx.store.create_asset(&asset).await?;
        info!(asset_id = %asset.asset_id, jobs = graph.len(), "default asset created");
        let handle = self.schedule_pipeline(asset.clone(), graph)?;
        Ok((asset, handle))
    }

    /// Creates a derived asset of a version and schedules its pipeline.
    ///
    /// # Errors
    ///
    /// - `NotImplemented` for asset types without a pipeline
    /// - `InvalidCreationOptions` if the options do not parse or validate
    /// - `RecordNotFound` if the version is unknown
    /// - `RecordAlreadyExists` if the URI is taken; no tasks are created then
    #[instrument(skip(self, creation_options))]
    pub async fn create_asset(
        &self,
        dataset: &str,
        version: &str,
        asset_type: AssetType,
        creation_options: serde_json::Value,
    ) -> Result<(Asset, WorkHandle)> {
        let key = VersionKey::new(dataset, version);
        self.require_version(&key).await?;
        let options = CreationOptions::for_asset_type(asset_type, creation_options)?;
        let uri = paths::asset_uri(&self.ctx.config, dataset, version, asset_type, &options)?;
        let asset = Asset::new(dataset, version, asset_type, uri).with_creation_options(options);

        let default = self
            .ctx
            .store
            .list_assets(&key)
            .await?
            .into_iter()
            .find(|a| a.is_default);
        let graph = pipeline::prepare(&self.ctx, &asset, default.as_ref())?;

        self.ctx.store.create_asset(&asset).await?;
        info!(asset_id = %asset.asset_id, jobs = graph.len(), "asset created");
        let handle = self.schedule_pipeline(asset.clone(), graph)?;
        Ok((asset, handle))
    }

    // --- Tasks ---

    /// Records a completion report for a task.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for non-terminal statuses and `RecordNotFound`
    /// for unknown tasks.
    pub async fn report_task_completion(&self, task_id: &TaskId, entry: ChangeLogEntry) -> Result<Task> {
        aggregator::report_task_completion(&self.ctx, task_id, entry).await
    }

    /// Gets a task.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` for unknown tasks.
    pub async fn get_task(&self, task_id: &TaskId) -> Result<Task> {
        self.ctx
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| Error::task_not_found(task_id))
    }

    /// Core count to request when resubmitting a task.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt history cannot be read.
    pub async fn resubmission_cores(&self, task_id: &TaskId, current: u32) -> Result<u32> {
        ResourceBackoff::for_cores(self.ctx.cluster.clone())
            .next_value(task_id, current)
            .await
    }

    /// Process count to request when resubmitting a task.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt history cannot be read.
    pub async fn resubmission_processes(&self, task_id: &TaskId, current: u32) -> Result<u32> {
        ResourceBackoff::for_processes(self.ctx.cluster.clone())
            .next_value(task_id, current)
            .await
    }

    // --- Latest ---

    /// Tags a version as latest, demoting the previous one.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if the version is unknown.
    #[instrument(skip(self))]
    pub async fn set_latest(&self, dataset: &str, version: &str) -> Result<Version> {
        let key = VersionKey::new(dataset, version);
        let promoted = self.ctx.store.set_latest(&key).await?;
        info!("version tagged latest");
        self.invalidate_latest(&key).await;
        Ok(promoted)
    }

    // --- Deletion ---

    /// Deletes a non-default asset and schedules its teardown.
    ///
    /// # Errors
    ///
    /// - `RecordNotFound` if unknown
    /// - `Conflict` for default assets
    /// - `NotImplemented` if the asset type has no teardown
    #[instrument(skip(self))]
    pub async fn delete_asset(&self, asset_id: &AssetId) -> Result<(Asset, WorkHandle)> {
        let asset = self
            .ctx
            .store
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| Error::not_found("asset", asset_id))?;
        if asset.is_default {
            return Err(Error::conflict(format!(
                "asset {asset_id} is the default asset of {}; delete the version instead",
                asset.version_key()
            )));
        }
        let actions = teardown::for_asset(&self.ctx.config, &asset)?;

        let deleted = self.ctx.store.delete_asset(asset_id).await?;
        info!(asset_type = %deleted.asset_type, steps = actions.len(), "asset deleted");

        let ctx = self.ctx.clone();
        let subject = format!("asset {asset_id}");
        let span = asset_span(
            "teardown",
            &deleted.dataset,
            &deleted.version,
            &asset_id.to_string(),
        );
        let handle = self.background.spawn(
            format!("teardown {subject}"),
            async move { teardown::run_all(&ctx, &subject, &actions).await }.instrument(span),
        )?;
        Ok((deleted, handle))
    }

    /// Deletes a version with all of its assets and schedules its teardown.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if unknown and `Conflict` if it is tagged
    /// latest while other versions of the dataset exist.
    #[instrument(skip(self))]
    pub async fn delete_version(&self, dataset: &str, version: &str) -> Result<(Version, WorkHandle)> {
        let key = VersionKey::new(dataset, version);
        let assets = self.ctx.store.list_assets(&key).await?;
        let deleted = self.ctx.store.delete_version(&key).await?;
        info!(assets = assets.len(), "version deleted");

        let actions = teardown::for_version(&self.ctx.config, &key);
        let ctx = self.ctx.clone();
        let subject = format!("version {key}");
        let span = version_span("teardown", dataset, version);
        let handle = self.background.spawn(
            format!("teardown {subject}"),
            async move { teardown::run_all(&ctx, &subject, &actions).await }.instrument(span),
        )?;
        Ok((deleted, handle))
    }

    // --- Helpers ---

    fn default_asset(&self, dataset: &str, version: &str, options: CreationOptions) -> Result<Asset> {
        let asset_type = options.default_asset_type().ok_or_else(|| {
            Error::invalid_options(format!("{} options cannot create a default asset", options.kind()))
        })?;
        let uri = paths::asset_uri(&self.ctx.config, dataset, version, asset_type, &options)?;
        Ok(Asset::new(dataset, version, asset_type, uri)
            .as_default()
            .with_creation_options(options))
    }

    async fn require_version(&self, key: &VersionKey) -> Result<Version> {
        self.ctx
            .store
            .get_version(key)
            .await?
            .ok_or_else(|| Error::not_found("version", key))
    }

    fn schedule_pipeline(&self, asset: Asset, graph: JobGraph) -> Result<WorkHandle> {
        let ctx = self.ctx.clone();
        let name = format!("pipeline {}", asset.asset_id);
        let span = asset_span(
            "pipeline",
            &asset.dataset,
            &asset.version,
            &asset.asset_id.to_string(),
        );
        let work = async move {
            let committed = pipeline::run(&ctx, &asset, graph).await?;
            if let Some(committed) = committed.filter(|c| c.register_tile_cache) {
                if let Err(e) = registrar::register_dynamic_tile_cache(&ctx, &committed.asset).await {
                    warn!(asset_id = %committed.asset.asset_id, error = %e, "dynamic tile cache registration failed");
                }
            }
            Ok(())
        };
        self.background.spawn(name, work.instrument(span))
    }

    async fn invalidate_latest(&self, key: &VersionKey) {
        let paths = paths::latest_invalidation_paths(&key.dataset, &key.version);
        if let Err(e) = self
            .ctx
            .cdn
            .invalidate(&self.ctx.config.cdn_distribution_id, &paths)
            .await
        {
            warn!(version = %key, error = %e, "latest path invalidation failed");
        }
    }
}
