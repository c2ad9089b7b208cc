//! Type-specific teardown of deleted assets and versions.
//!
//! | Asset type | Teardown |
//! |------------|----------|
//! | (geo) database table | drop the version table |
//! | single-file exports | delete the object |
//! | dynamic vector tile cache | invalidate its CDN paths |
//! | static vector / raster tile cache | delete its prefix, invalidate its CDN paths |
//! | raster tile set | delete its prefix |
//!
//! Unmanaged assets are only records; nothing outside the store is touched.

use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::context::FlowContext;
use crate::creation_options::CreationOptions;
use crate::error::{Error, Result};
use crate::metrics::{FAILURE, SUCCESS};
use crate::model::{Asset, AssetType, VersionKey};
use crate::paths;

/// One teardown step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownAction {
    /// Drop a version table.
    DropTable {
        /// Dataset name.
        dataset: String,
        /// Version string.
        version: String,
    },
    /// Delete one object.
    DeleteObject {
        /// Bucket.
        bucket: String,
        /// Object key.
        key: String,
    },
    /// Delete every object under a prefix.
    DeletePrefix {
        /// Bucket.
        bucket: String,
        /// Key prefix.
        prefix: String,
    },
    /// Invalidate CDN paths.
    Invalidate {
        /// Distribution id.
        distribution_id: String,
        /// Paths to invalidate.
        paths: Vec<String>,
    },
}

impl TeardownAction {
    /// Metric and log label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::DropTable { .. } => "drop_table",
            Self::DeleteObject { .. } => "delete_object",
            Self::DeletePrefix { .. } => "delete_prefix",
            Self::Invalidate { .. } => "invalidate",
        }
    }

    /// Runs the step.
    ///
    /// # Errors
    ///
    /// Returns the collaborator's error.
    pub async fn run(&self, ctx: &FlowContext) -> Result<()> {
        match self {
            Self::DropTable { dataset, version } => ctx.database.drop_table(dataset, version).await,
            Self::DeleteObject { bucket, key } => ctx.objects.delete(bucket, key).await,
            Self::DeletePrefix { bucket, prefix } => {
                let removed = ctx.objects.delete_prefix(bucket, prefix).await?;
                info!(bucket = %bucket, prefix = %prefix, removed, "deleted objects");
                Ok(())
            }
            Self::Invalidate {
                distribution_id,
                paths,
            } => ctx.cdn.invalidate(distribution_id, paths).await,
        }
    }
}

/// Teardown of one asset.
///
/// # Errors
///
/// Returns `NotImplemented` for asset types without a teardown and
/// `InvalidCreationOptions` if the asset URI does not locate its data.
pub fn for_asset(config: &OrchestratorConfig, asset: &Asset) -> Result<Vec<TeardownAction>> {
    if !asset.is_managed {
        return Ok(Vec::new());
    }
    let (dataset, version) = (asset.dataset.as_str(), asset.version.as_str());

    let actions = match asset.asset_type {
        AssetType::DatabaseTable | AssetType::GeoDatabaseTable => vec![TeardownAction::DropTable {
            dataset: dataset.to_string(),
            version: version.to_string(),
        }],
        AssetType::Shapefile | AssetType::Geopackage | AssetType::Ndjson | AssetType::Csv | AssetType::Tsv => {
            let (bucket, key) = paths::split_s3_uri(&asset.asset_uri).ok_or_else(|| {
                Error::invalid_options(format!("asset URI {} is not an object URI", asset.asset_uri))
            })?;
            vec![TeardownAction::DeleteObject {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }]
        }
        AssetType::DynamicVectorTileCache => {
            let implementation = implementation(asset, "dynamic");
            vec![invalidate(config, vec![paths::tile_cache_invalidation_path(
                dataset,
                version,
                implementation,
            )])]
        }
        AssetType::StaticVectorTileCache | AssetType::RasterTileCache => {
            let implementation = implementation(asset, "default");
            vec![
                TeardownAction::DeletePrefix {
                    bucket: config.tile_cache_bucket.clone(),
                    prefix: paths::tile_cache_prefix(dataset, version, implementation),
                },
                invalidate(config, vec![paths::tile_cache_invalidation_path(
                    dataset,
                    version,
                    implementation,
                )]),
            ]
        }
        AssetType::RasterTileSet => {
            let prefix = match &asset.creation_options {
                Some(CreationOptions::RasterSource(o) | CreationOptions::RasterTileSet(o)) => {
                    paths::raster_tile_set_prefix(dataset, version, o)
                }
                _ => {
                    return Err(Error::invalid_options(format!(
                        "raster tile set {} has no grid options",
                        asset.asset_id
                    )));
                }
            };
            vec![TeardownAction::DeletePrefix {
                bucket: config.data_lake_bucket.clone(),
                prefix,
            }]
        }
        AssetType::Grid1x1 => {
            return Err(Error::not_implemented(format!(
                "no teardown registered for {}",
                asset.asset_type
            )));
        }
    };
    Ok(actions)
}

/// Teardown of everything a version owns.
#[must_use]
pub fn for_version(config: &OrchestratorConfig, key: &VersionKey) -> Vec<TeardownAction> {
    let prefix = paths::version_prefix(&key.dataset, &key.version);
    vec![
        TeardownAction::DropTable {
            dataset: key.dataset.clone(),
            version: key.version.clone(),
        },
        TeardownAction::DeletePrefix {
            bucket: config.data_lake_bucket.clone(),
            prefix: prefix.clone(),
        },
        TeardownAction::DeletePrefix {
            bucket: config.tile_cache_bucket.clone(),
            prefix,
        },
        invalidate(config, vec![paths::version_invalidation_path(
            &key.dataset,
            &key.version,
        )]),
    ]
}

/// Runs every step, continuing past failures.
///
/// # Errors
///
/// Returns the first failure after all steps were attempted.
pub async fn run_all(ctx: &FlowContext, subject: &str, actions: &[TeardownAction]) -> Result<()> {
    let mut first_error = None;
    for action in actions {
        match action.run(ctx).await {
            Ok(()) => ctx.metrics.record_teardown(action.label(), SUCCESS),
            Err(e) => {
                ctx.metrics.record_teardown(action.label(), FAILURE);
                warn!(subject, action = action.label(), error = %e, "teardown step failed");
                first_error.get_or_insert(e);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

fn implementation<'a>(asset: &'a Asset, fallback: &'a str) -> &'a str {
    asset
        .creation_options
        .as_ref()
        .and_then(CreationOptions::implementation)
        .unwrap_or(fallback)
}

fn invalidate(config: &OrchestratorConfig, paths: Vec<String>) -> TeardownAction {
    TeardownAction::Invalidate {
        distribution_id: config.cdn_distribution_id.clone(),
        paths,
    }
}
