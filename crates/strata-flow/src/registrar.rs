//! Registers the dynamic vector tile cache of a freshly saved table.
//!
//! The cache is driven through the pipeline right away rather than spawned,
//! so it is available shortly after its table is saved. Failing to create
//! it never touches the table asset; it only leaves a version log entry.

use tracing::{info, warn};

use crate::aggregator::Committed;
use crate::context::FlowContext;
use crate::creation_options::{CreationOptions, DynamicVectorTileCacheOptions};
use crate::error::Result;
use crate::model::{Asset, AssetMetadata, AssetType, ChangeLogEntry};
use crate::paths;
use crate::pipeline;

/// Version log message recorded when the cache asset cannot be created.
pub const REGISTRATION_FAILED_MESSAGE: &str = "Failed to create Dynamic Vector Tile Cache Asset";

/// Creates and drives the dynamic tile cache of `table`.
///
/// Returns the created cache asset, or `None` if it could not be recorded.
///
/// # Errors
///
/// Returns an error only if the failure could not be logged or the cache
/// pipeline itself failed.
pub async fn register_dynamic_tile_cache(
    ctx: &FlowContext,
    table: &Asset,
) -> Result<Option<Committed>> {
    let options = DynamicVectorTileCacheOptions::default();
    let metadata = AssetMetadata {
        fields: table.metadata.fields.clone(),
        min_zoom: Some(options.min_zoom),
        max_zoom: Some(options.max_zoom),
    };
    let options = CreationOptions::DynamicVectorTileCache(options);

    let created = match paths::asset_uri(
        &ctx.config,
        &table.dataset,
        &table.version,
        AssetType::DynamicVectorTileCache,
        &options,
    ) {
        Ok(uri) => {
            let cache = Asset::new(
                &table.dataset,
                &table.version,
                AssetType::DynamicVectorTileCache,
                uri,
            )
            .with_creation_options(options)
            .with_metadata(metadata);
            ctx.store.create_asset(&cache).await.map(|()| cache)
        }
        Err(e) => Err(e),
    };

    let cache = match created {
        Ok(cache) => cache,
        Err(e) => {
            warn!(asset_id = %table.asset_id, error = %e, "could not create dynamic tile cache asset");
            let entry = ChangeLogEntry::failed(REGISTRATION_FAILED_MESSAGE).with_detail(e.to_string());
            ctx.store
                .append_version_log(&table.version_key(), entry)
                .await?;
            return Ok(None);
        }
    };

    info!(
        asset_id = %cache.asset_id,
        table_asset_id = %table.asset_id,
        "registered dynamic tile cache"
    );
    let graph = pipeline::prepare(ctx, &cache, Some(table))?;
    pipeline::run(ctx, &cache, graph).await
}
