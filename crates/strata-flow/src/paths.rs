//! Object store keys, asset URIs and CDN paths.
//!
//! Everything a version owns lives under the `{dataset}/{version}/` prefix
//! of the data lake and tile cache buckets.

use crate::config::OrchestratorConfig;
use crate::creation_options::{CreationOptions, RasterTileSetOptions};
use crate::error::{Error, Result};
use crate::model::AssetType;

/// CDN path of the `latest` alias index.
pub const LATEST_INDEX_PATH: &str = "/_latest";

/// Key prefix of everything a version owns.
#[must_use]
pub fn version_prefix(dataset: &str, version: &str) -> String {
    format!("{dataset}/{version}/")
}

/// URI of a database table asset.
#[must_use]
pub fn features_uri(dataset: &str, version: &str) -> String {
    format!("/{dataset}/{version}/features")
}

/// Key prefix of a raster tile set.
#[must_use]
pub fn raster_tile_set_prefix(dataset: &str, version: &str, options: &RasterTileSetOptions) -> String {
    format!(
        "{dataset}/{version}/raster/{}/{}/{}/",
        options.srid, options.grid, options.pixel_meaning
    )
}

/// URI template of a raster tile set.
#[must_use]
pub fn raster_tile_set_uri(
    bucket: &str,
    dataset: &str,
    version: &str,
    options: &RasterTileSetOptions,
) -> String {
    format!(
        "s3://{bucket}/{}geotiff/{{tile_id}}.tif",
        raster_tile_set_prefix(dataset, version, options)
    )
}

/// Key prefix of a tile cache.
#[must_use]
pub fn tile_cache_prefix(dataset: &str, version: &str, implementation: &str) -> String {
    format!("{dataset}/{version}/{implementation}/")
}

/// Public URI template of a tile cache.
#[must_use]
pub fn tile_cache_uri(
    base_url: &str,
    dataset: &str,
    version: &str,
    implementation: &str,
    extension: &str,
) -> String {
    format!("{base_url}/{dataset}/{version}/{implementation}/{{z}}/{{x}}/{{y}}.{extension}")
}

/// URI of a single-file vector export.
#[must_use]
pub fn vector_file_uri(bucket: &str, dataset: &str, version: &str, extension: &str) -> String {
    format!("s3://{bucket}/{dataset}/{version}/vector/epsg-4326/{dataset}_{version}.{extension}")
}

/// CDN paths invalidated when a tile cache goes away.
#[must_use]
pub fn tile_cache_invalidation_path(dataset: &str, version: &str, implementation: &str) -> String {
    format!("/{dataset}/{version}/{implementation}/*")
}

/// CDN path covering everything a version serves.
#[must_use]
pub fn version_invalidation_path(dataset: &str, version: &str) -> String {
    format!("/{dataset}/{version}/*")
}

/// CDN paths invalidated when a version becomes latest.
#[must_use]
pub fn latest_invalidation_paths(dataset: &str, version: &str) -> Vec<String> {
    vec![
        LATEST_INDEX_PATH.to_string(),
        format!("/{dataset}/{version}/latest/*"),
    ]
}

/// Splits `s3://bucket/key` into bucket and key.
#[must_use]
pub fn split_s3_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("s3://")?;
    let (bucket, key) = rest.split_once('/')?;
    if bucket.is_empty() || key.is_empty() {
        return None;
    }
    Some((bucket, key))
}

/// Computes the URI of a managed asset.
///
/// # Errors
///
/// Returns `NotImplemented` for asset types with no managed layout and
/// `InvalidCreationOptions` if the options do not fit the type.
pub fn asset_uri(
    config: &OrchestratorConfig,
    dataset: &str,
    version: &str,
    asset_type: AssetType,
    options: &CreationOptions,
) -> Result<String> {
    if !options.fits_asset_type(asset_type) {
        return Err(Error::invalid_options(format!(
            "{} options do not apply to {asset_type}",
            options.kind()
        )));
    }
    match (asset_type, options) {
        (AssetType::DatabaseTable | AssetType::GeoDatabaseTable, _) => {
            Ok(features_uri(dataset, version))
        }
        (
            AssetType::RasterTileSet,
            CreationOptions::RasterSource(raster) | CreationOptions::RasterTileSet(raster),
        ) => Ok(raster_tile_set_uri(
            &config.data_lake_bucket,
            dataset,
            version,
            raster,
        )),
        (AssetType::DynamicVectorTileCache | AssetType::StaticVectorTileCache, _) => {
            let implementation = options.implementation().unwrap_or("default");
            Ok(tile_cache_uri(
                &config.tile_cache_url,
                dataset,
                version,
                implementation,
                "pbf",
            ))
        }
        (AssetType::RasterTileCache, _) => {
            let implementation = options.implementation().unwrap_or("default");
            Ok(tile_cache_uri(
                &config.tile_cache_url,
                dataset,
                version,
                implementation,
                "png",
            ))
        }
        (AssetType::Shapefile, _) => Ok(vector_file_uri(
            &config.data_lake_bucket,
            dataset,
            version,
            "shp.zip",
        )),
        (AssetType::Geopackage, _) => Ok(vector_file_uri(
            &config.data_lake_bucket,
            dataset,
            version,
            "gpkg",
        )),
        (other, _) => Err(Error::not_implemented(format!(
            "no managed URI layout for {other}"
        ))),
    }
}
