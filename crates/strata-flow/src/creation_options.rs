//! Typed creation options, one variant per pipeline.
//!
//! Options arrive as JSON keyed either by source type (`vector`, `table`,
//! `raster`) for default assets or by asset type for derived assets. They
//! are parsed into [`CreationOptions`] and validated before any job is built.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{AssetType, ColumnInfo};

/// Highest zoom level accepted for tile caches.
pub const MAX_ZOOM_LEVEL: u8 = 22;

/// Source types that produce a version's default asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Vector files loaded with GDAL.
    Vector,
    /// Delimited text loaded into a plain table.
    Table,
    /// Raster files.
    Raster,
}

impl SourceType {
    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Table => "table",
            Self::Raster => "raster",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "vector" => Ok(Self::Vector),
            "table" => Ok(Self::Table),
            "raster" => Ok(Self::Raster),
            other => Err(Error::UnsupportedSourceType {
                source_type: other.to_string(),
            }),
        }
    }
}

/// GDAL drivers accepted for vector sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorDriver {
    /// Comma separated values with a geometry column.
    #[serde(rename = "CSV")]
    Csv,
    /// ESRI JSON.
    #[serde(rename = "ESRIJSON")]
    EsriJson,
    /// File geodatabase.
    #[serde(rename = "FileGDB")]
    FileGdb,
    /// GeoJSON.
    #[serde(rename = "GeoJSON")]
    GeoJson,
    /// Newline delimited GeoJSON.
    #[serde(rename = "GeoJSONSeq")]
    GeoJsonSeq,
    /// Geopackage.
    #[serde(rename = "GPKG")]
    Gpkg,
    /// ESRI shapefile.
    #[serde(rename = "ESRI Shapefile")]
    Shapefile,
}

impl VectorDriver {
    /// Returns the GDAL driver name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "CSV",
            Self::EsriJson => "ESRIJSON",
            Self::FileGdb => "FileGDB",
            Self::GeoJson => "GeoJSON",
            Self::GeoJsonSeq => "GeoJSONSeq",
            Self::Gpkg => "GPKG",
            Self::Shapefile => "ESRI Shapefile",
        }
    }
}

/// Column delimiter for table sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delimiter {
    /// `,`
    #[default]
    #[serde(rename = ",")]
    Comma,
    /// Tab.
    #[serde(rename = "\t")]
    Tab,
    /// `|`
    #[serde(rename = "|")]
    Pipe,
    /// `;`
    #[serde(rename = ";")]
    Semicolon,
}

impl Delimiter {
    /// Returns the delimiter character as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Comma => ",",
            Self::Tab => "\t",
            Self::Pipe => "|",
            Self::Semicolon => ";",
        }
    }
}

/// Postgres index methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    /// GiST, for geometries.
    Gist,
    /// B-tree.
    Btree,
    /// Hash.
    Hash,
}

impl IndexType {
    /// Returns the lowercase method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gist => "gist",
            Self::Btree => "btree",
            Self::Hash => "hash",
        }
    }
}

/// An index to build on the loaded table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index method.
    pub index_type: IndexType,
    /// Indexed columns, in order.
    pub column_names: Vec<String>,
}

impl IndexSpec {
    /// Creates an index spec.
    #[must_use]
    pub fn new(index_type: IndexType, column_names: &[&str]) -> Self {
        Self {
            index_type,
            column_names: column_names.iter().map(ToString::to_string).collect(),
        }
    }

    /// Returns `col1_col2_type`, used in job names.
    #[must_use]
    pub fn slug(&self) -> String {
        format!("{}_{}", self.column_names.join("_"), self.index_type.as_str())
    }

    fn validate(&self) -> Result<()> {
        if self.column_names.is_empty() || self.column_names.iter().any(String::is_empty) {
            return Err(Error::invalid_options(
                "index column names must not be empty",
            ));
        }
        Ok(())
    }
}

fn default_vector_indices() -> Vec<IndexSpec> {
    vec![
        IndexSpec::new(IndexType::Gist, &["geom"]),
        IndexSpec::new(IndexType::Gist, &["geom_wm"]),
        IndexSpec::new(IndexType::Hash, &["gfw_geostore_id"]),
    ]
}

const fn default_true() -> bool {
    true
}

/// Options for a vector source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorSourceOptions {
    /// GDAL driver of the input files.
    pub source_driver: VectorDriver,
    /// Input file URIs.
    pub source_uri: Vec<String>,
    /// Layers to load; defaults to one layer named after the first file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layers: Option<Vec<String>>,
    /// Indices built after loading.
    #[serde(default = "default_vector_indices")]
    pub indices: Vec<IndexSpec>,
    /// Optional index to cluster the table on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<IndexSpec>,
    /// Explicit table schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_schema: Option<Vec<ColumnInfo>>,
    /// Whether to inherit geometries from the reference geostore.
    #[serde(default = "default_true")]
    pub add_to_geostore: bool,
    /// Whether a dynamic vector tile cache is registered once the table is saved.
    #[serde(default = "default_true")]
    pub create_dynamic_vector_tile_cache: bool,
    /// Attempt timeout override, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl VectorSourceOptions {
    /// Creates options for the given driver and files with all defaults.
    #[must_use]
    pub fn new(source_driver: VectorDriver, source_uri: Vec<String>) -> Self {
        Self {
            source_driver,
            source_uri,
            layers: None,
            indices: default_vector_indices(),
            cluster: None,
            table_schema: None,
            add_to_geostore: true,
            create_dynamic_vector_tile_cache: true,
            timeout: None,
        }
    }

    /// Returns the layers to load.
    #[must_use]
    pub fn resolved_layers(&self) -> Vec<String> {
        match &self.layers {
            Some(layers) => layers.clone(),
            None => self
                .source_uri
                .first()
                .map(|uri| vec![layer_name(uri)])
                .unwrap_or_default(),
        }
    }
}

/// Text drivers accepted for table sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableDriver {
    /// Delimited text.
    #[default]
    Text,
}

/// Hash partitioning parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashPartition {
    /// Number of partitions.
    pub partition_count: u32,
}

/// One list partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPartition {
    /// Table name suffix.
    pub partition_suffix: String,
    /// Values routed to this partition.
    pub value_list: Vec<String>,
}

/// One range partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangePartition {
    /// Table name suffix.
    pub partition_suffix: String,
    /// Inclusive lower bound.
    pub start_value: String,
    /// Exclusive upper bound.
    pub end_value: String,
}

/// Partitioning scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "partition_type",
    content = "partition_schema",
    rename_all = "lowercase"
)]
pub enum PartitionSchema {
    /// Hash partitioning.
    Hash(HashPartition),
    /// List partitioning.
    List(Vec<ListPartition>),
    /// Range partitioning.
    Range(Vec<RangePartition>),
}

/// Table partitioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partitions {
    /// Partition key column.
    pub partition_column: String,
    /// Scheme and its partitions.
    pub schema: PartitionSchema,
}

impl Partitions {
    /// Returns the table suffix of every partition, in order.
    #[must_use]
    pub fn suffixes(&self) -> Vec<String> {
        match &self.schema {
            PartitionSchema::Hash(hash) => (0..hash.partition_count).map(|i| i.to_string()).collect(),
            PartitionSchema::List(parts) => {
                parts.iter().map(|p| p.partition_suffix.clone()).collect()
            }
            PartitionSchema::Range(parts) => {
                parts.iter().map(|p| p.partition_suffix.clone()).collect()
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.partition_column.is_empty() {
            return Err(Error::invalid_options("partition column must not be empty"));
        }
        let suffixes = self.suffixes();
        if suffixes.is_empty() {
            return Err(Error::invalid_options("partitions must not be empty"));
        }
        let mut seen = HashSet::new();
        for suffix in &suffixes {
            if suffix.is_empty() || !seen.insert(suffix.as_str()) {
                return Err(Error::invalid_options(format!(
                    "partition suffix '{suffix}' is empty or duplicated"
                )));
            }
        }
        Ok(())
    }
}

/// Options for a delimited text source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSourceOptions {
    /// Driver of the input files.
    #[serde(default)]
    pub source_driver: TableDriver,
    /// Input file URIs.
    pub source_uri: Vec<String>,
    /// Column delimiter.
    #[serde(default)]
    pub delimiter: Delimiter,
    /// Whether the first line is a header.
    #[serde(default = "default_true")]
    pub has_header: bool,
    /// Latitude column; with `longitude` the table gets geometries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    /// Longitude column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
    /// Indices built after loading.
    #[serde(default)]
    pub indices: Vec<IndexSpec>,
    /// Optional partitioning; each partition gets a clustering job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitions: Option<Partitions>,
    /// Whether a dynamic vector tile cache is registered once the table is saved.
    #[serde(default)]
    pub create_dynamic_vector_tile_cache: bool,
    /// Attempt timeout override, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl TableSourceOptions {
    /// Creates options for the given files with all defaults.
    #[must_use]
    pub fn new(source_uri: Vec<String>) -> Self {
        Self {
            source_driver: TableDriver::Text,
            source_uri,
            delimiter: Delimiter::Comma,
            has_header: true,
            latitude: None,
            longitude: None,
            indices: Vec::new(),
            partitions: None,
            create_dynamic_vector_tile_cache: false,
            timeout: None,
        }
    }

    /// Returns true when both coordinate columns are set.
    #[must_use]
    pub const fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Options for raster sources and raster tile sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterTileSetOptions {
    /// Input file URIs.
    #[serde(default)]
    pub source_uri: Vec<String>,
    /// Spatial reference, e.g. `epsg-4326`.
    pub srid: String,
    /// Tile grid, e.g. `10/40000`.
    pub grid: String,
    /// What a pixel value means, e.g. `percent`.
    pub pixel_meaning: String,
}

/// Tile generalization strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileStrategy {
    /// For mostly adjacent polygons.
    #[default]
    Continuous,
    /// For mostly non-adjacent features.
    Discontinuous,
    /// Never drop features.
    KeepAll,
}

impl TileStrategy {
    /// Returns the snake case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::Discontinuous => "discontinuous",
            Self::KeepAll => "keep_all",
        }
    }
}

const fn default_dynamic_max_zoom() -> u8 {
    MAX_ZOOM_LEVEL
}

const fn default_static_max_zoom() -> u8 {
    14
}

fn default_dynamic_implementation() -> String {
    "dynamic".to_string()
}

fn default_static_implementation() -> String {
    "default".to_string()
}

/// Options for a dynamic vector tile cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicVectorTileCacheOptions {
    /// Lowest zoom level served.
    #[serde(default)]
    pub min_zoom: u8,
    /// Highest zoom level served.
    #[serde(default = "default_dynamic_max_zoom")]
    pub max_zoom: u8,
    /// Fields included in tiles; all feature info fields when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_attributes: Option<Vec<String>>,
    /// Namespace under which tiles are served.
    #[serde(default = "default_dynamic_implementation")]
    pub implementation: String,
}

impl Default for DynamicVectorTileCacheOptions {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: default_dynamic_max_zoom(),
            field_attributes: None,
            implementation: default_dynamic_implementation(),
        }
    }
}

/// Options for a static vector tile cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticVectorTileCacheOptions {
    /// Lowest zoom level rendered.
    #[serde(default)]
    pub min_zoom: u8,
    /// Highest zoom level rendered.
    #[serde(default = "default_static_max_zoom")]
    pub max_zoom: u8,
    /// Generalization strategy.
    #[serde(default)]
    pub tile_strategy: TileStrategy,
    /// Fields included in tiles; all feature info fields when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_attributes: Option<Vec<String>>,
    /// Namespace under which tiles are stored.
    #[serde(default = "default_static_implementation")]
    pub implementation: String,
}

impl Default for StaticVectorTileCacheOptions {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: default_static_max_zoom(),
            tile_strategy: TileStrategy::default(),
            field_attributes: None,
            implementation: default_static_implementation(),
        }
    }
}

/// Options for single-file vector exports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticVectorFileOptions {
    /// Fields exported; all feature info fields when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_attributes: Option<Vec<String>>,
}

/// Options for a raster tile cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterTileCacheOptions {
    /// Lowest zoom level rendered.
    #[serde(default)]
    pub min_zoom: u8,
    /// Highest zoom level rendered.
    #[serde(default = "default_static_max_zoom")]
    pub max_zoom: u8,
    /// Namespace under which tiles are stored.
    #[serde(default = "default_static_implementation")]
    pub implementation: String,
}

/// Creation options, one variant per pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreationOptions {
    /// Vector source producing a geo database table.
    VectorSource(VectorSourceOptions),
    /// Text source producing a (geo) database table.
    TableSource(TableSourceOptions),
    /// Raster source producing a raster tile set.
    RasterSource(RasterTileSetOptions),
    /// Dynamic vector tile cache on top of a table.
    DynamicVectorTileCache(DynamicVectorTileCacheOptions),
    /// Pre-rendered vector tile cache.
    StaticVectorTileCache(StaticVectorTileCacheOptions),
    /// Shapefile or geopackage export.
    StaticVectorFile(StaticVectorFileOptions),
    /// Raster tile set derived from another raster.
    RasterTileSet(RasterTileSetOptions),
    /// Raster tile cache.
    RasterTileCache(RasterTileCacheOptions),
}

fn from_value<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::invalid_options(e.to_string()))
}

impl CreationOptions {
    /// Parses untyped options for a source type.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedSourceType` for unknown source types and
    /// `InvalidCreationOptions` when the options do not parse or validate.
    pub fn for_source(source_type: &str, options: serde_json::Value) -> Result<Self> {
        let parsed = match source_type.parse::<SourceType>()? {
            SourceType::Vector => Self::VectorSource(from_value(options)?),
            SourceType::Table => Self::TableSource(from_value(options)?),
            SourceType::Raster => Self::RasterSource(from_value(options)?),
        };
        parsed.validate()?;
        Ok(parsed)
    }

    /// Parses untyped options for a derived asset type.
    ///
    /// # Errors
    ///
    /// Returns `NotImplemented` for asset types without options and
    /// `InvalidCreationOptions` when the options do not parse or validate.
    pub fn for_asset_type(asset_type: AssetType, options: serde_json::Value) -> Result<Self> {
        let parsed = match asset_type {
            AssetType::DynamicVectorTileCache => Self::DynamicVectorTileCache(from_value(options)?),
            AssetType::StaticVectorTileCache => Self::StaticVectorTileCache(from_value(options)?),
            AssetType::Shapefile | AssetType::Geopackage => {
                Self::StaticVectorFile(from_value(options)?)
            }
            AssetType::RasterTileSet => Self::RasterTileSet(from_value(options)?),
            AssetType::RasterTileCache => Self::RasterTileCache(from_value(options)?),
            other => {
                return Err(Error::not_implemented(format!(
                    "no creation options for asset type {other}"
                )));
            }
        };
        parsed.validate()?;
        Ok(parsed)
    }

    /// Returns the pipeline name, used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::VectorSource(_) => "vector_source",
            Self::TableSource(_) => "table_source",
            Self::RasterSource(_) => "raster_source",
            Self::DynamicVectorTileCache(_) => "dynamic_vector_tile_cache",
            Self::StaticVectorTileCache(_) => "static_vector_tile_cache",
            Self::StaticVectorFile(_) => "static_vector_file",
            Self::RasterTileSet(_) => "raster_tile_set",
            Self::RasterTileCache(_) => "raster_tile_cache",
        }
    }

    /// Returns the asset type a version's default asset gets for these options.
    ///
    /// `None` for options that never produce a default asset.
    #[must_use]
    pub const fn default_asset_type(&self) -> Option<AssetType> {
        match self {
            Self::VectorSource(_) => Some(AssetType::GeoDatabaseTable),
            Self::TableSource(options) => {
                if options.has_coordinates() {
                    Some(AssetType::GeoDatabaseTable)
                } else {
                    Some(AssetType::DatabaseTable)
                }
            }
            Self::RasterSource(_) => Some(AssetType::RasterTileSet),
            _ => None,
        }
    }

    /// Returns true if the options can be attached to an asset of this type.
    #[must_use]
    pub const fn fits_asset_type(&self, asset_type: AssetType) -> bool {
        match self {
            Self::VectorSource(_) | Self::TableSource(_) => asset_type.is_database(),
            Self::RasterSource(_) | Self::RasterTileSet(_) => {
                matches!(asset_type, AssetType::RasterTileSet)
            }
            Self::DynamicVectorTileCache(_) => {
                matches!(asset_type, AssetType::DynamicVectorTileCache)
            }
            Self::StaticVectorTileCache(_) => {
                matches!(asset_type, AssetType::StaticVectorTileCache)
            }
            Self::StaticVectorFile(_) => {
                matches!(asset_type, AssetType::Shapefile | AssetType::Geopackage)
            }
            Self::RasterTileCache(_) => matches!(asset_type, AssetType::RasterTileCache),
        }
    }

    /// Whether a saved table should get a dynamic vector tile cache.
    #[must_use]
    pub const fn wants_dynamic_tile_cache(&self) -> bool {
        match self {
            Self::VectorSource(options) => options.create_dynamic_vector_tile_cache,
            Self::TableSource(options) => options.create_dynamic_vector_tile_cache,
            _ => false,
        }
    }

    /// Tile cache namespace, if these are tile cache options.
    #[must_use]
    pub fn implementation(&self) -> Option<&str> {
        match self {
            Self::DynamicVectorTileCache(o) => Some(&o.implementation),
            Self::StaticVectorTileCache(o) => Some(&o.implementation),
            Self::RasterTileCache(o) => Some(&o.implementation),
            _ => None,
        }
    }

    /// Attempt timeout override, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<u64> {
        match self {
            Self::VectorSource(o) => o.timeout,
            Self::TableSource(o) => o.timeout,
            _ => None,
        }
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCreationOptions` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::VectorSource(o) => {
                validate_sources(&o.source_uri)?;
                if let Some(layers) = &o.layers {
                    if layers.is_empty() || layers.iter().any(String::is_empty) {
                        return Err(Error::invalid_options("layer names must not be empty"));
                    }
                }
                o.indices.iter().try_for_each(IndexSpec::validate)?;
                if let Some(cluster) = &o.cluster {
                    cluster.validate()?;
                }
                validate_timeout(o.timeout)
            }
            Self::TableSource(o) => {
                validate_sources(&o.source_uri)?;
                if o.latitude.is_some() != o.longitude.is_some() {
                    return Err(Error::invalid_options(
                        "latitude and longitude must be set together",
                    ));
                }
                o.indices.iter().try_for_each(IndexSpec::validate)?;
                if let Some(partitions) = &o.partitions {
                    partitions.validate()?;
                }
                validate_timeout(o.timeout)
            }
            Self::RasterSource(o) | Self::RasterTileSet(o) => {
                if o.srid.is_empty() || o.grid.is_empty() || o.pixel_meaning.is_empty() {
                    return Err(Error::invalid_options(
                        "srid, grid and pixel_meaning are required",
                    ));
                }
                Ok(())
            }
            Self::DynamicVectorTileCache(o) => validate_zoom(o.min_zoom, o.max_zoom),
            Self::StaticVectorTileCache(o) => validate_zoom(o.min_zoom, o.max_zoom),
            Self::RasterTileCache(o) => validate_zoom(o.min_zoom, o.max_zoom),
            Self::StaticVectorFile(_) => Ok(()),
        }
    }
}

fn validate_sources(source_uri: &[String]) -> Result<()> {
    if source_uri.is_empty() {
        return Err(Error::invalid_options("source_uri must not be empty"));
    }
    if source_uri.iter().any(String::is_empty) {
        return Err(Error::invalid_options("source_uri entries must not be empty"));
    }
    Ok(())
}

fn validate_timeout(timeout: Option<u64>) -> Result<()> {
    if timeout == Some(0) {
        return Err(Error::invalid_options("timeout must be positive"));
    }
    Ok(())
}

fn validate_zoom(min_zoom: u8, max_zoom: u8) -> Result<()> {
    if min_zoom > max_zoom || max_zoom > MAX_ZOOM_LEVEL {
        return Err(Error::invalid_options(format!(
            "zoom range {min_zoom}..={max_zoom} is invalid"
        )));
    }
    Ok(())
}

/// Layer name GDAL derives from a file: the base name without extensions.
#[must_use]
pub fn layer_name(uri: &str) -> String {
    let file = uri.rsplit('/').next().unwrap_or(uri);
    file.split('.').next().unwrap_or(file).to_string()
}

/// Returns the base name of a URI.
#[must_use]
pub fn file_name(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

/// Returns true for zip archives.
#[must_use]
pub fn is_zipped(uri: &str) -> bool {
    std::path::Path::new(file_name(uri))
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_source_type_is_unsupported() {
        let err = CreationOptions::for_source("esri", json!({})).unwrap_err();
        assert!(matches!(err, Error::UnsupportedSourceType { .. }));
        assert_eq!(err.status_code(), 501);
    }

    #[test]
    fn vector_defaults_apply() {
        let options = CreationOptions::for_source(
            "vector",
            json!({"source_driver": "GeoJSON", "source_uri": ["s3://bucket/wdpa.geojson"]}),
        )
        .unwrap();
        let CreationOptions::VectorSource(vector) = &options else {
            panic!("expected vector options");
        };
        assert_eq!(vector.indices.len(), 3);
        assert!(vector.add_to_geostore);
        assert_eq!(vector.resolved_layers(), vec!["wdpa".to_string()]);
        assert_eq!(options.default_asset_type(), Some(AssetType::GeoDatabaseTable));
        assert!(options.wants_dynamic_tile_cache());
    }

    #[test]
    fn table_with_coordinates_is_geo() {
        let options = CreationOptions::for_source(
            "table",
            json!({"source_uri": ["s3://b/a.csv"], "latitude": "lat", "longitude": "lng"}),
        )
        .unwrap();
        assert_eq!(options.default_asset_type(), Some(AssetType::GeoDatabaseTable));

        let err = CreationOptions::for_source(
            "table",
            json!({"source_uri": ["s3://b/a.csv"], "latitude": "lat"}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidCreationOptions { .. }));
    }

    #[test]
    fn empty_sources_are_rejected() {
        let err = CreationOptions::for_source(
            "vector",
            json!({"source_driver": "GPKG", "source_uri": []}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidCreationOptions { .. }));
    }

    #[test]
    fn partition_suffixes() {
        let partitions: Partitions = serde_json::from_value(json!({
            "partition_column": "year",
            "schema": {"partition_type": "hash", "partition_schema": {"partition_count": 3}}
        }))
        .unwrap();
        assert_eq!(partitions.suffixes(), vec!["0", "1", "2"]);

        let duplicated = Partitions {
            partition_column: "iso".into(),
            schema: PartitionSchema::List(vec![
                ListPartition {
                    partition_suffix: "a".into(),
                    value_list: vec!["BRA".into()],
                },
                ListPartition {
                    partition_suffix: "a".into(),
                    value_list: vec!["IDN".into()],
                },
            ]),
        };
        assert!(duplicated.validate().is_err());
    }

    #[test]
    fn zoom_range_is_checked() {
        let err = CreationOptions::for_asset_type(
            AssetType::StaticVectorTileCache,
            json!({"min_zoom": 10, "max_zoom": 4}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidCreationOptions { .. }));
    }

    #[test]
    fn options_fit_asset_types() {
        let dynamic = CreationOptions::DynamicVectorTileCache(DynamicVectorTileCacheOptions::default());
        assert!(dynamic.fits_asset_type(AssetType::DynamicVectorTileCache));
        assert!(!dynamic.fits_asset_type(AssetType::StaticVectorTileCache));
        assert_eq!(dynamic.implementation(), Some("dynamic"));
    }

    #[test]
    fn uri_helpers() {
        assert_eq!(layer_name("s3://b/dir/adm.shp.zip"), "adm");
        assert!(is_zipped("s3://b/dir/adm.shp.zip"));
        assert!(!is_zipped("s3://b/dir/adm.gpkg"));
        assert_eq!(file_name("s3://b/dir/adm.gpkg"), "adm.gpkg");
    }
}
