//! Persisted entities: datasets, versions, assets and tasks.
//!
//! Every entity carries an append-only change log of [`ChangeLogEntry`]
//! values. Status fields on assets and versions only ever move from
//! `pending` to a terminal status; tasks have no status field at all and
//! derive it from their change log.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use strata_core::{AssetId, TaskId};

use crate::creation_options::CreationOptions;

/// Status carried by a change-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeLogStatus {
    /// Work is in progress.
    Pending,
    /// Work finished successfully.
    Success,
    /// Work failed.
    Failed,
}

impl ChangeLogStatus {
    /// Returns true for `success` and `failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Returns the lowercase label used in logs and metrics.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// One immutable, timestamped audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// When the entry was recorded.
    pub date_time: DateTime<Utc>,
    /// Outcome the entry reports.
    pub status: ChangeLogStatus,
    /// Human readable message.
    pub message: String,
    /// Optional detail (error output, pointer to a task).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ChangeLogEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(status: ChangeLogStatus, message: impl Into<String>) -> Self {
        Self {
            date_time: Utc::now(),
            status,
            message: message.into(),
            detail: None,
        }
    }

    /// Creates a `pending` entry.
    #[must_use]
    pub fn pending(message: impl Into<String>) -> Self {
        Self::new(ChangeLogStatus::Pending, message)
    }

    /// Creates a `success` entry.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ChangeLogStatus::Success, message)
    }

    /// Creates a `failed` entry.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ChangeLogStatus::Failed, message)
    }

    /// Attaches a detail string.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Lifecycle status of an asset or a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Jobs are still running.
    #[default]
    Pending,
    /// Every job succeeded.
    Saved,
    /// At least one job failed.
    Failed,
}

impl Status {
    /// Returns true for `saved` and `failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Saved | Self::Failed)
    }

    /// Returns the lowercase label used in logs and metrics.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Saved => "saved",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Status of a task, derived from its change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// No terminal entry yet.
    Pending,
    /// Most recent terminal entry is `success`.
    Success,
    /// Most recent terminal entry is `failed`.
    Failed,
}

/// Kinds of assets a version can hold.
///
/// Serialized with the display names used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetType {
    /// Plain table in the backing database.
    #[serde(rename = "Database table")]
    DatabaseTable,
    /// Table with geometry columns in the backing database.
    #[serde(rename = "Geo database table")]
    GeoDatabaseTable,
    /// Vector tiles rendered on request from a geo database table.
    #[serde(rename = "Dynamic vector tile cache")]
    DynamicVectorTileCache,
    /// Pre-rendered vector tiles.
    #[serde(rename = "Static vector tile cache")]
    StaticVectorTileCache,
    /// Pre-rendered raster tiles.
    #[serde(rename = "Raster tile cache")]
    RasterTileCache,
    /// Tiled GeoTIFFs on a fixed grid.
    #[serde(rename = "Raster tile set")]
    RasterTileSet,
    /// Zipped ESRI shapefile export.
    #[serde(rename = "ESRI Shapefile")]
    Shapefile,
    /// Geopackage export.
    #[serde(rename = "Geopackage")]
    Geopackage,
    /// Newline delimited GeoJSON.
    #[serde(rename = "ndjson")]
    Ndjson,
    /// Comma separated export.
    #[serde(rename = "csv")]
    Csv,
    /// Tab separated export.
    #[serde(rename = "tsv")]
    Tsv,
    /// Summary table on a 1x1 degree grid.
    #[serde(rename = "1x1 grid")]
    Grid1x1,
}

impl AssetType {
    /// Returns the display name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::DatabaseTable => "Database table",
            Self::GeoDatabaseTable => "Geo database table",
            Self::DynamicVectorTileCache => "Dynamic vector tile cache",
            Self::StaticVectorTileCache => "Static vector tile cache",
            Self::RasterTileCache => "Raster tile cache",
            Self::RasterTileSet => "Raster tile set",
            Self::Shapefile => "ESRI Shapefile",
            Self::Geopackage => "Geopackage",
            Self::Ndjson => "ndjson",
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Grid1x1 => "1x1 grid",
        }
    }

    /// Database-backed types whose teardown drops a table.
    #[must_use]
    pub const fn is_database(self) -> bool {
        matches!(self, Self::DatabaseTable | Self::GeoDatabaseTable)
    }

    /// Tile cache types, torn down by prefix and CDN invalidation.
    #[must_use]
    pub const fn is_tile_cache(self) -> bool {
        matches!(
            self,
            Self::DynamicVectorTileCache | Self::StaticVectorTileCache | Self::RasterTileCache
        )
    }

    /// Types stored as one object in the data lake.
    #[must_use]
    pub const fn is_single_file(self) -> bool {
        matches!(
            self,
            Self::Shapefile | Self::Geopackage | Self::Ndjson | Self::Csv | Self::Tsv | Self::Grid1x1
        )
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A named collection of versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Unique dataset name.
    pub dataset: String,
    /// Whether downloads are offered.
    pub is_downloadable: bool,
    /// Owner reference.
    pub owner_id: Option<String>,
    /// Free-form metadata.
    pub metadata: serde_json::Value,
    /// Audit trail.
    pub change_log: Vec<ChangeLogEntry>,
    /// Creation time.
    pub created_on: DateTime<Utc>,
}

impl Dataset {
    /// Creates a downloadable dataset with empty metadata.
    #[must_use]
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            is_downloadable: true,
            owner_id: None,
            metadata: serde_json::Value::Null,
            change_log: Vec::new(),
            created_on: Utc::now(),
        }
    }
}

/// Composite key of a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionKey {
    /// Dataset name.
    pub dataset: String,
    /// Version string.
    pub version: String,
}

impl VersionKey {
    /// Creates a version key.
    #[must_use]
    pub fn new(dataset: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dataset, self.version)
    }
}

/// One version of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    /// Dataset name.
    pub dataset: String,
    /// Version string, unique within the dataset.
    pub version: String,
    /// At most one version per dataset is latest.
    pub is_latest: bool,
    /// Whether data may still be appended.
    pub is_mutable: bool,
    /// Mirrors the default asset once it is terminal.
    pub status: Status,
    /// Free-form metadata.
    pub metadata: serde_json::Value,
    /// Audit trail.
    pub change_log: Vec<ChangeLogEntry>,
    /// Creation time.
    pub created_on: DateTime<Utc>,
}

impl Version {
    /// Creates a pending, non-latest version.
    #[must_use]
    pub fn new(dataset: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            version: version.into(),
            is_latest: false,
            is_mutable: false,
            status: Status::Pending,
            metadata: serde_json::Value::Null,
            change_log: Vec::new(),
            created_on: Utc::now(),
        }
    }

    /// Returns the composite key.
    #[must_use]
    pub fn key(&self) -> VersionKey {
        VersionKey::new(&self.dataset, &self.version)
    }
}

/// Column description returned by schema introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Database type name.
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a column description.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Columns maintained by the import jobs rather than the source data.
pub const SYSTEM_FIELDS: [&str; 6] = [
    "geom",
    "geom_wm",
    "gfw_geojson",
    "gfw_bbox",
    "created_on",
    "updated_on",
];

/// Field metadata attached to database-backed assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    /// Column name.
    pub name: String,
    /// Display alias, defaults to the name.
    pub alias: String,
    /// Database type name.
    pub data_type: String,
    /// Shown in feature info popups.
    pub is_feature_info: bool,
    /// Usable as a query filter.
    pub is_filter: bool,
}

impl From<ColumnInfo> for FieldMetadata {
    fn from(column: ColumnInfo) -> Self {
        let visible = !SYSTEM_FIELDS.contains(&column.name.as_str());
        Self {
            alias: column.name.clone(),
            name: column.name,
            data_type: column.data_type,
            is_feature_info: visible,
            is_filter: visible,
        }
    }
}

/// Type-specific asset metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    /// Field list for table-like assets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldMetadata>,
    /// Minimum zoom level for tile caches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<u8>,
    /// Maximum zoom level for tile caches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<u8>,
}

/// An asset of a version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Generated identifier.
    pub asset_id: AssetId,
    /// Dataset name.
    pub dataset: String,
    /// Version string.
    pub version: String,
    /// Kind of asset.
    pub asset_type: AssetType,
    /// Unique location of the asset.
    pub asset_uri: String,
    /// Lifecycle owned by the orchestrator.
    pub is_managed: bool,
    /// The single asset that drives the version status.
    pub is_default: bool,
    /// Lifecycle status.
    pub status: Status,
    /// Options consumed by the job graph builder.
    pub creation_options: Option<CreationOptions>,
    /// Type-specific metadata.
    pub metadata: AssetMetadata,
    /// Number of tasks the submitted pipeline consists of.
    ///
    /// `None` until the pipeline was submitted in full; completeness is never
    /// evaluated before that.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_tasks: Option<u32>,
    /// Audit trail.
    pub change_log: Vec<ChangeLogEntry>,
    /// Creation time.
    pub created_on: DateTime<Utc>,
}

impl Asset {
    /// Creates a pending, managed, non-default asset with a fresh id.
    #[must_use]
    pub fn new(
        dataset: impl Into<String>,
        version: impl Into<String>,
        asset_type: AssetType,
        asset_uri: impl Into<String>,
    ) -> Self {
        Self {
            asset_id: AssetId::generate(),
            dataset: dataset.into(),
            version: version.into(),
            asset_type,
            asset_uri: asset_uri.into(),
            is_managed: true,
            is_default: false,
            status: Status::Pending,
            creation_options: None,
            metadata: AssetMetadata::default(),
            expected_tasks: None,
            change_log: Vec::new(),
            created_on: Utc::now(),
        }
    }

    /// Marks the asset as the version default.
    #[must_use]
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Marks the asset as unmanaged (URI only).
    #[must_use]
    pub fn unmanaged(mut self) -> Self {
        self.is_managed = false;
        self
    }

    /// Sets the creation options.
    #[must_use]
    pub fn with_creation_options(mut self, options: CreationOptions) -> Self {
        self.creation_options = Some(options);
        self
    }

    /// Sets the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: AssetMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns the key of the owning version.
    #[must_use]
    pub fn version_key(&self) -> VersionKey {
        VersionKey::new(&self.dataset, &self.version)
    }
}

/// Persisted record of one submitted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Cluster-assigned job id.
    pub task_id: TaskId,
    /// Owning asset.
    pub asset_id: AssetId,
    /// Audit trail, oldest first.
    pub change_log: Vec<ChangeLogEntry>,
}

impl Task {
    /// Creates a task with an initial entry.
    #[must_use]
    pub fn new(task_id: TaskId, asset_id: AssetId, entry: ChangeLogEntry) -> Self {
        Self {
            task_id,
            asset_id,
            change_log: vec![entry],
        }
    }

    /// Derives the status from the most recent terminal entry.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.change_log
            .iter()
            .rev()
            .find_map(|entry| match entry.status {
                ChangeLogStatus::Success => Some(TaskStatus::Success),
                ChangeLogStatus::Failed => Some(TaskStatus::Failed),
                ChangeLogStatus::Pending => None,
            })
            .unwrap_or(TaskStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with(entries: Vec<ChangeLogEntry>) -> Task {
        Task {
            task_id: TaskId::new("job-1").unwrap(),
            asset_id: AssetId::generate(),
            change_log: entries,
        }
    }

    #[test]
    fn task_status_uses_most_recent_terminal_entry() {
        let task = task_with(vec![ChangeLogEntry::pending("Scheduled job load")]);
        assert_eq!(task.status(), TaskStatus::Pending);

        let task = task_with(vec![
            ChangeLogEntry::pending("scheduled"),
            ChangeLogEntry::failed("attempt 1 failed"),
            ChangeLogEntry::success("attempt 2 succeeded"),
            ChangeLogEntry::pending("heartbeat"),
        ]);
        assert_eq!(task.status(), TaskStatus::Success);
    }

    #[test]
    fn asset_type_wire_names() {
        let json = serde_json::to_string(&AssetType::GeoDatabaseTable).unwrap();
        assert_eq!(json, "\"Geo database table\"");
        let parsed: AssetType = serde_json::from_str("\"Dynamic vector tile cache\"").unwrap();
        assert_eq!(parsed, AssetType::DynamicVectorTileCache);
        assert_eq!(AssetType::Grid1x1.to_string(), "1x1 grid");
    }

    #[test]
    fn asset_type_categories_are_disjoint() {
        let all = [
            AssetType::DatabaseTable,
            AssetType::GeoDatabaseTable,
            AssetType::DynamicVectorTileCache,
            AssetType::StaticVectorTileCache,
            AssetType::RasterTileCache,
            AssetType::RasterTileSet,
            AssetType::Shapefile,
            AssetType::Geopackage,
            AssetType::Ndjson,
            AssetType::Csv,
            AssetType::Tsv,
            AssetType::Grid1x1,
        ];
        for t in all {
            let hits = [t.is_database(), t.is_tile_cache(), t.is_single_file()]
                .iter()
                .filter(|b| **b)
                .count();
            assert!(hits <= 1, "{t} is in more than one category");
        }
    }

    #[test]
    fn system_columns_are_hidden() {
        let geom: FieldMetadata = ColumnInfo::new("geom_wm", "geometry").into();
        assert!(!geom.is_filter && !geom.is_feature_info);
        let name: FieldMetadata = ColumnInfo::new("iso", "text").into();
        assert!(name.is_filter && name.is_feature_info);
        assert_eq!(name.alias, "iso");
    }

    #[test]
    fn change_log_entry_serializes_lowercase_status() {
        let entry = ChangeLogEntry::failed("boom").with_detail("Check /task/x");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["detail"], "Check /task/x");
    }
}
