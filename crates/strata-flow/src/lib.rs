//! # strata-flow
//!
//! Asset creation and deletion orchestrator for geospatial datasets.
//!
//! Datasets own versions, versions own assets, and assets are produced by
//! jobs running on an external compute cluster. This crate:
//!
//! - **Plans**: turns creation options into a job graph ([`plan`], [`dag`])
//! - **Submits**: hands the graph to the cluster and records one task per job ([`submit`])
//! - **Tracks**: folds task completion reports into asset and version status ([`aggregator`], [`cascade`])
//! - **Derives**: registers dynamic tile caches for saved tables ([`registrar`])
//! - **Tears down**: removes tables, objects and CDN paths of deleted assets ([`teardown`])
//!
//! ## Guarantees
//!
//! - **One cascade**: concurrent reports for one asset produce exactly one terminal transition
//! - **Atomic latest**: promoting a version demotes the previous latest in the same commit
//! - **No silent gaps**: unknown source types and unimplemented pipelines fail loudly
//!
//! ## Example
//!
//! ```rust
//! use strata_flow::config::OrchestratorConfig;
//! use strata_flow::creation_options::CreationOptions;
//! use strata_flow::model::{Asset, AssetType};
//! use strata_flow::plan::{PlanContext, build_plan};
//!
//! # fn main() -> strata_flow::error::Result<()> {
//! let options = CreationOptions::for_source(
//!     "vector",
//!     serde_json::json!({
//!         "source_driver": "GeoJSON",
//!         "source_uri": ["s3://bucket/wdpa.geojson"],
//!     }),
//! )?;
//! let asset = Asset::new("wdpa", "v1", AssetType::GeoDatabaseTable, "/wdpa/v1/features")
//!     .as_default()
//!     .with_creation_options(options);
//!
//! let config = OrchestratorConfig::default();
//! let graph = build_plan(&PlanContext { config: &config, asset: &asset, default_fields: &[] })?;
//! assert_eq!(graph.roots(), vec!["create_vector_schema"]);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod aggregator;
pub mod background;
pub mod backoff;
pub mod cascade;
pub mod cluster;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod creation_options;
pub mod dag;
pub mod error;
pub mod job;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod paths;
pub mod pipeline;
pub mod plan;
pub mod registrar;
pub mod store;
pub mod submit;
pub mod teardown;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::background::{BackgroundTasks, WorkHandle};
    pub use crate::cluster::{ComputeCluster, JobAttempt, SubmitRequest};
    pub use crate::collaborators::{BackingDatabase, CdnInvalidator, ObjectStore, TileCacheService};
    pub use crate::config::OrchestratorConfig;
    pub use crate::context::FlowContext;
    pub use crate::creation_options::CreationOptions;
    pub use crate::dag::JobGraph;
    pub use crate::error::{Error, Result};
    pub use crate::job::{Job, JobKind};
    pub use crate::metrics::FlowMetrics;
    pub use crate::model::{
        Asset, AssetType, ChangeLogEntry, ChangeLogStatus, Dataset, Status, Task, TaskStatus,
        Version, VersionKey,
    };
    pub use crate::orchestrator::{NewVersion, Orchestrator};
    pub use crate::store::{AssetTransition, Store, TransitionResult};
}
