//! # strata-core
//!
//! Shared primitives for the strata geospatial asset orchestrator.
//!
//! - **Identifiers**: Strongly-typed IDs for assets and cluster tasks
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization and span helpers
//!
//! ## Example
//!
//! ```rust
//! use strata_core::prelude::*;
//!
//! let asset_id = AssetId::generate();
//! let task_id = TaskId::new("0b7f5a1e-job").unwrap();
//! assert_ne!(asset_id.to_string(), task_id.to_string());
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod observability;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::id::{AssetId, TaskId};
    pub use crate::observability::{LogFormat, init_logging};
}

pub use error::{Error, Result};
pub use id::{AssetId, TaskId};
pub use observability::{LogFormat, init_logging};
