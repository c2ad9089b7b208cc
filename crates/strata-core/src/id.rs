//! Strongly-typed identifiers for orchestrated entities.
//!
//! - [`AssetId`] is generated locally (ULID, sortable by creation time).
//! - [`TaskId`] is assigned by the compute cluster when a job is submitted;
//!   strata never generates it, it only records it.
//!
//! # Example
//!
//! ```rust
//! use strata_core::id::{AssetId, TaskId};
//!
//! let asset = AssetId::generate();
//! let task = TaskId::new("9f1c2d3e-aaaa-bbbb-cccc-0123456789ab").unwrap();
//!
//! // IDs are different types - this won't compile:
//! // let wrong: AssetId = task;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::{Error, Result};

/// A unique identifier for an asset.
///
/// Assets are the unit the orchestrator drives through job pipelines:
/// database tables, tile caches, exported files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(Ulid);

impl AssetId {
    /// Generates a new unique asset ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Creates an asset ID from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Returns the creation timestamp encoded in the ID.
    #[must_use]
    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        let ms = i64::try_from(self.0.timestamp_ms()).unwrap_or(i64::MAX);
        chrono::DateTime::from_timestamp_millis(ms).unwrap_or_else(chrono::Utc::now)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AssetId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| Error::invalid_id(format!("invalid asset ID '{s}': {e}")))
    }
}

/// Identifier of a submitted cluster job, used as the task key.
///
/// The value is opaque: it is whatever the cluster returned from `submit`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Wraps a cluster-assigned job identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is empty or contains whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(Error::invalid_id("task ID must not be empty"));
        }
        if value.chars().any(char::is_whitespace) {
            return Err(Error::invalid_id(format!(
                "task ID '{value}' must not contain whitespace"
            )));
        }
        Ok(Self(value))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TaskId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for TaskId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TaskId> for String {
    fn from(value: TaskId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_id_roundtrip() {
        let id = AssetId::generate();
        let parsed: AssetId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn asset_ids_are_unique() {
        assert_ne!(AssetId::generate(), AssetId::generate());
    }

    #[test]
    fn invalid_asset_id_returns_error() {
        let result: Result<AssetId> = "not-a-valid-ulid".parse();
        assert!(result.is_err());
    }

    #[test]
    fn task_id_rejects_empty_and_whitespace() {
        assert!(TaskId::new("").is_err());
        assert!(TaskId::new("job 1").is_err());
        assert_eq!(TaskId::new("job-1").unwrap().as_str(), "job-1");
    }

    #[test]
    fn task_id_deserialization_validates() {
        let ok: TaskId = serde_json::from_str("\"abc-123\"").unwrap();
        assert_eq!(ok.as_str(), "abc-123");
        assert!(serde_json::from_str::<TaskId>("\"\"").is_err());
    }
}
