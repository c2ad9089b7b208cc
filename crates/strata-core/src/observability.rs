//! Observability infrastructure for strata.
//!
//! Structured logging with consistent spans. Components create spans with
//! the helpers here so dataset/version/asset fields are always named the same.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

impl LogFormat {
    /// Parses a format name (`json` or `pretty`), falling back to pretty.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `strata_flow=debug`)
///
/// # Example
///
/// ```rust
/// use strata_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let result = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init(),
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "global subscriber already installed");
        }
    });
}

/// Creates a span for operations scoped to a dataset version.
///
/// # Example
///
/// ```rust
/// use strata_core::observability::version_span;
///
/// let span = version_span("delete_version", "wdpa", "v2021");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn version_span(operation: &str, dataset: &str, version: &str) -> Span {
    tracing::info_span!("version", op = operation, dataset = dataset, version = version)
}

/// Creates a span for operations on a single asset.
#[must_use]
pub fn asset_span(operation: &str, dataset: &str, version: &str, asset_id: &str) -> Span {
    tracing::info_span!(
        "asset",
        op = operation,
        dataset = dataset,
        version = version,
        asset_id = asset_id,
    )
}
