//! Prometheus metrics for observability and monitoring.
//!
//! Stores and slice contexts record counters through the `metrics` facade.
//! They cost nothing until a recorder is installed. [`MetricsRecorder`]
//! installs a Prometheus recorder and renders the text exposition format.
//!
//! # Example
//!
//! ```rust,no_run
//! use cake_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = MetricsRecorder::install()?;
//!
//! // ... create stores, add slices ...
//!
//! println!("{}", recorder.render());
//! # Ok(())
//! # }
//! ```

use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::counter;

/// Actions run through a store's reducer
pub const ACTIONS_DISPATCHED: &str = "store_actions_dispatched_total";

/// Calls to `Store::replace_reducer`
pub const REDUCER_REPLACEMENTS: &str = "store_reducer_replacements_total";

/// Slices registered at runtime
pub const SLICES_ADDED: &str = "slices_added_total";

/// Slices removed at runtime
pub const SLICES_REMOVED: &str = "slices_removed_total";

/// `add_slice` calls ignored because the key already existed
pub const SLICES_DUPLICATE_IGNORED: &str = "slices_duplicate_ignored_total";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics recorder
    #[error("Failed to install metrics recorder: {0}")]
    Install(String),
}

/// Installed Prometheus recorder.
#[derive(Clone)]
pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl MetricsRecorder {
    /// Register metric descriptions and install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if a global recorder is already installed.
    pub fn install() -> Result<Self, MetricsError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        describe();
        tracing::info!("Prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder").finish_non_exhaustive()
    }
}

/// Register all metric descriptions with the installed recorder.
pub fn describe() {
    describe_counter!(
        ACTIONS_DISPATCHED,
        "Total number of actions run through a store's reducer"
    );
    describe_counter!(
        REDUCER_REPLACEMENTS,
        "Total number of reducer replacements"
    );
    describe_counter!(SLICES_ADDED, "Total number of slices added at runtime");
    describe_counter!(SLICES_REMOVED, "Total number of slices removed at runtime");
    describe_counter!(
        SLICES_DUPLICATE_IGNORED,
        "Total number of slice additions ignored because the key already existed"
    );
}
