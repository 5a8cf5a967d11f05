//! # Cake Runtime
//!
//! Store runtime for Cake.
//!
//! This crate provides the [`Store`] that owns state and runs reducers, the
//! store-creation protocol that enhancers plug into, and the [`slices`] module,
//! which adds and removes state slices while the store is running.
//!
//! ## Core Components
//!
//! - **Store**: Holds state, dispatches actions, swaps reducers
//! - **Enhancers**: Wrap store creation ([`StoreCreator`], [`StoreEnhancer`], [`compose`])
//! - **Slices**: Dynamic slice registration ([`slices::SliceContext`])
//!
//! ## Example
//!
//! ```
//! use cake_runtime::{create_store, slices::{SliceContext, combine_reducers}};
//! use cake_core::{Action, Registry};
//! use serde_json::{Value, json};
//! use std::sync::Arc;
//!
//! let context = SliceContext::new();
//! let store = create_store(Arc::new(combine_reducers(None)), None, Some(&context))?;
//!
//! context.add_slice("sum", |state: Option<&Value>, action: &Action| {
//!     let sum = state.and_then(Value::as_i64).unwrap_or(0);
//!     json!(if action.is("ADD") { sum + action.payload.as_i64().unwrap_or(0) } else { sum })
//! })?;
//! store.dispatch(Action::new("ADD").with_payload(5))?;
//!
//! assert_eq!(store.state(|s| s["sum"].clone()), json!(5));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::borrow::Cow;

/// Store, store creation and enhancer composition
pub mod store;

/// Dynamic slice registration and removal
pub mod slices;

/// Metrics for observability
pub mod metrics;

pub use error::StoreError;
pub use store::{
    BaseCreator, Composed, Store, StoreCreator, StoreEnhancer, compose, create_store,
    create_store_with_config,
};

/// Error types for the Store runtime
pub mod error {
    use cake_core::ReducerError;
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// A reducer failed while handling an action
        ///
        /// The store's state is left as it was before the action.
        #[error(transparent)]
        Reducer(#[from] ReducerError),

        /// `dispatch` was called from inside a reducer
        #[error("Reducers may not dispatch actions")]
        DispatchInProgress,

        /// A store enhancer refused to create the store
        #[error("Store enhancer failed: {0}")]
        Enhancer(#[source] Box<dyn std::error::Error + Send + Sync>),
    }

    impl StoreError {
        /// Wrap an enhancer's own error type
        pub fn enhancer(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
            Self::Enhancer(error.into())
        }
    }
}

/// Store configuration
///
/// # Example
///
/// ```
/// use cake_runtime::StoreConfig;
///
/// let config = StoreConfig::default()
///     .with_label("catalog")
///     .with_action_broadcast_capacity(256);
/// assert_eq!(config.action_broadcast_capacity, 256);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Number of actions buffered for each subscriber of `subscribe_actions`
    pub action_broadcast_capacity: usize,
    /// Name attached to the store's tracing spans
    pub label: Cow<'static, str>,
}

impl StoreConfig {
    /// Create a new configuration with custom values
    ///
    /// # Arguments
    ///
    /// - `action_broadcast_capacity`: Actions buffered per subscriber
    /// - `label`: Name used in tracing output
    #[must_use]
    pub fn new(action_broadcast_capacity: usize, label: impl Into<Cow<'static, str>>) -> Self {
        Self {
            action_broadcast_capacity,
            label: label.into(),
        }
    }

    /// Set the action broadcast capacity
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn with_action_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.action_broadcast_capacity = capacity.max(1);
        self
    }

    /// Set the tracing label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = label.into();
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            action_broadcast_capacity: 16,
            label: Cow::Borrowed("store"),
        }
    }
}
