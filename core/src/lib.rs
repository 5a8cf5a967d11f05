//! # Cake Core
//!
//! Core types for Cake stores: actions, state, reducers and slice registries.
//!
//! A Cake store holds one top-level [`State`] mapping. Each key of that mapping
//! is a *slice*, reduced independently by its own [`SliceReducer`]. The
//! [`composition`] module merges a [`Registry`] of slice reducers into a single
//! top-level [`Reducer`].
//!
//! ## Core Concepts
//!
//! - **Action**: A `{ type, payload }` record describing what happened
//! - **State**: Mapping from slice key to slice value
//! - **Slice Reducer**: Pure function `(Option<slice>, action) → slice`
//! - **Reducer**: Pure function `(Option<State>, action) → State`
//! - **Registry**: Copy-on-write mapping from slice key to slice reducer
//!
//! ## Example
//!
//! ```
//! use cake_core::{Action, Registry, Reducer, composition::combine_reducers};
//! use serde_json::{Value, json};
//!
//! let registry = Registry::new().slice("sum", |state: Option<&Value>, action: &Action| {
//!     let sum = state.and_then(Value::as_i64).unwrap_or(0);
//!     if action.is("ADD") {
//!         json!(sum + action.payload.as_i64().unwrap_or(0))
//!     } else {
//!         json!(sum)
//!     }
//! });
//!
//! let reducer = combine_reducers(registry);
//! let state = reducer.reduce(None, &Action::init())?;
//! assert_eq!(state["sum"], json!(0));
//! # Ok::<(), cake_core::ReducerError>(())
//! ```

pub use serde::{Deserialize, Serialize};

/// Multi-key reducer combination
pub mod composition;

/// Slice and top-level reducer traits
pub mod reducer;

/// Copy-on-write slice registries
pub mod registry;

/// Action module - the input type for every reducer
///
/// Actions are plain records: a string `type` and an optional JSON payload.
/// Any slice can react to any action type, including ones registered later.
pub mod action {
    use serde::{Deserialize, Serialize};
    use serde_json::Value;
    use std::borrow::Cow;

    /// Action type the store dispatches whenever a reducer is installed or replaced.
    pub const INIT: &str = "@@redux/INIT";

    /// An action dispatched through a store
    ///
    /// # Example
    ///
    /// ```
    /// use cake_core::Action;
    ///
    /// let action = Action::new("ADD").with_payload(3);
    /// assert!(action.is("ADD"));
    /// assert_eq!(action.payload, 3);
    /// ```
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Action {
        /// The action type
        #[serde(rename = "type")]
        pub kind: Cow<'static, str>,

        /// Action payload, `null` when absent
        #[serde(default, skip_serializing_if = "Value::is_null")]
        pub payload: Value,
    }

    impl Action {
        /// Create an action of the given type with no payload
        #[must_use]
        pub fn new(kind: impl Into<Cow<'static, str>>) -> Self {
            Self {
                kind: kind.into(),
                payload: Value::Null,
            }
        }

        /// The store's reserved initialization action
        #[must_use]
        pub const fn init() -> Self {
            Self {
                kind: Cow::Borrowed(INIT),
                payload: Value::Null,
            }
        }

        /// Attach a payload
        #[must_use]
        pub fn with_payload(mut self, payload: impl Into<Value>) -> Self {
            self.payload = payload.into();
            self
        }

        /// Whether this action has the given type
        #[must_use]
        pub fn is(&self, kind: &str) -> bool {
            self.kind == kind
        }

        /// Whether this is the store's initialization action
        #[must_use]
        pub fn is_init(&self) -> bool {
            self.is(INIT)
        }
    }
}

/// State module - the top-level state mapping
pub mod state {
    /// Top-level store state: slice key to slice value
    pub type State = serde_json::Map<String, serde_json::Value>;
}

pub use action::Action;
pub use reducer::{Fallible, Reducer, ReducerError, SharedReducer, SliceReducer, fallible};
pub use registry::Registry;
pub use state::State;
