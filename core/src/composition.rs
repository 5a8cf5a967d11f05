//! Reducer composition utilities
//!
//! [`combine_reducers`] turns a [`Registry`] of slice reducers into one
//! [`Reducer`] over the whole [`State`] mapping:
//!
//! - Every slice reducer runs once per action, with its own slice of the
//!   previous state (`None` when the key is missing).
//! - The resulting state has exactly the registry's keys. Keys found in the
//!   previous state without a reducer are dropped.
//! - Before reducing, the previous state's shape is checked, and problems are
//!   reported as `tracing` warnings: an empty registry, or keys the registry
//!   doesn't know about.
//!
//! # Example
//!
//! ```
//! use cake_core::{Action, Registry, Reducer, State};
//! use cake_core::composition::combine_reducers;
//! use serde_json::{Value, json};
//!
//! let registry = Registry::new().slice("sum", |state: Option<&Value>, action: &Action| {
//!     let sum = state.and_then(Value::as_i64).unwrap_or(0);
//!     json!(if action.is("ADD") { sum + action.payload.as_i64().unwrap_or(0) } else { sum })
//! });
//! let reducer = combine_reducers(registry);
//!
//! let mut previous = State::new();
//! previous.insert("sum".into(), json!(4));
//! let next = reducer.reduce(Some(previous), &Action::new("ADD").with_payload(3))?;
//! assert_eq!(next["sum"], json!(7));
//! # Ok::<(), cake_core::ReducerError>(())
//! ```

use crate::action::Action;
use crate::reducer::{Reducer, ReducerError, SliceReducer};
use crate::registry::Registry;
use crate::state::State;
use smallvec::SmallVec;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Options for [`combine_reducers_with`]
#[derive(Debug, Clone, Copy)]
pub struct CombineOptions {
    /// Warn when the registry is empty or the previous state has unknown keys
    pub warn_unexpected_keys: bool,
}

impl CombineOptions {
    /// Enable or disable state shape warnings
    #[must_use]
    pub const fn with_unexpected_key_warnings(mut self, enabled: bool) -> Self {
        self.warn_unexpected_keys = enabled;
        self
    }
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            warn_unexpected_keys: true,
        }
    }
}

/// Combines a registry of slice reducers into one reducer over the whole state.
///
/// Uses [`CombineOptions::default`], which warns about unexpected state shapes.
#[must_use]
pub fn combine_reducers(registry: Registry) -> CombinedReducer {
    combine_reducers_with(registry, CombineOptions::default())
}

/// Combines a registry of slice reducers with explicit options.
#[must_use]
pub fn combine_reducers_with(registry: Registry, options: CombineOptions) -> CombinedReducer {
    CombinedReducer {
        registry,
        options,
        reported_keys: Mutex::new(HashSet::new()),
    }
}

/// A reducer that runs one slice reducer per registry key.
///
/// Created by [`combine_reducers`].
#[derive(Debug)]
pub struct CombinedReducer {
    registry: Registry,
    options: CombineOptions,
    /// Unexpected keys already warned about by this reducer
    reported_keys: Mutex<HashSet<String>>,
}

impl CombinedReducer {
    /// The registry this reducer combines
    #[must_use]
    pub const fn slices(&self) -> &Registry {
        &self.registry
    }

    /// Describe what is wrong with `state`'s shape, if anything.
    ///
    /// Each unexpected key is reported once per reducer.
    fn state_shape_warning(&self, state: &State, action: &Action) -> Option<String> {
        let source = if action.is_init() {
            "create_store"
        } else {
            "the reducer"
        };

        if self.registry.is_empty() {
            return Some(
                "Store does not have a valid reducer. Make sure the argument passed to \
                 combine_reducers is a registry whose values are reducers."
                    .to_string(),
            );
        }

        let mut reported = self
            .reported_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let unexpected: SmallVec<[&str; 4]> = state
            .keys()
            .map(String::as_str)
            .filter(|key| !self.registry.contains(key) && !reported.contains(*key))
            .collect();

        if unexpected.is_empty() {
            return None;
        }

        reported.extend(unexpected.iter().map(|key| (*key).to_string()));

        let plural = if unexpected.len() > 1 { "keys" } else { "key" };
        Some(format!(
            "Unexpected {plural} {} found in previous state received by {source}. \
             Expected to find one of the known reducer keys instead: {}. \
             Unexpected keys will be ignored.",
            quoted(unexpected.iter().copied()),
            quoted(self.registry.keys()),
        ))
    }
}

fn quoted<'a>(keys: impl Iterator<Item = &'a str>) -> String {
    keys.map(|key| format!("\"{key}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Reducer for CombinedReducer {
    fn reduce(&self, state: Option<State>, action: &Action) -> Result<State, ReducerError> {
        let state = state.unwrap_or_default();

        if self.options.warn_unexpected_keys {
            if let Some(message) = self.state_shape_warning(&state, action) {
                tracing::warn!(action = %action.kind, "{message}");
            }
        }

        let mut next = State::new();
        for (key, reducer) in self.registry.iter() {
            let slice = SliceReducer::reduce(reducer.as_ref(), state.get(key), action)?;
            next.insert(key.to_string(), slice);
        }

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::reducer::fallible;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn sum_reducer(state: Option<&Value>, action: &Action) -> Value {
        let sum = state.and_then(Value::as_i64).unwrap_or(0);
        if action.is("ADD") {
            json!(sum + action.payload.as_i64().unwrap_or(0))
        } else {
            json!(sum)
        }
    }

    fn state(pairs: &[(&str, Value)]) -> State {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_initializes_every_slice() {
        let reducer = combine_reducers(
            Registry::new()
                .slice("sum", sum_reducer)
                .slice("label", |_: Option<&Value>, _: &Action| json!("fixed")),
        );

        let next = reducer.reduce(None, &Action::init()).unwrap();
        assert_eq!(next, state(&[("label", json!("fixed")), ("sum", json!(0))]));
    }

    #[test]
    fn test_passes_each_slice_its_own_state() {
        let reducer = combine_reducers(Registry::new().slice("sum", sum_reducer));

        let next = reducer
            .reduce(
                Some(state(&[("sum", json!(4))])),
                &Action::new("ADD").with_payload(3),
            )
            .unwrap();
        assert_eq!(next, state(&[("sum", json!(7))]));
    }

    #[test]
    fn test_drops_unexpected_keys() {
        let reducer = combine_reducers(Registry::new().slice("sum", sum_reducer));

        let next = reducer
            .reduce(
                Some(state(&[("sum", json!(1)), ("stale", json!(true))])),
                &Action::new("NOOP"),
            )
            .unwrap();
        assert_eq!(next, state(&[("sum", json!(1))]));
    }

    #[test]
    fn test_warns_about_unexpected_keys_once() {
        let reducer = combine_reducers(Registry::new().slice("sum", sum_reducer));
        let previous = state(&[("sum", json!(1)), ("stale", json!(true))]);

        let warning = reducer
            .state_shape_warning(&previous, &Action::new("NOOP"))
            .unwrap();
        assert_eq!(
            warning,
            "Unexpected key \"stale\" found in previous state received by the reducer. \
             Expected to find one of the known reducer keys instead: \"sum\". \
             Unexpected keys will be ignored."
        );

        assert!(reducer.state_shape_warning(&previous, &Action::new("NOOP")).is_none());
    }

    #[test]
    fn test_init_warning_names_store_creation() {
        let reducer = combine_reducers(Registry::new().slice("sum", sum_reducer));
        let previous = state(&[("a", json!(1)), ("b", json!(2))]);

        let warning = reducer.state_shape_warning(&previous, &Action::init()).unwrap();
        assert!(warning.starts_with("Unexpected keys \"a\", \"b\""));
        assert!(warning.contains("received by create_store"));
    }

    #[test]
    fn test_warns_about_empty_registry() {
        let reducer = combine_reducers(Registry::new());

        let warning = reducer.state_shape_warning(&State::new(), &Action::init()).unwrap();
        assert!(warning.starts_with("Store does not have a valid reducer"));
        assert!(reducer.reduce(None, &Action::init()).unwrap().is_empty());
    }

    #[test]
    fn test_slice_errors_propagate_unchanged() {
        let failing: Arc<dyn SliceReducer> = Arc::new(fallible(|_: Option<&Value>, action: &Action| {
            if action.is("BOOM") {
                Err(ReducerError::rejected("slice exploded"))
            } else {
                Ok(Value::Null)
            }
        }));
        let reducer = combine_reducers(Registry::new().with_slice("fragile", failing));

        let err = reducer.reduce(None, &Action::new("BOOM")).unwrap_err();
        assert!(matches!(err, ReducerError::Rejected(ref message) if message == "slice exploded"));
    }

    #[test]
    fn test_exposes_combined_slices() {
        let reducer = combine_reducers_with(
            Registry::new().slice("sum", sum_reducer),
            CombineOptions::default().with_unexpected_key_warnings(false),
        );

        assert_eq!(reducer.slices().keys().collect::<Vec<_>>(), vec!["sum"]);
        assert!(Reducer::registry(&reducer).is_none());
    }
}
