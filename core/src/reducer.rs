//! Reducer traits
//!
//! Two levels of reducer exist:
//!
//! - [`SliceReducer`]: reduces one slice value. `None` asks for the default.
//! - [`Reducer`]: reduces the whole [`State`] mapping, usually built from a
//!   [`Registry`] of slice reducers by
//!   [`combine_reducers`](crate::composition::combine_reducers).
//!
//! Plain closures implement both traits, so most reducers never need a named type.

use crate::{action::Action, registry::Registry, state::State};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by reducers
///
/// Errors from slice reducers are never wrapped by the combinator; they reach
/// the caller of `dispatch` exactly as the slice reducer produced them.
#[derive(Error, Debug)]
pub enum ReducerError {
    /// The reducer rejected the action
    #[error("{0}")]
    Rejected(String),

    /// Any other failure raised inside a reducer
    #[error(transparent)]
    Custom(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ReducerError {
    /// Reject an action with a message
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

/// A reducer for a single slice of state
///
/// # Example
///
/// ```
/// use cake_core::{Action, SliceReducer};
/// use serde_json::{Value, json};
///
/// let counter = |state: Option<&Value>, action: &Action| {
///     let count = state.and_then(Value::as_i64).unwrap_or(0);
///     if action.is("INCREMENT") { json!(count + 1) } else { json!(count) }
/// };
///
/// assert_eq!(counter.reduce(None, &Action::init())?, json!(0));
/// assert_eq!(counter.reduce(Some(&json!(4)), &Action::new("INCREMENT"))?, json!(5));
/// # Ok::<(), cake_core::ReducerError>(())
/// ```
pub trait SliceReducer: Send + Sync {
    /// Reduce an action into the next slice value
    ///
    /// # Errors
    ///
    /// Returns a [`ReducerError`] when the reducer cannot handle the action.
    fn reduce(&self, state: Option<&Value>, action: &Action) -> Result<Value, ReducerError>;
}

impl<F> SliceReducer for F
where
    F: Fn(Option<&Value>, &Action) -> Value + Send + Sync,
{
    fn reduce(&self, state: Option<&Value>, action: &Action) -> Result<Value, ReducerError> {
        Ok(self(state, action))
    }
}

/// A slice reducer built from a fallible closure
///
/// Created by [`fallible`].
#[derive(Debug, Clone, Copy)]
pub struct Fallible<F>(F);

/// Wrap a fallible closure as a [`SliceReducer`]
///
/// # Example
///
/// ```
/// use cake_core::{Action, ReducerError, SliceReducer, fallible};
/// use serde_json::Value;
///
/// let strict = fallible(|state: Option<&Value>, action: &Action| {
///     if action.is("BOOM") {
///         return Err(ReducerError::rejected("boom"));
///     }
///     Ok(state.cloned().unwrap_or(Value::Null))
/// });
///
/// assert!(strict.reduce(None, &Action::new("BOOM")).is_err());
/// ```
pub const fn fallible<F>(reducer: F) -> Fallible<F>
where
    F: Fn(Option<&Value>, &Action) -> Result<Value, ReducerError> + Send + Sync,
{
    Fallible(reducer)
}

impl<F> SliceReducer for Fallible<F>
where
    F: Fn(Option<&Value>, &Action) -> Result<Value, ReducerError> + Send + Sync,
{
    fn reduce(&self, state: Option<&Value>, action: &Action) -> Result<Value, ReducerError> {
        (self.0)(state, action)
    }
}

/// A reducer for the whole state mapping
///
/// `state` is `None` until the store has run its first initialization action
/// without preloaded state.
pub trait Reducer: Send + Sync {
    /// Reduce an action into the next state
    ///
    /// # Errors
    ///
    /// Returns a [`ReducerError`] when the reducer (or any slice reducer it
    /// delegates to) fails.
    fn reduce(&self, state: Option<State>, action: &Action) -> Result<State, ReducerError>;

    /// The slice registry this reducer was built from, if it exposes one
    ///
    /// Reducers that support adding and removing slices at runtime return the
    /// registry they were combined from. Everything else returns `None`.
    fn registry(&self) -> Option<&Registry> {
        None
    }
}

impl<F> Reducer for F
where
    F: Fn(Option<State>, &Action) -> Result<State, ReducerError> + Send + Sync,
{
    fn reduce(&self, state: Option<State>, action: &Action) -> Result<State, ReducerError> {
        self(state, action)
    }
}

/// A reducer shared between a store and its owner
pub type SharedReducer = Arc<dyn Reducer>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn closure_slice_reducer_never_fails() {
        let reducer = |state: Option<&Value>, _action: &Action| state.cloned().unwrap_or(json!("default"));

        assert_eq!(
            SliceReducer::reduce(&reducer, None, &Action::init()).unwrap(),
            json!("default")
        );
        assert_eq!(
            SliceReducer::reduce(&reducer, Some(&json!("kept")), &Action::new("ANY")).unwrap(),
            json!("kept")
        );
    }

    #[test]
    fn fallible_slice_reducer_propagates_error() {
        let reducer = fallible(|_state: Option<&Value>, action: &Action| {
            Err(ReducerError::rejected(format!("cannot handle {}", action.kind)))
        });

        let err = SliceReducer::reduce(&reducer, None, &Action::new("NOPE")).unwrap_err();
        assert_eq!(err.to_string(), "cannot handle NOPE");
    }

    #[test]
    fn plain_reducer_has_no_registry() {
        let reducer =
            |state: Option<State>, _action: &Action| Ok::<_, ReducerError>(state.unwrap_or_default());

        assert!(Reducer::registry(&reducer).is_none());
        assert!(Reducer::reduce(&reducer, None, &Action::init()).unwrap().is_empty());
    }
}
