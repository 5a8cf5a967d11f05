//! Slice registries
//!
//! A [`Registry`] maps slice keys to slice reducers. Registries are values:
//! [`Registry::with_slice`] and [`Registry::without_slice`] return a new
//! registry and leave the original untouched, so a registry captured by a
//! reducer never changes underneath it.

use crate::reducer::SliceReducer;
use crate::action::Action;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Mapping from slice key to slice reducer
///
/// Cloning is cheap relative to the reducers it holds: the reducers themselves
/// are shared behind `Arc`.
///
/// # Example
///
/// ```
/// use cake_core::{Action, Registry};
/// use serde_json::{Value, json};
///
/// let registry = Registry::new()
///     .slice("a", |_: Option<&Value>, _: &Action| json!(1))
///     .slice("b", |_: Option<&Value>, _: &Action| json!(2));
///
/// let smaller = registry.without_slice("a");
/// assert!(registry.contains("a"));
/// assert!(!smaller.contains("a"));
/// assert_eq!(smaller.keys().collect::<Vec<_>>(), vec!["b"]);
/// ```
#[derive(Clone, Default)]
pub struct Registry {
    reducers: BTreeMap<String, Arc<dyn SliceReducer>>,
}

impl Registry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion of a closure slice reducer
    ///
    /// Replaces any reducer already registered under `key`.
    #[must_use]
    pub fn slice<F>(self, key: impl Into<String>, reducer: F) -> Self
    where
        F: Fn(Option<&Value>, &Action) -> Value + Send + Sync + 'static,
    {
        self.with_reducer(key, reducer)
    }

    /// Builder-style insertion of any slice reducer
    ///
    /// Replaces any reducer already registered under `key`.
    #[must_use]
    pub fn with_reducer<R>(mut self, key: impl Into<String>, reducer: R) -> Self
    where
        R: SliceReducer + 'static,
    {
        self.reducers.insert(key.into(), Arc::new(reducer));
        self
    }

    /// A copy of this registry with one more slice
    #[must_use]
    pub fn with_slice(&self, key: impl Into<String>, reducer: Arc<dyn SliceReducer>) -> Self {
        let mut reducers = self.reducers.clone();
        reducers.insert(key.into(), reducer);
        Self { reducers }
    }

    /// A copy of this registry without the slice under `key`
    #[must_use]
    pub fn without_slice(&self, key: &str) -> Self {
        let mut reducers = self.reducers.clone();
        reducers.remove(key);
        Self { reducers }
    }

    /// Whether a slice is registered under `key`
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.reducers.contains_key(key)
    }

    /// The reducer registered under `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Arc<dyn SliceReducer>> {
        self.reducers.get(key)
    }

    /// Registered slice keys, in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.reducers.keys().map(String::as_str)
    }

    /// Registered slices, in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn SliceReducer>)> {
        self.reducers.iter().map(|(key, reducer)| (key.as_str(), reducer))
    }

    /// Number of registered slices
    #[must_use]
    pub fn len(&self) -> usize {
        self.reducers.len()
    }

    /// Whether no slices are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reducers.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.reducers.keys()).finish()
    }
}

impl<K> FromIterator<(K, Arc<dyn SliceReducer>)> for Registry
where
    K: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, Arc<dyn SliceReducer>)>>(iter: I) -> Self {
        Self {
            reducers: iter.into_iter().map(|(key, reducer)| (key.into(), reducer)).collect(),
        }
    }
}
