//! Dynamic slices
//!
//! Adds and removes state slices on a running store.
//!
//! Three pieces work together:
//!
//! - [`combine_reducers`] builds a [`DynamicReducer`]. It is the host
//!   combinator plus an always-`null` sentinel slice, and it remembers the
//!   registry it was built from.
//! - [`SliceContext`] is a [`StoreEnhancer`]. It records the store it creates
//!   and that store's registry.
//! - [`SliceContext::add_slice`] and [`SliceContext::remove_slice`] swap the
//!   store's reducer for one built from the updated registry, then dispatch a
//!   lifecycle action.
//!
//! # Removal window
//!
//! Replacing the reducer dispatches an initialization action while the removed
//! slice is still in the store's state. The host combinator would report that
//! key as unexpected. The reducer built for a removal therefore carries a
//! [`RemovalToken`]. The first initialization action it sees consumes the token
//! and drops the key before delegating. The mutator clears the token as soon as
//! the swap returns.
//!
//! # Example
//!
//! ```
//! use cake_core::{Action, Registry};
//! use cake_runtime::create_store;
//! use cake_runtime::slices::{AddOutcome, SENTINEL_SLICE, SliceContext, combine_reducers};
//! use serde_json::{Value, json};
//! use std::sync::Arc;
//!
//! let context = SliceContext::new();
//! let store = create_store(Arc::new(combine_reducers(Registry::new())), None, Some(&context))?;
//!
//! let outcome = context.add_slice("product", |state: Option<&Value>, action: &Action| {
//!     let product = state.and_then(Value::as_i64).unwrap_or(1);
//!     json!(if action.is("UPDATE") { product * action.payload.as_i64().unwrap_or(1) } else { product })
//! })?;
//! assert_eq!(outcome, AddOutcome::Added);
//!
//! store.dispatch(Action::new("UPDATE").with_payload(2))?;
//! assert_eq!(store.state(|s| s["product"].clone()), json!(2));
//! assert_eq!(store.state(|s| s[SENTINEL_SLICE].clone()), Value::Null);
//!
//! context.remove_slice("product")?;
//! assert!(!store.state(|s| s.contains_key("product")));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::StoreError;
use crate::store::{Store, StoreCreator, StoreEnhancer};
use cake_core::composition::{CombinedReducer, combine_reducers as combine_slices};
use cake_core::{Action, Reducer, ReducerError, Registry, SharedReducer, State};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Key of the always-`null` slice present in every dynamic store
pub const SENTINEL_SLICE: &str = "@@redux-cake";

/// Lifecycle action types dispatched after a slice is added or removed
///
/// The action payload is the slice key.
#[derive(Debug, Clone, Copy)]
pub struct ActionTypes;

impl ActionTypes {
    /// Dispatched after a slice has been added and initialized
    pub const SLICE_ADDED: &'static str = "@@redux-cake/SLICE_ADDED";

    /// Dispatched after a slice has been removed from state
    pub const SLICE_REMOVED: &'static str = "@@redux-cake/SLICE_REMOVED";
}

/// Errors from slice management
#[derive(Error, Debug)]
pub enum SliceError {
    /// A mutator was called before any store was created with the context
    #[error(
        "Cannot call {operation}() before a store was created with this SliceContext as its enhancer: must use the enhancer first"
    )]
    EnhancerNotApplied {
        /// The mutator that was called
        operation: &'static str,
    },

    /// The store's reducer was not built by [`combine_reducers`]
    #[error(
        "Dynamic slices only work with reducers built by slices::combine_reducers: must use the provided combinator"
    )]
    MissingRegistry,

    /// The store failed while swapping reducers or dispatching
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of [`SliceContext::add_slice`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The slice was registered and initialized
    Added,
    /// A slice with that key already exists; nothing changed
    DuplicateIgnored,
}

/// Result of [`SliceContext::remove_slice`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The slice was unregistered and dropped from state
    Removed,
    /// No slice with that key exists; nothing changed
    NotFound,
}

/// The key of a slice being removed, valid for one initialization action
#[derive(Debug, PartialEq, Eq)]
pub struct RemovalToken {
    key: String,
}

impl RemovalToken {
    fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// The slice key being removed
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

fn sentinel(_state: Option<&Value>, _action: &Action) -> Value {
    Value::Null
}

/// Build a reducer that supports adding and removing slices
///
/// Accepts a [`Registry`] or `None`, which is treated as an empty registry.
/// The sentinel slice is added unless the registry already has one, so the
/// combined state is never empty.
#[must_use]
pub fn combine_reducers(registry: impl Into<Option<Registry>>) -> DynamicReducer {
    DynamicReducer::build(registry.into().unwrap_or_default(), None)
}

/// Reducer built by [`combine_reducers`]
///
/// Delegates to the host combinator and reports the registry it was built
/// from (without the sentinel) through [`Reducer::registry`].
#[derive(Debug)]
pub struct DynamicReducer {
    registry: Registry,
    combined: CombinedReducer,
    pending_removal: Mutex<Option<RemovalToken>>,
}

impl DynamicReducer {
    fn build(registry: Registry, pending_removal: Option<RemovalToken>) -> Self {
        let slices = if registry.contains(SENTINEL_SLICE) {
            registry.clone()
        } else {
            registry.with_slice(SENTINEL_SLICE, Arc::new(sentinel))
        };

        Self {
            registry,
            combined: combine_slices(slices),
            pending_removal: Mutex::new(pending_removal),
        }
    }

    /// The pending removal, if it has not been consumed yet
    #[must_use]
    pub fn pending_removal(&self) -> Option<String> {
        self.lock_pending()
            .as_ref()
            .map(|token| token.key().to_string())
    }

    /// Drop the pending removal, returning it if it was never consumed
    pub fn clear_pending_removal(&self) -> Option<RemovalToken> {
        self.lock_pending().take()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<RemovalToken>> {
        self.pending_removal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Reducer for DynamicReducer {
    fn reduce(&self, state: Option<State>, action: &Action) -> Result<State, ReducerError> {
        let mut state = state;

        if action.is_init() {
            if let Some(token) = self.clear_pending_removal() {
                if let Some(state) = state.as_mut() {
                    state.remove(token.key());
                }
                tracing::trace!(slice = token.key(), "Dropped removed slice before initialization");
            }
        }

        Reducer::reduce(&self.combined, state, action)
    }

    fn registry(&self) -> Option<&Registry> {
        Some(&self.registry)
    }
}

/// A store together with the registry its reducer was built from
struct Attachment {
    store: Store,
    registry: Registry,
}

/// Owns the registry of a dynamic store and mutates it
///
/// Use the context as the enhancer when creating the store, then call
/// [`add_slice`](Self::add_slice) and [`remove_slice`](Self::remove_slice).
/// Each context tracks the most recent store created through it.
///
/// Mutators on a shared context run one at a time. They must not be called
/// from inside a reducer.
#[derive(Default)]
pub struct SliceContext {
    attachment: Mutex<Option<Attachment>>,
    /// Held for the whole read, swap and dispatch of a mutation
    mutation: Mutex<()>,
}

impl SliceContext {
    /// Create a context with no store attached
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The attached store, if a store has been created with this context
    #[must_use]
    pub fn store(&self) -> Option<Store> {
        self.lock().as_ref().map(|attachment| attachment.store.clone())
    }

    /// The current registry, without the sentinel slice
    #[must_use]
    pub fn registry(&self) -> Option<Registry> {
        self.lock()
            .as_ref()
            .map(|attachment| attachment.registry.clone())
    }

    /// Registered slice keys, without the sentinel slice
    #[must_use]
    pub fn slice_keys(&self) -> Vec<String> {
        self.registry()
            .map(|registry| registry.keys().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Register a new slice and initialize it in the store
    ///
    /// Adding a key that already exists is not an error: it logs a warning,
    /// changes nothing and returns [`AddOutcome::DuplicateIgnored`].
    ///
    /// If a reducer fails on the initialization action, the previous reducer
    /// is restored and the registry is left as it was.
    ///
    /// # Errors
    ///
    /// - [`SliceError::EnhancerNotApplied`] if no store was created with this context
    /// - [`SliceError::Store`] if a reducer fails during the swap or the
    ///   lifecycle dispatch
    #[tracing::instrument(skip(self, key, reducer), fields(slice = tracing::field::Empty))]
    pub fn add_slice<R>(&self, key: impl Into<String>, reducer: R) -> Result<AddOutcome, SliceError>
    where
        R: cake_core::SliceReducer + 'static,
    {
        let key = key.into();
        tracing::Span::current().record("slice", key.as_str());

        let _mutation = self.lock_mutation();
        let (store, registry) = self.attached("add_slice")?;

        if key == SENTINEL_SLICE || registry.contains(&key) {
            tracing::warn!("There is already a slice with key \"{key}\". This slice was ignored.");
            metrics::counter!(crate::metrics::SLICES_DUPLICATE_IGNORED).increment(1);
            return Ok(AddOutcome::DuplicateIgnored);
        }

        let registry = registry.with_slice(key.clone(), Arc::new(reducer));
        swap(&store, &Arc::new(DynamicReducer::build(registry.clone(), None)))?;
        self.set_registry(registry);

        store.dispatch(Action::new(ActionTypes::SLICE_ADDED).with_payload(key))?;

        metrics::counter!(crate::metrics::SLICES_ADDED).increment(1);
        tracing::debug!("Slice added");
        Ok(AddOutcome::Added)
    }

    /// Unregister a slice and drop its state
    ///
    /// Removing a key that does not exist is a silent no-op returning
    /// [`RemoveOutcome::NotFound`].
    ///
    /// If a reducer fails on the initialization action, the previous reducer
    /// is restored and the slice stays registered, with its state intact.
    ///
    /// # Errors
    ///
    /// - [`SliceError::EnhancerNotApplied`] if no store was created with this context
    /// - [`SliceError::Store`] if a reducer fails during the swap or the
    ///   lifecycle dispatch
    #[tracing::instrument(skip_all, fields(slice = %key))]
    pub fn remove_slice(&self, key: &str) -> Result<RemoveOutcome, SliceError> {
        let _mutation = self.lock_mutation();
        let (store, registry) = self.attached("remove_slice")?;

        if !registry.contains(key) {
            return Ok(RemoveOutcome::NotFound);
        }

        let registry = registry.without_slice(key);
        swap(
            &store,
            &Arc::new(DynamicReducer::build(registry.clone(), Some(RemovalToken::new(key)))),
        )?;
        self.set_registry(registry);

        store.dispatch(Action::new(ActionTypes::SLICE_REMOVED).with_payload(key))?;

        metrics::counter!(crate::metrics::SLICES_REMOVED).increment(1);
        tracing::debug!("Slice removed");
        Ok(RemoveOutcome::Removed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Attachment>> {
        self.attachment.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_mutation(&self) -> std::sync::MutexGuard<'_, ()> {
        self.mutation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attached(&self, operation: &'static str) -> Result<(Store, Registry), SliceError> {
        self.lock()
            .as_ref()
            .map(|attachment| (attachment.store.clone(), attachment.registry.clone()))
            .ok_or(SliceError::EnhancerNotApplied { operation })
    }

    fn set_registry(&self, registry: Registry) {
        if let Some(attachment) = self.lock().as_mut() {
            attachment.registry = registry;
        }
    }
}

/// Install `reducer` on `store`, restoring the previous reducer if it fails to initialize
fn swap(store: &Store, reducer: &Arc<DynamicReducer>) -> Result<(), StoreError> {
    let previous = store.reducer();
    let swapped = store.replace_reducer(Arc::clone(reducer) as SharedReducer);

    // The token is only meaningful for the swap's own initialization
    if let Some(unused) = reducer.clear_pending_removal() {
        tracing::warn!(
            slice = unused.key(),
            "Reducer replacement did not initialize; removal token discarded"
        );
    }

    if let Err(error) = swapped {
        store.install_reducer(previous);
        tracing::warn!(%error, "Reducer failed to initialize; previous reducer restored");
        return Err(error);
    }
    Ok(())
}

impl StoreEnhancer for SliceContext {
    fn enhance(
        &self,
        next: &dyn StoreCreator,
        reducer: SharedReducer,
        preloaded_state: Option<State>,
    ) -> Result<Store, StoreError> {
        let registry = reducer
            .registry()
            .cloned()
            .ok_or_else(|| StoreError::enhancer(SliceError::MissingRegistry))?;

        let _mutation = self.lock_mutation();
        let store = next.create_store(reducer, preloaded_state)?;
        tracing::debug!(slices = registry.len(), "Slice context attached to store");

        *self.lock() = Some(Attachment {
            store: store.clone(),
            registry,
        });
        Ok(store)
    }
}

impl std::fmt::Debug for SliceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry();
        f.debug_struct("SliceContext")
            .field("attached", &registry.is_some())
            .field("slices", &registry)
            .finish()
    }
}
