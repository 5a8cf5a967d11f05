//! The Store and store creation
//!
//! A [`Store`] owns the current [`State`] and the active reducer. Everything
//! runs synchronously: `dispatch` returns once the reducer has produced the
//! next state and the action has been broadcast to subscribers.
//!
//! Stores are built through a [`StoreCreator`]. A [`StoreEnhancer`] wraps
//! creation to observe or adjust it, and [`compose`] chains several.

use crate::StoreConfig;
use crate::error::StoreError;
use cake_core::{Action, Reducer, SharedReducer, State};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, ThreadId};
use tokio::sync::broadcast;

/// The Store - holds state and runs the active reducer
///
/// `Store` is a cheap handle: clones share the same state, reducer and
/// subscribers.
///
/// # Example
///
/// ```
/// use cake_core::{Action, Registry, composition::combine_reducers};
/// use cake_runtime::Store;
/// use serde_json::{Value, json};
///
/// let reducer = combine_reducers(Registry::new().slice("hits", |state: Option<&Value>, action: &Action| {
///     let hits = state.and_then(Value::as_i64).unwrap_or(0);
///     json!(if action.is("HIT") { hits + 1 } else { hits })
/// }));
///
/// let store = Store::new(reducer)?;
/// store.dispatch(Action::new("HIT"))?;
/// assert_eq!(store.state(|s| s["hits"].clone()), json!(1));
/// # Ok::<(), cake_runtime::StoreError>(())
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    /// `None` only before the first initialization action completes
    state: RwLock<Option<State>>,
    reducer: RwLock<SharedReducer>,
    /// Serializes dispatches: read, reduce, write and broadcast
    dispatch_lock: Mutex<()>,
    /// Thread currently running a reducer
    dispatching: Mutex<Option<ThreadId>>,
    action_broadcast: broadcast::Sender<Action>,
    config: StoreConfig,
}

/// Marks the current thread as dispatching until dropped, even on error
struct DispatchGuard<'a> {
    owner: &'a Mutex<Option<ThreadId>>,
    _serial: MutexGuard<'a, ()>,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Store {
    /// Create a store with no preloaded state and no enhancer
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Reducer`] if the reducer fails on the
    /// initialization action.
    pub fn new(reducer: impl Reducer + 'static) -> Result<Self, StoreError> {
        create_store(Arc::new(reducer), None, None)
    }

    fn build(reducer: SharedReducer, preloaded_state: Option<State>, config: StoreConfig) -> Self {
        let (action_broadcast, _) = broadcast::channel(config.action_broadcast_capacity.max(1));

        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(preloaded_state),
                reducer: RwLock::new(reducer),
                dispatch_lock: Mutex::new(()),
                dispatching: Mutex::new(None),
                action_broadcast,
                config,
            }),
        }
    }

    /// Read the current state through a closure
    ///
    /// Before the first action the state is empty.
    pub fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&State) -> T,
    {
        let guard = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(state) => f(state),
            None => f(&State::new()),
        }
    }

    /// A copy of the current state
    #[must_use]
    pub fn snapshot(&self) -> State {
        self.state(Clone::clone)
    }

    /// The active reducer
    #[must_use]
    pub fn reducer(&self) -> SharedReducer {
        Arc::clone(&self.inner.reducer.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// The configuration this store was created with
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Send an action through the active reducer
    ///
    /// On success the reducer's result becomes the new state, the action is
    /// broadcast to every [`subscribe_actions`](Self::subscribe_actions)
    /// receiver, and the action is returned.
    ///
    /// Dispatches from several threads run one at a time, in lock order.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DispatchInProgress`] if called from inside a reducer
    /// - [`StoreError::Reducer`] if the reducer fails; the state is unchanged
    #[tracing::instrument(skip(self, action), fields(store = %self.inner.config.label, action = %action.kind))]
    pub fn dispatch(&self, action: Action) -> Result<Action, StoreError> {
        let _guard = self.begin_dispatch()?;

        let reducer = self.reducer();
        let previous = self
            .inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let next = reducer.reduce(previous, &action)?;
        tracing::trace!(slices = next.len(), "Reducer completed");

        *self.inner.state.write().unwrap_or_else(PoisonError::into_inner) = Some(next);

        metrics::counter!(crate::metrics::ACTIONS_DISPATCHED).increment(1);
        tracing::debug!("Action dispatched");

        // No subscribers is not an error
        let _ = self.inner.action_broadcast.send(action.clone());

        Ok(action)
    }

    /// Reject re-entrant dispatch, then wait for any other thread's dispatch
    fn begin_dispatch(&self) -> Result<DispatchGuard<'_>, StoreError> {
        let current = thread::current().id();
        let owner = &self.inner.dispatching;

        if *owner.lock().unwrap_or_else(PoisonError::into_inner) == Some(current) {
            tracing::warn!("Rejected action: reducers may not dispatch actions");
            return Err(StoreError::DispatchInProgress);
        }

        let serial = self
            .inner
            .dispatch_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *owner.lock().unwrap_or_else(PoisonError::into_inner) = Some(current);

        Ok(DispatchGuard {
            owner,
            _serial: serial,
        })
    }

    /// Install a new reducer and initialize it
    ///
    /// The new reducer is active as soon as this is called. The store then
    /// dispatches exactly one initialization action, synchronously, before
    /// returning, so slices the new reducer introduces get their default state.
    ///
    /// # Errors
    ///
    /// Returns any error from dispatching the initialization action. The new
    /// reducer stays installed.
    #[tracing::instrument(skip(self, reducer), fields(store = %self.inner.config.label))]
    pub fn replace_reducer(&self, reducer: SharedReducer) -> Result<(), StoreError> {
        self.install_reducer(reducer);

        metrics::counter!(crate::metrics::REDUCER_REPLACEMENTS).increment(1);
        tracing::debug!("Reducer replaced");

        self.dispatch(Action::init())?;
        Ok(())
    }

    /// Install a reducer without initializing it, returning the previous one
    pub(crate) fn install_reducer(&self, reducer: SharedReducer) -> SharedReducer {
        let mut active = self.inner.reducer.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *active, reducer)
    }

    /// Subscribe to every action dispatched from now on
    ///
    /// Initialization actions and slice lifecycle actions are included. The
    /// receiver can be drained synchronously with `try_recv`; no async runtime
    /// is needed. A receiver that falls more than
    /// [`StoreConfig::action_broadcast_capacity`] actions behind skips the
    /// oldest ones.
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<Action> {
        self.inner.action_broadcast.subscribe()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("label", &self.inner.config.label)
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

/// Something that can build a store
///
/// This is the "next" step an enhancer delegates to.
pub trait StoreCreator {
    /// Build a store from a reducer and optional preloaded state
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be created.
    fn create_store(
        &self,
        reducer: SharedReducer,
        preloaded_state: Option<State>,
    ) -> Result<Store, StoreError>;
}

/// Wraps store creation
///
/// An enhancer receives the next creator plus the creation arguments. It may
/// inspect or replace the arguments, call `next`, and observe or wrap the
/// resulting store. Closures with the matching signature are enhancers.
///
/// # Example
///
/// ```
/// use cake_core::{Action, ReducerError, SharedReducer, State};
/// use cake_runtime::{StoreCreator, StoreError, create_store};
/// use std::sync::Arc;
///
/// let preload = |next: &dyn StoreCreator, reducer: SharedReducer, _: Option<State>| {
///     let mut state = State::new();
///     state.insert("greeting".into(), "hello".into());
///     next.create_store(reducer, Some(state))
/// };
///
/// let keep = |state: Option<State>, _: &Action| Ok::<_, ReducerError>(state.unwrap_or_default());
/// let store = create_store(Arc::new(keep), None, Some(&preload))?;
/// assert_eq!(store.state(|s| s["greeting"].clone()), "hello");
/// # Ok::<(), StoreError>(())
/// ```
pub trait StoreEnhancer: Send + Sync {
    /// Create a store, delegating to `next`
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the enhancer rejects the arguments or
    /// `next` fails.
    fn enhance(
        &self,
        next: &dyn StoreCreator,
        reducer: SharedReducer,
        preloaded_state: Option<State>,
    ) -> Result<Store, StoreError>;
}

impl<F> StoreEnhancer for F
where
    F: Fn(&dyn StoreCreator, SharedReducer, Option<State>) -> Result<Store, StoreError> + Send + Sync,
{
    fn enhance(
        &self,
        next: &dyn StoreCreator,
        reducer: SharedReducer,
        preloaded_state: Option<State>,
    ) -> Result<Store, StoreError> {
        self(next, reducer, preloaded_state)
    }
}

/// The innermost creator: builds the store and runs the first initialization
#[derive(Debug, Clone, Default)]
pub struct BaseCreator {
    config: StoreConfig,
}

impl BaseCreator {
    /// Create a base creator that builds stores with `config`
    #[must_use]
    pub const fn new(config: StoreConfig) -> Self {
        Self { config }
    }
}

impl StoreCreator for BaseCreator {
    fn create_store(
        &self,
        reducer: SharedReducer,
        preloaded_state: Option<State>,
    ) -> Result<Store, StoreError> {
        let store = Store::build(reducer, preloaded_state, self.config.clone());
        tracing::debug!(store = %self.config.label, "Store created");

        store.dispatch(Action::init())?;
        Ok(store)
    }
}

/// Create a store with the default configuration
///
/// With an enhancer, creation is handed to the enhancer with a
/// [`BaseCreator`] as its `next` step.
///
/// # Errors
///
/// Returns [`StoreError::Enhancer`] if the enhancer rejects the arguments, or
/// [`StoreError::Reducer`] if the reducer fails on the initialization action.
pub fn create_store(
    reducer: SharedReducer,
    preloaded_state: Option<State>,
    enhancer: Option<&dyn StoreEnhancer>,
) -> Result<Store, StoreError> {
    create_store_with_config(reducer, preloaded_state, enhancer, StoreConfig::default())
}

/// Create a store with an explicit configuration
///
/// # Errors
///
/// Same as [`create_store`].
pub fn create_store_with_config(
    reducer: SharedReducer,
    preloaded_state: Option<State>,
    enhancer: Option<&dyn StoreEnhancer>,
    config: StoreConfig,
) -> Result<Store, StoreError> {
    let base = BaseCreator::new(config);
    match enhancer {
        Some(enhancer) => enhancer.enhance(&base, reducer, preloaded_state),
        None => base.create_store(reducer, preloaded_state),
    }
}

/// Chain enhancers into one
///
/// The first enhancer is outermost: it runs first and receives a `next`
/// that runs the rest of the chain.
#[must_use]
pub fn compose(enhancers: Vec<Arc<dyn StoreEnhancer>>) -> Composed {
    Composed { enhancers }
}

/// Several enhancers acting as one
///
/// Created by [`compose`].
pub struct Composed {
    enhancers: Vec<Arc<dyn StoreEnhancer>>,
}

impl StoreEnhancer for Composed {
    fn enhance(
        &self,
        next: &dyn StoreCreator,
        reducer: SharedReducer,
        preloaded_state: Option<State>,
    ) -> Result<Store, StoreError> {
        Chain {
            enhancers: &self.enhancers,
            base: next,
        }
        .create_store(reducer, preloaded_state)
    }
}

/// The remaining links of a composed enhancer chain
struct Chain<'a> {
    enhancers: &'a [Arc<dyn StoreEnhancer>],
    base: &'a dyn StoreCreator,
}

impl StoreCreator for Chain<'_> {
    fn create_store(
        &self,
        reducer: SharedReducer,
        preloaded_state: Option<State>,
    ) -> Result<Store, StoreError> {
        match self.enhancers.split_first() {
            Some((first, rest)) => {
                let next = Chain {
                    enhancers: rest,
                    base: self.base,
                };
                first.enhance(&next, reducer, preloaded_state)
            },
            None => self.base.create_store(reducer, preloaded_state),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use cake_core::{Registry, ReducerError, composition::combine_reducers, fallible};
    use serde_json::{Value, json};
    use std::sync::Mutex;

    fn hits(state: Option<&Value>, action: &Action) -> Value {
        let hits = state.and_then(Value::as_i64).unwrap_or(0);
        json!(if action.is("HIT") { hits + 1 } else { hits })
    }

    fn hits_store() -> Store {
        Store::new(combine_reducers(Registry::new().slice("hits", hits))).unwrap()
    }

    #[test]
    fn test_store_creation_initializes_state() {
        let store = hits_store();
        assert_eq!(store.state(|s| s["hits"].clone()), json!(0));
    }

    #[test]
    fn test_dispatch_returns_action() {
        let store = hits_store();
        let action = store.dispatch(Action::new("HIT").with_payload("x")).unwrap();

        assert_eq!(action, Action::new("HIT").with_payload("x"));
        assert_eq!(store.state(|s| s["hits"].clone()), json!(1));
    }

    #[test]
    fn test_preloaded_state_is_passed_to_reducer() {
        let mut preloaded = State::new();
        preloaded.insert("hits".into(), json!(41));

        let store = create_store(
            Arc::new(combine_reducers(Registry::new().slice("hits", hits))),
            Some(preloaded),
            None,
        )
        .unwrap();
        store.dispatch(Action::new("HIT")).unwrap();

        assert_eq!(store.state(|s| s["hits"].clone()), json!(42));
    }

    #[test]
    fn test_reducer_error_leaves_state_unchanged() {
        let registry = Registry::new().slice("hits", hits).with_reducer(
            "guard",
            fallible(|_: Option<&Value>, action: &Action| {
                if action.is("BOOM") {
                    Err(ReducerError::rejected("guard tripped"))
                } else {
                    Ok(Value::Null)
                }
            }),
        );
        let store = Store::new(combine_reducers(registry)).unwrap();
        store.dispatch(Action::new("HIT")).unwrap();

        let err = store.dispatch(Action::new("BOOM")).unwrap_err();
        assert!(matches!(err, StoreError::Reducer(ReducerError::Rejected(_))));
        assert_eq!(store.state(|s| s["hits"].clone()), json!(1));

        // The store keeps working after a failed dispatch
        store.dispatch(Action::new("HIT")).unwrap();
        assert_eq!(store.state(|s| s["hits"].clone()), json!(2));
    }

    #[test]
    fn test_replace_reducer_dispatches_one_init() {
        let store = hits_store();
        let mut receiver = store.subscribe_actions();

        let next = combine_reducers(Registry::new().slice("hits", hits).slice("misses", hits));
        store.replace_reducer(Arc::new(next)).unwrap();

        let first = receiver.try_recv().unwrap();
        assert!(first.is_init());
        assert!(receiver.try_recv().is_err());
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn test_reducer_cannot_dispatch() {
        let slot: Arc<Mutex<Option<Store>>> = Arc::new(Mutex::new(None));
        let seen: Arc<Mutex<Option<StoreError>>> = Arc::new(Mutex::new(None));

        let reducer = {
            let slot = Arc::clone(&slot);
            let seen = Arc::clone(&seen);
            move |state: Option<State>, action: &Action| {
                if action.is("NESTED") {
                    if let Some(store) = slot.lock().unwrap().as_ref() {
                        *seen.lock().unwrap() = store.dispatch(Action::new("INNER")).err();
                    }
                }
                Ok::<_, ReducerError>(state.unwrap_or_default())
            }
        };

        let store = Store::new(reducer).unwrap();
        *slot.lock().unwrap() = Some(store.clone());
        store.dispatch(Action::new("NESTED")).unwrap();

        let err = seen.lock().unwrap().take().expect("inner dispatch should fail");
        assert!(matches!(err, StoreError::DispatchInProgress));

        // The guard resets once the outer dispatch finishes
        store.dispatch(Action::new("AFTER")).unwrap();
    }

    #[test]
    fn test_concurrent_dispatches_are_serialized() {
        let store = Store::new(combine_reducers(
            Registry::new().slice("hits", hits).slice("total", |state: Option<&Value>, action: &Action| {
                let total = state.and_then(Value::as_i64).unwrap_or(0);
                json!(total + action.payload.as_i64().unwrap_or(0))
            }),
        ))
        .unwrap();

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        store.dispatch(Action::new("HIT").with_payload(1)).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(store.state(|s| s["hits"].clone()), json!(4000));
        assert_eq!(store.state(|s| s["total"].clone()), json!(4000));
    }

    #[test]
    fn test_dispatch_from_another_thread() {
        let store = hits_store();
        let handle = {
            let store = store.clone();
            std::thread::spawn(move || store.dispatch(Action::new("HIT")).map(|_| ()))
        };

        handle.join().unwrap().unwrap();
        store.dispatch(Action::new("HIT")).unwrap();
        assert_eq!(store.state(|s| s["hits"].clone()), json!(2));
    }

    #[test]
    fn test_enhancer_can_preload_state() {
        let preload = |next: &dyn StoreCreator, reducer: SharedReducer, _: Option<State>| {
            let mut state = State::new();
            state.insert("hits".into(), json!(10));
            next.create_store(reducer, Some(state))
        };

        let store = create_store(
            Arc::new(combine_reducers(Registry::new().slice("hits", hits))),
            None,
            Some(&preload),
        )
        .unwrap();

        assert_eq!(store.state(|s| s["hits"].clone()), json!(10));
    }

    #[test]
    fn test_compose_runs_outermost_first() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let tracker = |name: &'static str| -> Arc<dyn StoreEnhancer> {
            let order = Arc::clone(&order);
            Arc::new(
                move |next: &dyn StoreCreator, reducer: SharedReducer, preloaded: Option<State>| {
                    order.lock().unwrap().push(name);
                    next.create_store(reducer, preloaded)
                },
            )
        };

        let composed = compose(vec![tracker("outer"), tracker("inner")]);
        create_store(
            Arc::new(combine_reducers(Registry::new().slice("hits", hits))),
            None,
            Some(&composed),
        )
        .unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_config_label_is_kept() {
        let store = create_store_with_config(
            Arc::new(combine_reducers(Registry::new().slice("hits", hits))),
            None,
            None,
            StoreConfig::default().with_label("catalog"),
        )
        .unwrap();

        assert_eq!(store.config().label, "catalog");
        assert!(format!("{store:?}").contains("catalog"));
    }
}
