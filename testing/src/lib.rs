//! # Cake Testing
//!
//! Testing utilities and helpers for Cake stores and slice reducers.
//!
//! This crate provides:
//! - Fixture slice reducers and state builders
//! - A Given-When-Then harness for top-level reducers ([`ReducerTest`])
//! - Log capture for asserting on `tracing` output
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use cake_runtime::slices::{SliceContext, combine_reducers};
//! use cake_testing::{capture_logs, fixtures};
//!
//! #[test]
//! fn removing_a_slice_is_quiet() {
//!     let context = SliceContext::new();
//!     let store = create_store(Arc::new(combine_reducers(None)), None, Some(&context))?;
//!     context.add_slice("sum", fixtures::adder("ADD", 0))?;
//!
//!     let (_, logs) = capture_logs(|| context.remove_slice("sum"));
//!     assert!(!logs.contains("Unexpected key"));
//! }
//! ```


pub use reducer_test::ReducerTest;

/// Fixture slice reducers and state builders
///
/// The reducers here read numbers from the action payload, which keeps test
/// actions short: `Action::new("ADD").with_payload(3)`.
pub mod fixtures {
    use cake_core::{Action, State};
    use serde_json::{Value, json};

    /// Slice reducer that starts at `initial` and adds the payload on `kind`
    pub fn adder(
        kind: &'static str,
        initial: i64,
    ) -> impl Fn(Option<&Value>, &Action) -> Value + Send + Sync + Clone + 'static {
        move |state: Option<&Value>, action: &Action| {
            let current = state.and_then(Value::as_i64).unwrap_or(initial);
            if action.is(kind) {
                json!(current + action.payload.as_i64().unwrap_or(0))
            } else {
                json!(current)
            }
        }
    }

    /// Slice reducer that starts at `initial` and multiplies by the payload on `kind`
    pub fn multiplier(
        kind: &'static str,
        initial: i64,
    ) -> impl Fn(Option<&Value>, &Action) -> Value + Send + Sync + Clone + 'static {
        move |state: Option<&Value>, action: &Action| {
            let current = state.and_then(Value::as_i64).unwrap_or(initial);
            if action.is(kind) {
                json!(current * action.payload.as_i64().unwrap_or(1))
            } else {
                json!(current)
            }
        }
    }

    /// Slice reducer that keeps whatever it is given, defaulting to `null`
    pub fn identity(state: Option<&Value>, _action: &Action) -> Value {
        state.cloned().unwrap_or(Value::Null)
    }

    /// Build a state mapping from key/value pairs
    #[must_use]
    pub fn state(pairs: &[(&str, Value)]) -> State {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect()
    }
}

/// Capture `tracing` output produced while running a closure
///
/// Reducers and stores report diagnostics through `tracing` rather than
/// return values, so tests that need to prove a warning did (or did not) fire
/// run the code under a capturing subscriber.
pub mod logs {
    use std::io;
    use std::sync::{Arc, Mutex, PoisonError};
    use tracing_subscriber::fmt::MakeWriter;

    /// Shared in-memory sink for formatted log lines
    #[derive(Debug, Clone, Default)]
    pub struct LogBuffer {
        bytes: Arc<Mutex<Vec<u8>>>,
    }

    impl LogBuffer {
        /// Everything written so far, lossily decoded as UTF-8
        #[must_use]
        pub fn contents(&self) -> String {
            let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.bytes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Run `f` with a thread-local subscriber and return its result with the logs
    ///
    /// Captures every level down to `DEBUG`, without ANSI colors or timestamps.
    pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .without_time()
            .finish();

        let result = tracing::subscriber::with_default(subscriber, f);
        (result, buffer.contents())
    }
}

/// Helpers for observing store activity
pub mod helpers {
    use cake_core::Action;
    use tokio::sync::broadcast::{Receiver, error::TryRecvError};

    /// Drain every action currently buffered in a store subscription
    ///
    /// Lagged receivers skip the lost actions and keep draining.
    pub fn drain_actions(receiver: &mut Receiver<Action>) -> Vec<Action> {
        let mut actions = Vec::new();
        loop {
            match receiver.try_recv() {
                Ok(action) => actions.push(action),
                Err(TryRecvError::Lagged(_)) => {},
                Err(TryRecvError::Empty | TryRecvError::Closed) => return actions,
            }
        }
    }

    /// The types of the given actions, for compact assertions
    #[must_use]
    pub fn action_types(actions: &[Action]) -> Vec<&str> {
        actions.iter().map(|action| action.kind.as_ref()).collect()
    }
}

/// Property-based testing utilities
///
/// Strategies for generating slice keys and key sets with proptest.
pub mod properties {
    use proptest::collection::btree_set;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    /// A plausible slice key: lowercase, starting with a letter
    pub fn slice_key() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,11}"
    }

    /// A set of up to `max` distinct slice keys
    pub fn slice_keys(max: usize) -> impl Strategy<Value = BTreeSet<String>> {
        btree_set(slice_key(), 0..=max)
    }
}

pub use helpers::{action_types, drain_actions};
pub use logs::capture_logs;
