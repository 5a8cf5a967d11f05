//! Store and slice benchmarks
//!
//! Measures the costs that dynamic slices add to a store:
//! - Combinator execution with and without the dynamic layer
//! - Dispatch throughput as the number of slices grows
//! - A full add/remove cycle on a running store
//!
//! Run with: `cargo bench`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used)] // Benchmarks can use expect for setup

use cake_core::{Action, Reducer, Registry, composition};
use cake_runtime::slices::{SliceContext, combine_reducers};
use cake_runtime::{Store, create_store};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::sync::Arc;

fn counter(state: Option<&Value>, action: &Action) -> Value {
    let count = state.and_then(Value::as_i64).unwrap_or(0);
    if action.is("INCREMENT") {
        json!(count + 1)
    } else {
        json!(count)
    }
}

fn registry(slices: usize) -> Registry {
    (0..slices).fold(Registry::new(), |registry, index| {
        registry.slice(format!("slice_{index}"), counter)
    })
}

/// Benchmark one reduction with the host combinator and the dynamic combinator
fn benchmark_combinators(c: &mut Criterion) {
    let mut group = c.benchmark_group("combinator");
    group.throughput(Throughput::Elements(1));

    let host = composition::combine_reducers(registry(8));
    let dynamic = combine_reducers(registry(8));
    let state = Reducer::reduce(&host, None, &Action::init()).expect("host init");
    let action = Action::new("INCREMENT");

    group.bench_function("host", |b| {
        b.iter(|| Reducer::reduce(&host, Some(black_box(state.clone())), &action));
    });

    group.bench_function("dynamic", |b| {
        b.iter(|| Reducer::reduce(&dynamic, Some(black_box(state.clone())), &action));
    });

    group.finish();
}

/// Benchmark store dispatch throughput as slices are added
fn benchmark_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(1));

    for slices in [1, 16, 128] {
        let store = Store::new(combine_reducers(registry(slices))).expect("store");

        group.bench_with_input(BenchmarkId::from_parameter(slices), &slices, |b, _| {
            b.iter(|| store.dispatch(black_box(Action::new("INCREMENT"))));
        });
    }

    group.finish();
}

/// Benchmark a full add/remove cycle on a running store
fn benchmark_slice_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("slice_lifecycle");

    for slices in [1, 16, 128] {
        let context = SliceContext::new();
        create_store(
            Arc::new(combine_reducers(registry(slices))),
            None,
            Some(&context),
        )
        .expect("store");

        group.bench_with_input(BenchmarkId::from_parameter(slices), &slices, |b, _| {
            b.iter(|| {
                context.add_slice("transient", counter).expect("add");
                context.remove_slice("transient").expect("remove");
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_combinators,
    benchmark_dispatch,
    benchmark_slice_lifecycle
);
criterion_main!(benches);
