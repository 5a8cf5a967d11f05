//! Slices demo binary
//!
//! Adds and removes a slice on a running store and prints what happens.

use cake_core::{Action, Registry};
use cake_runtime::metrics::MetricsRecorder;
use cake_runtime::slices::{SliceContext, combine_reducers};
use cake_runtime::{StoreConfig, create_store_with_config};
use slices_demo::{ADD_ITEM, SAVE_FOR_LATER, cart, wishlist};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slices_demo=debug,cake_runtime=debug,cake_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let recorder = MetricsRecorder::install()?;
    tracing::info!("Metrics recorder ready");

    println!("=== Slices Demo: features that bring their own state ===\n");

    let context = SliceContext::new();
    let store = create_store_with_config(
        Arc::new(combine_reducers(Registry::new().slice("cart", cart))),
        None,
        Some(&context),
        StoreConfig::default().with_label("shop"),
    )?;
    let mut actions = store.subscribe_actions();

    println!("Initial state: {}", serde_json::to_string(&store.snapshot())?);

    println!("\n>>> Dispatching: {ADD_ITEM} \"tea\"");
    store.dispatch(Action::new(ADD_ITEM).with_payload("tea"))?;
    println!("State: {}", serde_json::to_string(&store.snapshot())?);

    println!("\n>>> Opening the wishlist feature");
    let outcome = context.add_slice("wishlist", wishlist)?;
    println!("add_slice: {outcome:?}");
    store.dispatch(Action::new(SAVE_FOR_LATER).with_payload("biscuits"))?;
    println!("State: {}", serde_json::to_string(&store.snapshot())?);

    println!("\n>>> Opening the wishlist feature again");
    let outcome = context.add_slice("wishlist", wishlist)?;
    println!("add_slice: {outcome:?}");

    println!("\n>>> Leaving the wishlist feature");
    let outcome = context.remove_slice("wishlist")?;
    println!("remove_slice: {outcome:?}");
    println!("State: {}", serde_json::to_string(&store.snapshot())?);

    println!("\nActions seen by subscribers:");
    while let Ok(action) = actions.try_recv() {
        println!("  • {} {}", action.kind, action.payload);
    }

    println!("\nMetrics:\n{}", recorder.render());

    println!("=== Demo Complete ===");
    Ok(())
}
