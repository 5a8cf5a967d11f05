//! # Slices Demo
//!
//! A shop page whose features load lazily, each bringing its own slice.
//!
//! The store starts with a `cart` slice only. The `wishlist` feature is
//! added once the user opens it and removed when they leave, taking its state
//! with it.
//!
//! ## Example
//!
//! ```
//! use cake_core::{Action, Registry};
//! use cake_runtime::{create_store, slices::{SliceContext, combine_reducers}};
//! use slices_demo::{ADD_ITEM, cart, wishlist};
//! use std::sync::Arc;
//!
//! let context = SliceContext::new();
//! let store = create_store(
//!     Arc::new(combine_reducers(Registry::new().slice("cart", cart))),
//!     None,
//!     Some(&context),
//! )?;
//!
//! context.add_slice("wishlist", wishlist)?;
//! store.dispatch(Action::new(ADD_ITEM).with_payload("tea"))?;
//!
//! assert_eq!(store.state(|s| s["cart"]["items"].clone()), serde_json::json!(["tea"]));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use cake_core::Action;
use serde_json::{Value, json};

/// Put an item (the payload) in the cart
pub const ADD_ITEM: &str = "cart/ADD_ITEM";

/// Empty the cart
pub const CLEAR_CART: &str = "cart/CLEAR";

/// Save an item (the payload) for later
pub const SAVE_FOR_LATER: &str = "wishlist/SAVE";

/// Cart slice: `{ "items": [...] }`
pub fn cart(state: Option<&Value>, action: &Action) -> Value {
    let mut items = items(state);

    if action.is(ADD_ITEM) {
        items.push(action.payload.clone());
    } else if action.is(CLEAR_CART) {
        items.clear();
    }

    json!({ "items": items })
}

/// Wishlist slice: `{ "items": [...] }`, without repeats
pub fn wishlist(state: Option<&Value>, action: &Action) -> Value {
    let mut items = items(state);

    if action.is(SAVE_FOR_LATER) && !items.contains(&action.payload) {
        items.push(action.payload.clone());
    }

    json!({ "items": items })
}

fn items(state: Option<&Value>) -> Vec<Value> {
    state
        .and_then(|state| state.get("items"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_starts_empty() {
        assert_eq!(cart(None, &Action::init()), json!({ "items": [] }));
    }

    #[test]
    fn test_cart_adds_and_clears() {
        let state = cart(None, &Action::new(ADD_ITEM).with_payload("tea"));
        let state = cart(Some(&state), &Action::new(ADD_ITEM).with_payload("milk"));
        assert_eq!(state, json!({ "items": ["tea", "milk"] }));

        assert_eq!(cart(Some(&state), &Action::new(CLEAR_CART)), json!({ "items": [] }));
    }

    #[test]
    fn test_wishlist_ignores_repeats() {
        let save = Action::new(SAVE_FOR_LATER).with_payload("tea");
        let state = wishlist(None, &save);
        let state = wishlist(Some(&state), &save);
        assert_eq!(state, json!({ "items": ["tea"] }));
    }
}
