//! Axon Store - reactive property store with a fixed key registry.
//!
//! This crate provides:
//! - A fixed set of named properties, declared once at construction
//! - Values shared out by reference (`Arc`), never cloned or diffed
//! - Ordered, synchronous subscriber notification on every write
//! - Three write paths: single-key, batched, and update-function
//!
//! # Architecture
//!
//! A [`Store`] is constructed from its complete key→value map; keys can never
//! be added or removed afterwards, only written. Every write runs the key's
//! subscribers with `(current, previous)` on the writer's own call stack,
//! whether or not the value changed. Batched writes via
//! [`Store::set_many`] apply every assignment before the first notification,
//! so subscribers always observe the full post-batch state.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use axon_store::{PropertyHandler, Store};
//! use serde_json::{Value, json};
//!
//! # fn main() -> Result<(), axon_store::StoreError> {
//! let store = Store::new([("foo", json!("bar")), ("counter", json!(0))]);
//!
//! let watcher: PropertyHandler<Value> = Arc::new(|current, previous| {
//!     println!("counter: {previous} -> {current}");
//! });
//! store.sub("counter", watcher)?;
//!
//! store.set("counter", json!(5))?; // "counter: 0 -> 5"
//! assert_eq!(*store.get("counter")?, json!(5));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod store;

pub use error::{StoreError, StoreResult};
pub use store::{PropertyHandler, Store};
