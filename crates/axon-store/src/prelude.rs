//! Prelude module - commonly used types for convenient import.
//!
//! Use `use axon_store::prelude::*;` to import all essential types.

pub use crate::{PropertyHandler, Store, StoreError, StoreResult};
