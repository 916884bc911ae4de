//! Prelude module - commonly used types for convenient import.
//!
//! Use `use axon_events::prelude::*;` to import all essential types.

pub use crate::{EventBus, EventError, EventHandler, EventResult};
