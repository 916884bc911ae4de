//! Axon Events - synchronous named-event bus.
//!
//! This crate provides:
//! - A fixed registry of named events, declared once at construction
//! - Ordered, synchronous handler dispatch with an optional payload
//! - Identity-based handler attachment and removal
//!
//! # Architecture
//!
//! An [`EventBus`] is constructed from the complete list of event names it
//! will ever know about; membership never changes afterwards. Handlers are
//! attached per event and run on the emitter's own call stack, in attachment
//! order, before [`EventBus::emit`] returns. There is no queue, no deferral,
//! and no delivery across threads or processes.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use axon_events::{EventBus, EventHandler};
//!
//! # fn main() -> Result<(), axon_events::EventError> {
//! let bus = EventBus::new(["cat_event", "bird_event"]);
//!
//! let handler: EventHandler<String> = Arc::new(|data| match data {
//!     Some(sound) => println!("cat {sound}."),
//!     None => println!("cat."),
//! });
//! bus.listen("cat_event", handler)?;
//!
//! bus.emit("cat_event", Some(&"meows".to_string()))?; // "cat meows."
//! bus.emit("cat_event", None)?;                       // "cat."
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

mod bus;
mod error;

pub use bus::{EventBus, EventHandler};
pub use error::{EventError, EventResult};
