#![deny(missing_docs)]

//! A small reactive state tree with observed fields and selector subscriptions.
//!
//! A [`Store`] holds one tree of named slices. Fields marked as observed notify
//! the store synchronously on every write, and consumers subscribe with a
//! selector so they are asked to re-render only when the value they depend on
//! actually changes.
//!
//! # Quick Start
//!
//! ```ignore
//! use watchtree::{Fields, Observed, RenderCounter, SliceKey, StateDefinition, Store, StoreError};
//!
//! #[derive(Default)]
//! struct Counter {
//!     value: Observed<i64>,  // Observed: writes notify
//!     label: String,         // Plain field: ignored by the store
//! }
//!
//! impl StateDefinition for Counter {
//!     fn declare(&self, fields: &mut Fields<'_>) -> Result<(), StoreError> {
//!         fields.observe("value", &self.value)?;
//!         Ok(())
//!     }
//! }
//!
//! const COUNTER: SliceKey<Counter> = SliceKey::new("Counter");
//!
//! let store = Store::builder().slice(COUNTER, Counter::default()).build()?;
//!
//! let renders = RenderCounter::new();
//! let count = store.subscribe(|s| s[COUNTER].value.get(), renders.clone());
//!
//! store.states()[COUNTER].value.set(0);  // Same value: no render requested
//! store.states()[COUNTER].value.set(1);  // Changed: one render requested
//! assert_eq!(renders.get(), 1);
//! assert_eq!(count.read().watch_value, Some(1));
//!
//! drop(count);  // Consumer teardown removes its listener
//! ```
//!
//! # Core Types
//!
//! - [`Store`] - The state registry. Cheap to clone; pass it to consumers.
//! - [`Observed<T>`] - Observed field. Every write notifies, even an unchanged one.
//! - [`StateDefinition`] - A slice of state; declares its observed fields.
//! - [`Subscription<T>`] - A consumer's listener. Removed on drop.
//! - [`RenderTrigger`] - Host callback asked to re-render a consumer.
//!
//! # Subscribing
//!
//! ```ignore
//! // Derived value: re-render only when the selector result changes
//! let name = store.subscribe(|s| s[SESSION].user.get(), trigger);
//!
//! // Whole slice: re-render on any write to it
//! let session = store.subscribe_slice(SESSION, trigger)?;
//!
//! // No selector: read-only access, nothing registered
//! let Watched { states, .. } = store.read();
//! ```
//!
//! # Notification order
//!
//! A write runs one synchronous sweep over every listener, in registration
//! order. Writes made by a listener during a sweep are applied immediately but
//! their notifications are queued and delivered after the sweep, oldest first.

mod config;
mod error;
mod hash;
mod listener;
mod observed;
mod slice;
mod store;
mod subscription;

// Core types
pub use observed::Observed;
pub use slice::{Fields, RootState, SliceKey, StateDefinition};
pub use store::{Store, StoreBuilder};
pub use subscription::{RenderCounter, RenderTrigger, Subscription, Watched};

// Listener registry
pub use listener::ListenerId;

// Configuration and errors
pub use config::{DEFAULT_MAX_DEFERRED_SWEEPS, NotifyMode, StoreConfig};
pub use error::StoreError;
