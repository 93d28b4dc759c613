//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the engine driver, producer tasks
//! and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `core::driver` (passes, cells, triggers), `ProducerTask`
//!   (lifecycle, drops), `SubscriberSet` workers (overflow/panic), `Engine` (shutdown).
//! - **Consumers**: the engine listener (fans out to `SubscriberSet` and updates
//!   `ProducerTracker`) and any receiver from `Engine::subscribe()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
