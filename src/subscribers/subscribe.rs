//! # The subscriber extension point.
//!
//! Implement [`Subscribe`] to observe passes, firings and producer lifecycle from
//! outside the graph (metrics, alerting, tracing export).
//!
//! Subscribers never run on the driver. The [`SubscriberSet`](super::SubscriberSet)
//! gives each one its own bounded queue and worker task:
//! ```text
//! listener ─► emit ─► [queue, queue_capacity()] ─► worker ─► on_event()
//!                 └─ queue full → event dropped for this subscriber, SubscriberOverflow
//! ```
//! A panicking `on_event` is caught; the worker reports `SubscriberPanicked` and moves
//! on to the next event.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use cellvisor::{Event, EventKind, Subscribe};
//!
//! struct FailureAlerts;
//!
//! #[async_trait]
//! impl Subscribe for FailureAlerts {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::CellFailed | EventKind::ProducerFailed) {
//!             // page someone, etc.
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "failure-alerts" }
//!     fn queue_capacity(&self) -> usize { 256 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receives engine events on a dedicated worker, one at a time, in publish order.
///
/// `on_event` should not block the executor; errors are the subscriber's own business.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Name used in logs and in overflow/panic events. Defaults to the type name.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Events that may wait in this subscriber's queue (at least 1 is used).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
