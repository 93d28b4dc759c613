//! # Runtime events emitted by the engine driver and producers.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Propagation events**: passes and per-cell outcomes (evaluated, failed, blocked, gated)
//! - **Trigger events**: channel arrivals, timer firings, input changes
//! - **Producer events**: producer lifecycle and lossy deliveries
//! - **Runtime events**: startup, shutdown and subscriber health
//!
//! The [`Event`] struct carries additional metadata such as timestamps, node name,
//! trigger, reasons, versions and delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use cellvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::CellFailed)
//!     .with_name("noise")
//!     .with_trigger("update")
//!     .with_reason("division by zero")
//!     .with_pass(3);
//!
//! assert_eq!(ev.kind, EventKind::CellFailed);
//! assert_eq!(ev.name.as_deref(), Some("noise"));
//! assert_eq!(ev.trigger.as_deref(), Some("update"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Runtime events ===
    /// Engine driver started and ran its initial pass.
    ///
    /// Sets:
    /// - `count`: number of declared nodes
    EngineStarted,

    /// Shutdown requested (explicit call or OS signal).
    ShutdownRequested,

    /// Driver and all producers stopped within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some producers did not stop in time.
    GraceExceeded,

    // === Propagation events ===
    /// A propagation pass is about to evaluate dirty cells.
    ///
    /// Sets:
    /// - `pass`: pass number
    /// - `trigger`: source that fired (`"startup"` for the initial pass)
    /// - `count`: number of cells dirtied by the firing
    PassStarted,

    /// A propagation pass finished.
    ///
    /// Sets:
    /// - `pass`: pass number
    /// - `trigger`: source that fired
    /// - `count`: number of cells evaluated successfully
    PassCompleted,

    /// A cell was evaluated and its version bumped.
    ///
    /// Sets:
    /// - `name`: cell name
    /// - `version`: new version
    /// - `pass`, `trigger`
    CellEvaluated,

    /// A cell computation failed; its value and version are unchanged.
    ///
    /// Sets:
    /// - `name`: cell name
    /// - `reason`: error message
    /// - `pass`, `trigger`
    CellFailed,

    /// A dirty cell was not evaluated because an upstream has no valid value.
    ///
    /// Sets:
    /// - `name`: cell name
    /// - `pass`, `trigger`
    CellBlocked,

    /// A dirty cell was not evaluated because its gate input is falsy.
    ///
    /// Sets:
    /// - `name`: cell name
    /// - `pass`, `trigger`
    CellGated,

    // === Trigger events ===
    /// An item was taken from a channel.
    ///
    /// Sets:
    /// - `name`: channel name
    /// - `count`: items still pending in the channel
    ChannelArrival,

    /// A timer matured and was rescheduled.
    ///
    /// Sets:
    /// - `name`: timer name
    /// - `count`: number of firings so far
    /// - `delay_ms`: delay until the next firing
    TimerFired,

    /// An input's observed value changed.
    ///
    /// Sets:
    /// - `name`: input name
    /// - `reason`: new value, rendered
    InputChanged,

    // === Producer events ===
    /// A producer task started.
    ///
    /// Sets:
    /// - `name`: producer name
    ProducerStarted,

    /// A producer task observed its stop signal and exited cleanly.
    ///
    /// Sets:
    /// - `name`: producer name
    /// - `count`: items delivered
    ProducerStopped,

    /// A producer's generator failed; the producer is terminated.
    ///
    /// Sets:
    /// - `name`: producer name
    /// - `reason`: error message
    /// - `count`: items delivered before the failure
    ProducerFailed,

    /// A put under a lossy overflow policy discarded an item.
    ///
    /// Sets:
    /// - `name`: producer name
    /// - `reason`: `"displaced_oldest"` or `"rejected_newest"`
    ItemDropped,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `name`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `name`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the cell, source, producer or subscriber concerned.
    pub name: Option<Arc<str>>,
    /// Name of the source whose firing caused this event.
    pub trigger: Option<Arc<str>>,
    /// Human-readable reason (errors, drop details, etc.).
    pub reason: Option<Arc<str>>,
    /// Cell version after evaluation.
    pub version: Option<u64>,
    /// Propagation pass number.
    pub pass: Option<u64>,
    /// Delay until the next timer firing in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Kind-specific counter (see [`EventKind`]).
    pub count: Option<u64>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            name: None,
            trigger: None,
            reason: None,
            version: None,
            pass: None,
            delay_ms: None,
            count: None,
        }
    }

    /// Attaches the name of the node concerned.
    #[inline]
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches the firing source.
    #[inline]
    pub fn with_trigger(mut self, trigger: impl Into<Arc<str>>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    #[inline]
    pub fn with_pass(mut self, pass: u64) -> Self {
        self.pass = Some(pass);
        self
    }

    #[inline]
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// Attaches a delay (stored as milliseconds, saturating).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event; `reason` is `full` or `closed`.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_name(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_name(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    /// True for events describing a producer's lifecycle.
    #[inline]
    pub fn is_producer_lifecycle(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ProducerStarted | EventKind::ProducerStopped | EventKind::ProducerFailed
        )
    }
}
