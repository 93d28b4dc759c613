//! # LogWriter: events as `tracing` records
//!
//! A minimal subscriber that forwards incoming [`Event`]s to `tracing`.
//! Install any `tracing` subscriber (e.g. `tracing_subscriber::fmt`) to see them.
//!
//! ## Example output
//! ```text
//! INFO  producer started producer="update"
//! DEBUG cell evaluated cell="walk" version=4 pass=4 trigger="update"
//! WARN  cell failed cell="noise" pass=5 trigger="variance" reason="error: division by zero"
//! INFO  timer fired timer="memory" fires=3 next_in_ms=10000
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let name = e.name.as_deref().unwrap_or("-");
        let trigger = e.trigger.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::EngineStarted => {
                tracing::info!(nodes = ?e.count, "engine started");
            }
            EventKind::ShutdownRequested => {
                tracing::info!(reason, "shutdown requested");
            }
            EventKind::AllStoppedWithin => {
                tracing::info!("all stopped within grace");
            }
            EventKind::GraceExceeded => {
                tracing::warn!("grace exceeded");
            }
            EventKind::PassStarted => {
                tracing::trace!(pass = ?e.pass, trigger, dirty = ?e.count, "pass started");
            }
            EventKind::PassCompleted => {
                tracing::trace!(pass = ?e.pass, trigger, evaluated = ?e.count, "pass completed");
            }
            EventKind::CellEvaluated => {
                tracing::debug!(cell = name, version = ?e.version, pass = ?e.pass, trigger, "cell evaluated");
            }
            EventKind::CellFailed => {
                tracing::warn!(cell = name, pass = ?e.pass, trigger, reason, "cell failed");
            }
            EventKind::CellBlocked => {
                tracing::debug!(cell = name, pass = ?e.pass, trigger, "cell blocked");
            }
            EventKind::CellGated => {
                tracing::debug!(cell = name, pass = ?e.pass, trigger, "cell gated");
            }
            EventKind::ChannelArrival => {
                tracing::trace!(channel = name, pending = ?e.count, "channel arrival");
            }
            EventKind::TimerFired => {
                tracing::info!(timer = name, fires = ?e.count, next_in_ms = ?e.delay_ms, "timer fired");
            }
            EventKind::InputChanged => {
                tracing::info!(input = name, value = reason, "input changed");
            }
            EventKind::ProducerStarted => {
                tracing::info!(producer = name, "producer started");
            }
            EventKind::ProducerStopped => {
                tracing::info!(producer = name, delivered = ?e.count, "producer stopped");
            }
            EventKind::ProducerFailed => {
                tracing::error!(producer = name, delivered = ?e.count, reason, "producer failed");
            }
            EventKind::ItemDropped => {
                tracing::warn!(producer = name, reason, "item dropped");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(subscriber = name, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(subscriber = name, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
