//! # Fan-out of engine events to subscribers.
//!
//! [`SubscriberSet`] owns one lane per subscriber: a bounded queue plus a worker task
//! that calls [`Subscribe::on_event`]. `emit` only enqueues, so the listener that
//! forwards bus events is never held up by a slow subscriber.
//!
//! ```text
//!    emit(&Event) ── Arc<Event> ──┬─► lane "log"     ─► worker ─► on_event()
//!                                 ├─► lane "metrics" ─► worker ─► on_event()
//!                                 └─► lane "…"       ─► worker ─► on_event()
//! ```
//!
//! Each lane is FIFO; there is no ordering between lanes. A full or closed lane drops
//! the event for that subscriber only, counts it and publishes `SubscriberOverflow`
//! (never for an overflow event itself). Panics in `on_event` are caught and
//! published as `SubscriberPanicked`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use super::Subscribe;
use crate::error::panic_message;
use crate::events::{Bus, Event};

struct Lane {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
    dropped: AtomicU64,
}

/// Subscribers with their queues and workers.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber. Overflow and panic reports go to `bus`.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut lanes = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
            lanes.push(Lane {
                name: sub.name(),
                tx,
                dropped: AtomicU64::new(0),
            });
            workers.push(spawn_worker(sub, rx, bus.clone()));
        }

        Self {
            lanes,
            workers,
            bus,
        }
    }

    /// Queues `event` for every subscriber without waiting.
    pub fn emit(&self, event: &Event) {
        let shared = Arc::new(event.clone());
        for lane in &self.lanes {
            let reason = match lane.tx.try_send(Arc::clone(&shared)) {
                Ok(()) => continue,
                Err(TrySendError::Full(_)) => "full",
                Err(TrySendError::Closed(_)) => "closed",
            };
            lane.dropped.fetch_add(1, Ordering::Relaxed);
            if !event.is_subscriber_overflow() {
                tracing::debug!(subscriber = lane.name, reason, "subscriber dropped event");
                self.bus.publish(Event::subscriber_overflow(lane.name, reason));
            }
        }
    }

    /// Events dropped so far, per subscriber, in registration order.
    pub fn dropped(&self) -> Vec<(&'static str, u64)> {
        self.lanes
            .iter()
            .map(|lane| (lane.name, lane.dropped.load(Ordering::Relaxed)))
            .collect()
    }

    /// Closes every queue and waits until the workers have drained them.
    pub async fn shutdown(self) {
        drop(self.lanes);
        for worker in self.workers {
            if let Err(err) = worker.await {
                tracing::warn!(error = %err, "subscriber worker ended abnormally");
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lanes.len()
    }
}

fn spawn_worker(
    sub: Arc<dyn Subscribe>,
    mut rx: mpsc::Receiver<Arc<Event>>,
    bus: Bus,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let handled = std::panic::AssertUnwindSafe(sub.on_event(&event)).catch_unwind();
            if let Err(payload) = handled.await {
                let info = panic_message(&*payload);
                tracing::warn!(subscriber = sub.name(), %info, "subscriber panicked");
                bus.publish(Event::subscriber_panicked(sub.name(), info));
            }
        }
    })
}
