//! # Runtime event bus.
//!
//! [`Bus`] wraps a [`tokio::sync::broadcast`] sender shared by everything that reports
//! activity: the driver (passes, firings), producer tasks and subscriber workers.
//!
//! ```text
//!   Driver     ──┐
//!   Producer 1 ──┼──► Bus ──► engine listener ──► ProducerTracker + SubscriberSet
//!   Producer N ──┤        └─► Engine::subscribe() receivers
//!   Sub workers──┘
//! ```
//!
//! Publishing never waits. The ring buffer holds `capacity` events for all receivers;
//! a receiver that falls behind gets `RecvError::Lagged(n)` and loses the `n` oldest.
//! Events published while nobody listens are gone.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events. Clones share the same channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus buffering up to `capacity` events (at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Sends `event` to every current receiver.
    pub fn publish(&self, event: Event) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event published without receivers");
        }
    }

    /// New receiver observing events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receivers(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use tokio::sync::broadcast::error::RecvError;

    #[test]
    fn test_publish_without_receivers_is_silent() {
        let bus = Bus::new(0);
        assert_eq!(bus.receivers(), 0);
        bus.publish(Event::new(EventKind::PassStarted));
    }

    #[tokio::test]
    async fn test_slow_receiver_lags_and_keeps_newest() {
        let bus = Bus::new(2);
        let mut rx = bus.subscribe();
        for pass in 1..=3 {
            bus.publish(Event::new(EventKind::PassStarted).with_pass(pass));
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(1))));
        assert_eq!(rx.recv().await.unwrap().pass, Some(2));
        assert_eq!(rx.recv().await.unwrap().pass, Some(3));
    }
}
