//! # Trigger sources and their armed futures.
//!
//! Each source is armed as one `'static` future that resolves to a [`Firing`].
//! The driver keeps all armed futures in a single `FuturesUnordered` and re-arms a
//! source right after handling its firing, so every source is a persistent,
//! restartable sequence rather than a one-shot.
//!
//! ```text
//! ChannelArrival ──► channel.take().await          ──► Firing::Arrival { item }
//! Timer          ──► sleep_until(due).await        ──► Firing::Timer { due }
//! InputChange    ──► notify.notified().await       ──► Firing::Input
//! ```
//!
//! `take` is cancel-safe, so dropping the armed set on shutdown never loses an item.

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use petgraph::graph::NodeIndex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::timer::TimerState;
use crate::primitives::BoundedChannel;
use crate::value::Value;

/// Reads the current value of an external control.
pub(crate) type ReadFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// A source of firings feeding the scheduler.
pub(crate) enum TriggerSource {
    ChannelArrival {
        channel: Arc<BoundedChannel<Value>>,
    },
    Timer(TimerState),
    InputChange {
        read: ReadFn,
        notify: Arc<Notify>,
    },
}

/// One resolved trigger.
pub(crate) enum Firing {
    Arrival { source: NodeIndex, item: Value },
    Timer { source: NodeIndex, due: Instant },
    Input { source: NodeIndex },
}

impl Firing {
    pub(crate) fn source(&self) -> NodeIndex {
        match self {
            Firing::Arrival { source, .. }
            | Firing::Timer { source, .. }
            | Firing::Input { source } => *source,
        }
    }
}

impl TriggerSource {
    /// Creates the future resolving on this source's next firing.
    pub(crate) fn arm(&self, source: NodeIndex) -> BoxFuture<'static, Firing> {
        match self {
            TriggerSource::ChannelArrival { channel } => {
                let channel = Arc::clone(channel);
                async move {
                    let item = channel.take().await;
                    Firing::Arrival { source, item }
                }
                .boxed()
            }
            TriggerSource::Timer(timer) => {
                let due = timer.due();
                async move {
                    tokio::time::sleep_until(due).await;
                    Firing::Timer { source, due }
                }
                .boxed()
            }
            TriggerSource::InputChange { notify, .. } => {
                let notify = Arc::clone(notify);
                async move {
                    notify.notified().await;
                    Firing::Input { source }
                }
                .boxed()
            }
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            TriggerSource::ChannelArrival { .. } => "channel",
            TriggerSource::Timer(_) => "timer",
            TriggerSource::InputChange { .. } => "input",
        }
    }
}

impl fmt::Debug for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::ChannelArrival { channel } => f
                .debug_struct("ChannelArrival")
                .field("pending", &channel.len())
                .field("capacity", &channel.capacity())
                .finish(),
            TriggerSource::Timer(timer) => {
                f.debug_struct("Timer").field("due", &timer.due()).finish()
            }
            TriggerSource::InputChange { .. } => f.write_str("InputChange"),
        }
    }
}
