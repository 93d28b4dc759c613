//! # Bounded handoff between producers and the engine.
//!
//! [`BoundedChannel`] is a fixed-capacity FIFO shared by one or more producer tasks
//! (calling [`put`](BoundedChannel::put)) and the engine driver (calling
//! [`take`](BoundedChannel::take) on behalf of a channel-arrival trigger).
//!
//! ```text
//!   producer 1 ──put──┐
//!   producer 2 ──put──┼──► [ item | item | ... ]  (len <= capacity) ──take──► driver
//!   producer N ──put──┘        not_full ◄────────────── notify_one
//!                              not_empty ──────────────► notify_one
//! ```
//!
//! ## Rules
//! - The number of pending items never exceeds `capacity`.
//! - Items are taken in the exact order they were put (FIFO).
//! - Under [`OverflowPolicy::Block`] (default) `put` waits for a free slot and never drops data.
//! - Both `put` and `take` are cancel-safe: dropping a pending call neither enqueues
//!   nor loses an item.
//!
//! ## Example
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use cellvisor::{BoundedChannel, Delivery};
//!
//! let ch = BoundedChannel::new(2).unwrap();
//! assert_eq!(ch.put(1.0).await, Delivery::Enqueued);
//! assert_eq!(ch.put(2.0).await, Delivery::Enqueued);
//! assert_eq!(ch.take().await, 1.0);
//! assert_eq!(ch.take().await, 2.0);
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::error::GraphError;

/// What `put` does when the channel is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Wait until the consumer frees a slot (lossless).
    #[default]
    Block,
    /// Evict the oldest pending item to make room.
    DropOldest,
    /// Discard the value being put.
    DropNewest,
}

/// Outcome of a single [`BoundedChannel::put`].
#[derive(Clone, Debug, PartialEq)]
pub enum Delivery<T> {
    /// The value was appended.
    Enqueued,
    /// The value was appended after evicting the returned oldest item.
    DisplacedOldest(T),
    /// The channel was full; the returned value was not enqueued.
    Rejected(T),
}

impl<T> Delivery<T> {
    /// True if the put lost an item (either the new or the oldest one).
    pub fn is_lossy(&self) -> bool {
        !matches!(self, Delivery::Enqueued)
    }
}

/// Fixed-capacity, multi-producer FIFO with async `put`/`take`.
#[derive(Debug)]
pub struct BoundedChannel<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    policy: OverflowPolicy,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> BoundedChannel<T> {
    /// Creates a lossless channel ([`OverflowPolicy::Block`]).
    ///
    /// Returns [`GraphError::Capacity`] when `capacity == 0`.
    pub fn new(capacity: usize) -> Result<Self, GraphError> {
        Self::with_policy(capacity, OverflowPolicy::Block)
    }

    /// Creates a channel with an explicit overflow policy.
    pub fn with_policy(capacity: usize, policy: OverflowPolicy) -> Result<Self, GraphError> {
        if capacity == 0 {
            return Err(GraphError::Capacity {
                what: "channel",
                capacity,
            });
        }
        Ok(Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            policy,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        })
    }

    /// Enqueues `value` according to the overflow policy.
    ///
    /// With [`OverflowPolicy::Block`] this waits while the channel is full.
    /// A successful enqueue wakes exactly one waiting [`take`](Self::take).
    pub async fn put(&self, value: T) -> Delivery<T> {
        loop {
            {
                let mut queue = self.lock();
                if queue.len() < self.capacity {
                    queue.push_back(value);
                    drop(queue);
                    self.not_empty.notify_one();
                    return Delivery::Enqueued;
                }
                match self.policy {
                    OverflowPolicy::Block => {}
                    OverflowPolicy::DropNewest => return Delivery::Rejected(value),
                    OverflowPolicy::DropOldest => {
                        let evicted = queue.pop_front();
                        queue.push_back(value);
                        drop(queue);
                        self.not_empty.notify_one();
                        return match evicted {
                            Some(old) => Delivery::DisplacedOldest(old),
                            None => Delivery::Enqueued,
                        };
                    }
                }
            }
            self.not_full.notified().await;
        }
    }

    /// Waits for an item and returns the oldest one.
    pub async fn take(&self) -> T {
        loop {
            if let Some(item) = self.try_take() {
                return item;
            }
            self.not_empty.notified().await;
        }
    }

    /// Returns the oldest item if one is pending, without waiting.
    pub fn try_take(&self) -> Option<T> {
        let item = self.lock().pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if no item is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// True if `len() == capacity()`.
    pub fn is_full(&self) -> bool {
        self.lock().len() >= self.capacity
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Configured overflow policy.
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    // Critical sections never panic, so a poisoned lock still guards a consistent queue.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
