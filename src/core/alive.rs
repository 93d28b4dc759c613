//! # Producer lifecycle tracker with sequence-based ordering.
//!
//! Maintains which producers are currently running, using event sequence
//! numbers to handle out-of-order delivery.
//!
//! ## Architecture
//! ```text
//! ProducerTask ──► Bus ──► engine listener ──► ProducerTracker::update()
//!                                                      │
//!                                                      ▼
//!                                       HashMap<String, ProducerState>
//!                                            (name → {seq, alive})
//! ```
//!
//! ## Rules
//! - Only `ProducerStarted` / `ProducerStopped` / `ProducerFailed` are considered
//! - Read operations (`snapshot`, `is_alive`) are **eventually consistent**
//! - Events with `seq <= last_seq` are **rejected** (stale)

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::events::{Event, EventKind};

#[derive(Debug, Clone)]
struct ProducerState {
    last_seq: u64,
    alive: bool,
}

/// Thread-safe tracker of running producers.
///
/// Used by `Engine::shutdown` to name the producers that did not stop within grace.
#[derive(Default)]
pub struct ProducerTracker {
    state: RwLock<HashMap<String, ProducerState>>,
}

impl ProducerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a producer lifecycle event if it is newer than the last one seen.
    ///
    /// ```text
    /// update(ProducerStopped, seq=100)  → alive=false, last_seq=100
    /// update(ProducerStarted, seq=99)   → rejected (stale)
    /// ```
    ///
    /// Returns true if the state changed.
    pub async fn update(&self, ev: &Event) -> bool {
        if !ev.is_producer_lifecycle() {
            return false;
        }
        let Some(name) = ev.name.as_deref() else {
            return false;
        };

        let mut state = self.state.write().await;
        let entry = state.entry(name.to_string()).or_insert(ProducerState {
            last_seq: 0,
            alive: false,
        });
        if ev.seq <= entry.last_seq && entry.last_seq != 0 {
            return false;
        }
        entry.last_seq = ev.seq;
        entry.alive = matches!(ev.kind, EventKind::ProducerStarted);
        true
    }

    /// Returns the sorted names of producers that are still running.
    pub async fn snapshot(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut alive: Vec<String> = state
            .iter()
            .filter(|(_, ps)| ps.alive)
            .map(|(name, _)| name.clone())
            .collect();
        alive.sort_unstable();
        alive
    }

    pub async fn is_alive(&self, name: &str) -> bool {
        self.state
            .read()
            .await
            .get(name)
            .map(|ps| ps.alive)
            .unwrap_or(false)
    }
}
