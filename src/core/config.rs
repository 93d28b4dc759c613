//! # Engine runtime configuration.
//!
//! Provides [`EngineConfig`], the runtime knobs of an [`Engine`](crate::Engine).
//!
//! Channel capacities, window capacities and timer periods are **not** part of the
//! config: they are explicit arguments of the corresponding `Graph::declare_*` calls.
//!
//! ## Sentinel values
//! - `grace = 0s` → wait for the driver and producers without a limit
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

/// How far dirtiness reaches after a cell has been evaluated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Propagation {
    /// Every cell reachable from the fired source is re-evaluated, whether or not
    /// the values it reads actually changed.
    #[default]
    Conservative,

    /// A dirtied cell is re-evaluated only if the fired source or one of its
    /// upstream cells produced a value that differs from the previous one in this pass.
    /// Cells skipped this way become clean without a version bump.
    ValueChanged,
}

/// Runtime configuration of an engine.
///
/// ## Field semantics
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `grace`: maximum wait for producers and the driver to stop (`0s` = unbounded)
/// - `propagation`: dirty propagation mode, see [`Propagation`]
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Receivers lagging behind more than `bus_capacity` events skip older items.
    pub bus_capacity: usize,

    /// Maximum time to wait for graceful shutdown.
    ///
    /// When shutdown is requested:
    /// - the runtime token is cancelled (driver and every producer observe it)
    /// - the engine waits up to `grace` for them to exit
    /// - if the wait times out, returns `RuntimeError::GraceExceeded`
    pub grace: Duration,

    /// Dirty propagation mode.
    pub propagation: Propagation,
}

impl EngineConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the shutdown grace period as an `Option`.
    ///
    /// - `None` → wait without a limit
    /// - `Some(d)` → give up after `d`
    #[inline]
    pub fn grace_period(&self) -> Option<Duration> {
        if self.grace == Duration::ZERO {
            None
        } else {
            Some(self.grace)
        }
    }
}

impl Default for EngineConfig {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - `grace = 10s`
    /// - `propagation = Propagation::Conservative`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            grace: Duration::from_secs(10),
            propagation: Propagation::default(),
        }
    }
}
