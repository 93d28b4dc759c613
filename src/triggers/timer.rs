//! # Self-rescheduling timers.
//!
//! A timer source fires at its due instant and immediately installs the next one
//! using a caller-supplied [`Schedule`]. Rescheduling happens before dependents run
//! and does not depend on their outcome.
//!
//! ```text
//! due ──► fire(now) ──► fires += 1
//!                  └──► next = schedule(now), clamped to > now ──► re-armed
//! ```
//!
//! Instants are [`tokio::time::Instant`] so paused-clock tests drive timers deterministically.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::RuntimeError;
use crate::graph::NodeId;

/// Minimum distance between a firing and the next due instant.
const MIN_STEP: Duration = Duration::from_millis(1);

/// Computes the next due instant from the instant a timer fired.
///
/// Any deterministic function of "now" is allowed; it need not be periodic.
pub struct Schedule(Box<dyn FnMut(Instant) -> Instant + Send>);

impl Schedule {
    /// Wraps a "next instant" function.
    pub fn new<F>(f: F) -> Self
    where
        F: FnMut(Instant) -> Instant + Send + 'static,
    {
        Self(Box::new(f))
    }

    /// Fires every `period` after the previous firing.
    pub fn every(period: Duration) -> Self {
        Self::new(move |now| now + period)
    }

    /// Fires on wall-clock multiples of `period` (e.g. every full 10 seconds).
    pub fn aligned(period: Duration) -> Self {
        Self::new(move |now| now + until_boundary(period))
    }

    /// Next due instant after a firing at `now`; always strictly after `now`.
    pub fn next_after(&mut self, now: Instant) -> Instant {
        let next = (self.0)(now);
        if next > now { next } else { now + MIN_STEP }
    }
}

impl std::fmt::Debug for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Schedule(..)")
    }
}

/// The next wall-clock multiple of `period`, as an [`Instant`].
///
/// Useful as the first due instant of an aligned timer.
pub fn next_boundary(period: Duration) -> Instant {
    Instant::now() + until_boundary(period)
}

fn until_boundary(period: Duration) -> Duration {
    let period_ns = period.as_nanos();
    if period_ns == 0 {
        return MIN_STEP;
    }
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let remaining = period_ns - since_epoch % period_ns;
    Duration::from_nanos(remaining.min(u128::from(u64::MAX)) as u64)
}

/// Observable state of a timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerStatus {
    /// Number of times the timer fired.
    pub fires: u64,
    /// Instant of the next firing.
    pub next: Instant,
}

/// Driver-side timer state.
pub(crate) struct TimerState {
    schedule: Schedule,
    status: watch::Sender<TimerStatus>,
}

impl TimerState {
    pub(crate) fn new(first: Instant, schedule: Schedule) -> (Self, watch::Receiver<TimerStatus>) {
        let (status, rx) = watch::channel(TimerStatus {
            fires: 0,
            next: first,
        });
        (Self { schedule, status }, rx)
    }

    pub(crate) fn due(&self) -> Instant {
        self.status.borrow().next
    }

    /// Records a firing at `now` and installs the next due instant.
    pub(crate) fn fire(&mut self, now: Instant) -> TimerStatus {
        let next = self.schedule.next_after(now);
        let fires = self.status.borrow().fires + 1;
        let status = TimerStatus { fires, next };
        self.status.send_replace(status);
        status
    }
}

/// Handle to a declared timer.
#[derive(Clone, Debug)]
pub struct TimerHandle {
    pub(crate) id: NodeId,
    pub(crate) name: Arc<str>,
    pub(crate) status: watch::Receiver<TimerStatus>,
}

impl TimerHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of firings so far.
    pub fn fires(&self) -> u64 {
        self.status.borrow().fires
    }

    /// Instant of the next firing.
    pub fn next_due(&self) -> Instant {
        self.status.borrow().next
    }

    /// Waits until the timer has fired at least `fires` times.
    pub async fn wait_fires(&self, fires: u64) -> Result<TimerStatus, RuntimeError> {
        let mut rx = self.status.clone();
        let status = rx
            .wait_for(|s| s.fires >= fires)
            .await
            .map(|s| *s)
            .map_err(|_| RuntimeError::EngineStopped);
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_next_is_strictly_after_firing() {
        let now = Instant::now();
        let mut stuck = Schedule::new(|now| now);
        assert!(stuck.next_after(now) > now);

        let mut backwards = Schedule::new(|now| now - Duration::from_secs(1));
        assert_eq!(backwards.next_after(now), now + MIN_STEP);

        let mut every = Schedule::every(Duration::from_secs(10));
        assert_eq!(every.next_after(now), now + Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_counts_and_reschedules() {
        let first = Instant::now() + Duration::from_secs(1);
        let (mut timer, rx) = TimerState::new(first, Schedule::every(Duration::from_secs(10)));
        assert_eq!(timer.due(), first);

        let status = timer.fire(first);
        assert_eq!(status.fires, 1);
        assert_eq!(status.next, first + Duration::from_secs(10));
        assert_eq!(*rx.borrow(), status);
    }

    #[test]
    fn test_boundary_is_within_one_period() {
        let period = Duration::from_secs(10);
        let d = until_boundary(period);
        assert!(d > Duration::ZERO && d <= period);
        assert_eq!(until_boundary(Duration::ZERO), MIN_STEP);
    }
}
