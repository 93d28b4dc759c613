//! # Engine driver: turns firings into propagation passes.
//!
//! The driver owns the [`Graph`] once the engine started. It arms every source, waits
//! for whichever fires first and runs one pass per firing. Firings are handled strictly
//! one at a time, so passes never overlap.
//!
//! ## Event flow
//! ```text
//! startup:
//!   arm all sources ──► re-read inputs ──► pass over every dirty cell (trigger "startup")
//!   ──► EngineStarted
//!
//! loop:
//!   select! { cancelled → exit, armed.next() → firing }
//!     Arrival(item) → source value = item          → ChannelArrival
//!     Timer(due)    → fire + reschedule            → TimerFired
//!     Input         → read(); unchanged → no pass  → InputChanged
//!   re-arm the source
//!   mark_dirty_from(source) ──► run_pass ──► PassStarted, Cell*, PassCompleted
//! ```
//!
//! ## Rules
//! - A source is re-armed before the pass runs, so a timer is rescheduled even when
//!   every dependent fails.
//! - Inputs are read again right before the startup pass; values captured at
//!   declaration are never used for a first evaluation.
//! - An input notification whose read yields the last observed value fires nothing.
//! - Unchanged cells (value-changed propagation) are not reported on the bus.

use std::sync::Arc;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use petgraph::graph::NodeIndex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{EngineStats, Propagation};
use crate::events::{Bus, Event, EventKind};
use crate::graph::{Graph, Outcome, Scope};
use crate::triggers::{Firing, TriggerSource};
use crate::value::Value;

/// Trigger name of the initial pass.
const STARTUP: &str = "startup";

pub(crate) struct Driver {
    graph: Graph,
    bus: Bus,
    stats: Arc<EngineStats>,
    propagation: Propagation,
    pass: u64,
}

impl Driver {
    pub(crate) fn new(graph: Graph, bus: Bus, propagation: Propagation) -> Self {
        let stats = graph.stats();
        Self {
            graph,
            bus,
            stats,
            propagation,
            pass: 0,
        }
    }

    /// Drives the graph until `token` is cancelled. Returns the number of passes run.
    pub(crate) async fn run(mut self, token: CancellationToken) -> u64 {
        let mut armed: FuturesUnordered<BoxFuture<'static, Firing>> = FuturesUnordered::new();
        for idx in self.graph.sources() {
            self.arm(&mut armed, idx);
        }

        self.graph.reread_inputs();
        let scope = self.graph.dirty_scope();
        self.propagate(scope, None);
        self.bus
            .publish(Event::new(EventKind::EngineStarted).with_count(self.graph.len() as u64));

        loop {
            let firing = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = armed.next(), if !armed.is_empty() => match next {
                    Some(firing) => firing,
                    None => continue,
                },
            };

            let source = firing.source();
            let fired = self.handle(firing);
            self.arm(&mut armed, source);
            if fired {
                let scope = self.graph.mark_dirty_from(source);
                self.propagate(scope, Some(source));
            }
        }

        tracing::debug!(passes = self.pass, "driver stopped");
        self.pass
    }

    fn arm(&self, armed: &mut FuturesUnordered<BoxFuture<'static, Firing>>, idx: NodeIndex) {
        if let Some(source) = self.graph.source(idx) {
            armed.push(source.trigger.arm(idx));
        }
    }

    /// Updates the fired source's value. Returns false if nothing should propagate.
    fn handle(&mut self, firing: Firing) -> bool {
        let name = self.graph.name_of(firing.source());
        let Some(source) = self.graph.source_mut(firing.source()) else {
            return false;
        };

        match (firing, &mut source.trigger) {
            (Firing::Arrival { item, .. }, TriggerSource::ChannelArrival { channel }) => {
                let pending = channel.len() as u64;
                source.value = Some(item);
                self.stats.record_arrival();
                self.bus.publish(
                    Event::new(EventKind::ChannelArrival)
                        .with_name(name)
                        .with_count(pending),
                );
                true
            }
            (Firing::Timer { due, .. }, TriggerSource::Timer(timer)) => {
                let now = Instant::now().max(due);
                let status = timer.fire(now);
                source.value = Some(Value::Int(i64::try_from(status.fires).unwrap_or(i64::MAX)));
                self.stats.record_timer_fire();
                self.bus.publish(
                    Event::new(EventKind::TimerFired)
                        .with_name(name)
                        .with_count(status.fires)
                        .with_delay(status.next.saturating_duration_since(now)),
                );
                true
            }
            (Firing::Input { .. }, TriggerSource::InputChange { read, .. }) => {
                let current = read();
                if source.value.as_ref() == Some(&current) {
                    tracing::trace!(input = %name, "input notified without change");
                    return false;
                }
                let rendered = current.to_string();
                source.value = Some(current);
                self.stats.record_input_change();
                self.bus.publish(
                    Event::new(EventKind::InputChanged)
                        .with_name(name)
                        .with_reason(rendered),
                );
                true
            }
            (_, trigger) => {
                tracing::error!(source = %name, kind = trigger.kind(), "firing does not match its source");
                false
            }
        }
    }

    /// Runs one pass over `scope` and reports every outcome on the bus.
    fn propagate(&mut self, scope: Scope, fired: Option<NodeIndex>) {
        if scope.len() == 0 {
            return;
        }
        self.pass += 1;
        let pass = self.pass;
        let trigger: Arc<str> = match fired {
            Some(idx) => self.graph.name_of(idx),
            None => Arc::from(STARTUP),
        };

        self.bus.publish(
            Event::new(EventKind::PassStarted)
                .with_pass(pass)
                .with_trigger(Arc::clone(&trigger))
                .with_count(scope.len() as u64),
        );

        let report = self.graph.run_pass(&scope, fired, self.propagation);
        let (mut evaluated, mut failed) = (0u64, 0u64);
        for (name, outcome) in &report.outcomes {
            let ev = match outcome {
                Outcome::Evaluated { version } => {
                    evaluated += 1;
                    Event::new(EventKind::CellEvaluated).with_version(*version)
                }
                Outcome::Failed(err) => {
                    failed += 1;
                    Event::new(EventKind::CellFailed).with_reason(err.as_message())
                }
                Outcome::Blocked => Event::new(EventKind::CellBlocked),
                Outcome::Gated => Event::new(EventKind::CellGated),
                Outcome::Unchanged => {
                    tracing::trace!(cell = %name, pass, "cell skipped, inputs unchanged");
                    continue;
                }
            };
            self.bus.publish(
                ev.with_name(Arc::clone(name))
                    .with_trigger(Arc::clone(&trigger))
                    .with_pass(pass),
            );
        }

        self.stats.record_pass(evaluated, failed);
        self.stats.set_cached_bytes(self.graph.cached_bytes());
        self.bus.publish(
            Event::new(EventKind::PassCompleted)
                .with_pass(pass)
                .with_trigger(trigger)
                .with_count(evaluated),
        );
    }
}
