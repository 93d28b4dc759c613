//! # Engine: runs a graph, its producers and event delivery, and shuts them down.
//!
//! The [`Engine`] owns the event bus, the subscriber fan-out and the runtime token of
//! the graph it drives. It spawns the driver and one task per registered producer,
//! and performs graceful shutdown bounded by [`EngineConfig::grace`].
//!
//! ## High-level architecture
//! ```text
//! EngineBuilder::build()
//!   - Bus::new(cfg.bus_capacity)
//!   - listener: Bus.subscribe() ─► ProducerTracker::update ─► SubscriberSet::emit (fire-and-forget)
//!
//! Engine::start(graph):
//!   graph.take_producers()
//!       └──► ProducerTask::attach(bus, stats) ──► JoinSet::spawn(task.run(child token))
//!   Driver::new(graph) ──► tokio::spawn(driver.run(root token))
//!
//! Event flow:
//!   Driver / ProducerTask ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit(&Event)
//!                                                                 ┌─────────┬─────────┐
//!                                                                 ▼         ▼         ▼
//!                                                          [queue S1] [queue S2] ... [queue SN]
//!
//! Shutdown path (shutdown() or run_until_signal()):
//!   Bus.publish(ShutdownRequested)
//!   root token.cancel()      → driver and every producer observe it
//!   wait with cfg.grace:
//!      ├─ all joined         → Bus.publish(AllStoppedWithin)
//!      └─ grace exceeded     → Bus.publish(GraceExceeded)
//!                              (ProducerTracker.snapshot() names the stuck producers)
//!   listener drains the bus, then subscriber workers are awaited
//! ```
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use cellvisor::{Engine, EngineConfig, Graph, Inputs, Value};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut graph = Graph::new();
//!     let shift = graph.declare_control("shift", 1.0)?;
//!     let shifted = graph.declare_cell("shifted", &["shift"], |i: &Inputs| {
//!         Ok(Value::Float(i.f64("shift")? + 10.0))
//!     })?;
//!
//!     let mut cfg = EngineConfig::default();
//!     cfg.grace = Duration::from_secs(1);
//!     let engine = Engine::builder(cfg).start(graph).await?;
//!
//!     assert_eq!(shifted.wait_value().await?, Value::Float(11.0));
//!     shift.set(2.0);
//!     assert_eq!(shifted.wait_version(2).await?.value, Value::Float(12.0));
//!
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use super::driver::Driver;
use super::{EngineBuilder, EngineConfig, EngineStats, ProducerTracker, StatsSnapshot, shutdown};
use crate::error::{ProducerError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::graph::{CellHandle, Graph};
use crate::subscribers::SubscriberSet;
use crate::value::Value;

/// Background task forwarding bus events to the tracker and the subscribers.
struct Listener {
    handle: JoinHandle<()>,
    token: CancellationToken,
}

/// Tasks owned by a started engine.
struct Running {
    token: CancellationToken,
    driver: JoinHandle<u64>,
    producers: JoinSet<Result<u64, ProducerError>>,
}

/// Drives one [`Graph`] on the current tokio runtime.
pub struct Engine {
    cfg: EngineConfig,
    bus: Bus,
    tracker: Arc<ProducerTracker>,
    listener: Mutex<Option<Listener>>,
    running: tokio::sync::Mutex<Option<Running>>,
    stats: OnceLock<Arc<EngineStats>>,
}

impl Engine {
    /// Starts building an engine with the given configuration.
    pub fn builder(cfg: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(cfg)
    }

    /// Wires the bus listener. Must be called inside a tokio runtime.
    pub(crate) fn new_internal(cfg: EngineConfig, set: SubscriberSet, bus: Bus) -> Self {
        let tracker = Arc::new(ProducerTracker::new());
        let token = CancellationToken::new();
        let handle = spawn_listener(&bus, set, Arc::clone(&tracker), token.clone());
        Self {
            cfg,
            bus,
            tracker,
            listener: Mutex::new(Some(Listener { handle, token })),
            running: tokio::sync::Mutex::new(None),
            stats: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Subscribes to the raw event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Hands `graph` to the engine: spawns its producers and the driver.
    ///
    /// The initial pass runs on the driver task right after this returns.
    ///
    /// # Errors
    /// [`RuntimeError::AlreadyStarted`] if this engine already received a graph.
    pub async fn start(&self, mut graph: Graph) -> Result<(), RuntimeError> {
        let mut running = self.running.lock().await;
        let stats = graph.stats();
        if self.stats.set(Arc::clone(&stats)).is_err() {
            return Err(RuntimeError::AlreadyStarted);
        }

        let mut producers = JoinSet::new();
        for pending in graph.take_producers() {
            let mut task = pending.task;
            task.attach(self.bus.clone(), Arc::clone(&stats));
            producers.spawn(task.run(pending.stop));
        }

        let token = graph.root.clone();
        let driver = Driver::new(graph, self.bus.clone(), self.cfg.propagation);
        let driver = tokio::spawn(driver.run(token.clone()));
        tracing::debug!(producers = producers.len(), "engine started");

        *running = Some(Running {
            token,
            driver,
            producers,
        });
        Ok(())
    }

    /// True between a successful [`start`](Self::start) and [`shutdown`](Self::shutdown).
    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Latest clean value of `cell`.
    ///
    /// Never waits for a pass in progress; see [`CellHandle::wait_value`] for that.
    pub fn current_value(&self, cell: &CellHandle) -> Result<Value, RuntimeError> {
        cell.current_value()
    }

    /// Counters of the running graph (all zero before start).
    pub fn stats(&self) -> StatsSnapshot {
        self.stats
            .get()
            .map(|stats| stats.snapshot())
            .unwrap_or_default()
    }

    /// Names of the producers currently running, as seen on the bus.
    pub async fn running_producers(&self) -> Vec<String> {
        self.tracker.snapshot().await
    }

    /// Stops the driver and every producer, waiting up to the configured grace period.
    ///
    /// Events published before shutdown are still delivered to subscribers.
    ///
    /// # Errors
    /// [`RuntimeError::GraceExceeded`] with the producers still running when the grace expired.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.close(None).await
    }

    /// Starts `graph` and runs until a termination signal, then shuts down.
    ///
    /// The signal name (`sigint`, `sigterm`, `sigquit`) is the reason of the
    /// `ShutdownRequested` event.
    pub async fn run_until_signal(&self, graph: Graph) -> Result<(), RuntimeError> {
        self.start(graph).await?;
        let reason = match shutdown::wait_for_signal().await {
            Ok(signal) => {
                tracing::info!(signal = signal.as_str(), "termination signal received");
                Some(signal.as_str())
            }
            Err(err) => {
                tracing::warn!(error = %err, "signal handling unavailable, shutting down");
                None
            }
        };
        self.close(reason).await
    }

    async fn close(&self, reason: Option<&'static str>) -> Result<(), RuntimeError> {
        let running = self.running.lock().await.take();
        let result = match running {
            Some(running) => self.stop_with_grace(running, reason).await,
            None => Ok(()),
        };
        self.stop_listener().await;
        result
    }

    async fn stop_with_grace(
        &self,
        running: Running,
        reason: Option<&'static str>,
    ) -> Result<(), RuntimeError> {
        let Running {
            token,
            driver,
            mut producers,
        } = running;

        let requested = Event::new(EventKind::ShutdownRequested);
        self.bus.publish(match reason {
            Some(reason) => requested.with_reason(reason),
            None => requested,
        });
        token.cancel();

        let done = async {
            if let Err(err) = driver.await {
                tracing::error!(error = %err, "driver task ended abnormally");
            }
            while producers.join_next().await.is_some() {}
        };

        let Some(grace) = self.cfg.grace_period() else {
            done.await;
            self.bus.publish(Event::new(EventKind::AllStoppedWithin));
            return Ok(());
        };

        match tokio::time::timeout(grace, done).await {
            Ok(()) => {
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                self.bus.publish(Event::new(EventKind::GraceExceeded));
                let stuck = self.tracker.snapshot().await;
                tracing::warn!(?grace, ?stuck, "shutdown grace exceeded");
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }

    async fn stop_listener(&self) {
        let listener = match self.listener.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(listener) = listener {
            listener.token.cancel();
            if let Err(err) = listener.handle.await {
                tracing::error!(error = %err, "event listener ended abnormally");
            }
        }
    }
}

/// Forwards bus events to the tracker and the subscribers until `token` is cancelled,
/// then delivers what is still queued and waits for the subscriber workers.
fn spawn_listener(
    bus: &Bus,
    set: SubscriberSet,
    tracker: Arc<ProducerTracker>,
    token: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Ok(ev) => {
                        tracker.update(&ev).await;
                        set.emit(&ev);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = token.cancelled() => break,
            }
        }

        loop {
            match rx.try_recv() {
                Ok(ev) => {
                    tracker.update(&ev).await;
                    set.emit(&ev);
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        set.shutdown().await;
    })
}
