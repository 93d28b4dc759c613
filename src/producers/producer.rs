//! # Background producer loop.
//!
//! A [`ProducerTask`] repeatedly generates a value, puts it into its channel and sleeps.
//! It runs on its own tokio task, concurrently with the engine driver.
//!
//! ## Loop
//! ```text
//! publish ProducerStarted
//! loop {
//!   ├─► generate()                 (error or panic → ProducerFailed, exit Err)
//!   ├─► put(value)   ◄── stop?     (cancelled put enqueues nothing)
//!   │     └─ lossy delivery → ItemDropped
//!   └─► sleep(period) ◄── stop?
//! }
//! publish ProducerStopped { delivered }
//! ```
//!
//! ## Rules
//! - Stop is observed while waiting on a full channel and while sleeping, so within one period.
//! - A failed generator is never restarted; items already queued stay in the channel.
//! - Stopping a producer does not stop the engine.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Generate;
use crate::core::EngineStats;
use crate::error::{ProducerError, panic_message};
use crate::events::{Bus, Event, EventKind};
use crate::primitives::{BoundedChannel, Delivery};
use crate::value::Value;

/// Lifecycle of a producer as seen by its owner.
#[derive(Clone, Debug, PartialEq)]
pub enum ProducerStatus {
    /// Declared but not running yet.
    Idle,
    /// Generating values.
    Running,
    /// Observed its stop signal and exited.
    Stopped {
        /// Items enqueued during the run.
        delivered: u64,
    },
    /// The generator failed; the producer is terminated.
    Failed(ProducerError),
}

impl ProducerStatus {
    /// True once the producer has exited, cleanly or not.
    pub fn is_finished(&self) -> bool {
        matches!(self, ProducerStatus::Stopped { .. } | ProducerStatus::Failed(_))
    }
}

/// A cancellable generator loop feeding one channel.
pub struct ProducerTask {
    name: Arc<str>,
    generator: Box<dyn Generate>,
    channel: Arc<BoundedChannel<Value>>,
    period: Duration,
    bus: Option<Bus>,
    stats: Option<Arc<EngineStats>>,
    status: watch::Sender<ProducerStatus>,
}

impl ProducerTask {
    /// Creates a producer putting one generated value into `channel` every `period`.
    pub fn new(
        name: impl Into<Arc<str>>,
        generator: impl Generate,
        channel: Arc<BoundedChannel<Value>>,
        period: Duration,
    ) -> Self {
        let (status, _) = watch::channel(ProducerStatus::Idle);
        Self {
            name: name.into(),
            generator: Box::new(generator),
            channel,
            period,
            bus: None,
            stats: None,
            status,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Observes the producer's lifecycle.
    pub fn status(&self) -> watch::Receiver<ProducerStatus> {
        self.status.subscribe()
    }

    /// Routes lifecycle events and drop counters to a running engine.
    pub(crate) fn attach(&mut self, bus: Bus, stats: Arc<EngineStats>) {
        self.bus = Some(bus);
        self.stats = Some(stats);
    }

    /// Spawns the loop on the current tokio runtime.
    pub fn start(self, stop: CancellationToken) -> JoinHandle<Result<u64, ProducerError>> {
        tokio::spawn(self.run(stop))
    }

    /// Runs the loop until `stop` is cancelled or the generator fails.
    ///
    /// Returns the number of items enqueued.
    pub async fn run(mut self, stop: CancellationToken) -> Result<u64, ProducerError> {
        self.status.send_replace(ProducerStatus::Running);
        self.publish(Event::new(EventKind::ProducerStarted));

        let mut delivered = 0u64;
        while !stop.is_cancelled() {
            let generated = AssertUnwindSafe(self.generator.generate())
                .catch_unwind()
                .await;
            let value = match generated {
                Ok(Ok(value)) => value,
                Ok(Err(err)) => return Err(self.fail(err, delivered)),
                Err(panic) => {
                    let err = ProducerError::Panicked {
                        info: panic_message(&*panic),
                    };
                    return Err(self.fail(err, delivered));
                }
            };

            let delivery = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                d = self.channel.put(value) => d,
            };
            match delivery {
                Delivery::Enqueued => delivered += 1,
                Delivery::DisplacedOldest(_) => {
                    delivered += 1;
                    self.dropped("displaced_oldest");
                }
                Delivery::Rejected(_) => self.dropped("rejected_newest"),
            }

            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(self.period) => {}
            }
        }

        self.status
            .send_replace(ProducerStatus::Stopped { delivered });
        self.publish(Event::new(EventKind::ProducerStopped).with_count(delivered));
        Ok(delivered)
    }

    fn fail(&self, err: ProducerError, delivered: u64) -> ProducerError {
        tracing::warn!(producer = %self.name, error = %err, "producer terminated");
        self.status.send_replace(ProducerStatus::Failed(err.clone()));
        self.publish(
            Event::new(EventKind::ProducerFailed)
                .with_reason(err.as_message())
                .with_count(delivered),
        );
        err
    }

    fn dropped(&self, reason: &'static str) {
        if let Some(stats) = &self.stats {
            stats.record_dropped();
        }
        self.publish(Event::new(EventKind::ItemDropped).with_reason(reason));
    }

    fn publish(&self, ev: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(ev.with_name(Arc::clone(&self.name)));
        }
    }
}

/// Owner-side handle of a registered producer.
#[derive(Clone, Debug)]
pub struct ProducerHandle {
    pub(crate) name: Arc<str>,
    pub(crate) stop: CancellationToken,
    pub(crate) status: watch::Receiver<ProducerStatus>,
}

impl ProducerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requests a cooperative stop. The engine keeps running.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// True once a stop was requested (by this handle or by engine shutdown).
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Current lifecycle state.
    pub fn status(&self) -> ProducerStatus {
        self.status.borrow().clone()
    }

    /// Waits until the producer exits and returns its final state.
    pub async fn wait_finished(&self) -> ProducerStatus {
        let mut rx = self.status.clone();
        if let Err(err) = rx.wait_for(ProducerStatus::is_finished).await {
            // The task was dropped without finishing; the last state is all there is.
            tracing::debug!(producer = %self.name, error = %err, "producer status channel closed");
        }
        let status = rx.borrow().clone();
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producers::GenerateFn;

    fn counter(limit: u32) -> GenerateFn<impl FnMut() -> Result<f64, ProducerError> + Send> {
        let mut n = 0u32;
        GenerateFn::new(move || {
            n += 1;
            if n > limit {
                return Err(ProducerError::fail("exhausted"));
            }
            Ok(f64::from(n))
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_terminates_and_keeps_queued_items() {
        let channel = Arc::new(BoundedChannel::new(4).unwrap());
        let task = ProducerTask::new(
            "counter",
            counter(2),
            Arc::clone(&channel),
            Duration::from_secs(1),
        );
        let status = task.status();

        let res = task.start(CancellationToken::new()).await.unwrap();
        assert_eq!(res, Err(ProducerError::fail("exhausted")));
        assert_eq!(
            *status.borrow(),
            ProducerStatus::Failed(ProducerError::fail("exhausted"))
        );
        assert_eq!(channel.try_take(), Some(Value::Float(1.0)));
        assert_eq!(channel.try_take(), Some(Value::Float(2.0)));
        assert_eq!(channel.try_take(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_blocked_on_full_channel() {
        let channel = Arc::new(BoundedChannel::new(1).unwrap());
        let stop = CancellationToken::new();
        let task = ProducerTask::new(
            "counter",
            counter(100),
            Arc::clone(&channel),
            Duration::from_millis(10),
        );
        let handle = task.start(stop.clone());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(channel.len(), 1);
        stop.cancel();

        assert_eq!(handle.await.unwrap(), Ok(1));
        assert_eq!(channel.try_take(), Some(Value::Float(1.0)));
        assert_eq!(channel.try_take(), None);
    }

    #[tokio::test]
    async fn test_wait_finished_returns_when_task_is_dropped_unstarted() {
        let mut graph = crate::graph::Graph::new();
        let (_, producer) = graph
            .register_producer("never", counter(1), 1, Duration::from_secs(1))
            .unwrap();
        drop(graph);

        assert_eq!(producer.wait_finished().await, ProducerStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_generator_is_reported() {
        let channel = Arc::new(BoundedChannel::new(1).unwrap());
        let generator = GenerateFn::new(|| -> Result<f64, ProducerError> { panic!("sensor fault") });
        let task = ProducerTask::new("faulty", generator, channel, Duration::from_secs(1));

        let res = task.run(CancellationToken::new()).await;
        assert_eq!(
            res,
            Err(ProducerError::Panicked {
                info: "sensor fault".into()
            })
        );
    }
}
