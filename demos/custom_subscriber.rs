//! # Example: custom_subscriber
//!
//! Demonstrates how to build and attach a custom event subscriber.
//!
//! Shows how to:
//! - Implement the [`Subscribe`] trait.
//! - Inspect [`Event`] / [`EventKind`] for pass and producer activity.
//! - Wire the subscriber into [`Engine::builder`].
//!
//! ## Flow
//! ```text
//! Graph ──► EngineBuilder::start()
//!     ├─► Driver: startup pass ──► publish(PassStarted / CellEvaluated / PassCompleted)
//!     ├─► ProducerTask ──► publish(ProducerStarted / ProducerFailed)
//!     ├─► firings ──► publish(ChannelArrival / TimerFired) ──► one pass each
//!     └─► engine listener
//!           ├─► ProducerTracker.update()
//!           └─► SubscriberSet.emit() ──► ConsoleSubscriber.on_event()
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example custom_subscriber
//! ```

use std::{sync::Arc, time::Duration};

use cellvisor::{
    CellError, Engine, EngineConfig, Event, EventKind, GenerateFn, Graph, Inputs, ProducerError,
    Schedule, Subscribe, Value,
};
use tokio::time::Instant;

/// A simple console subscriber that prints selected events.
/// In real life, you could export metrics, ship logs, or trigger alerts.
struct ConsoleSubscriber;

#[async_trait::async_trait]
impl Subscribe for ConsoleSubscriber {
    async fn on_event(&self, ev: &Event) {
        let name = ev.name.as_deref().unwrap_or("<unknown>");
        match ev.kind {
            // === Passes ===
            EventKind::PassStarted => {
                println!(
                    "[sub] pass #{} started:   trigger={} dirty={}",
                    ev.pass.unwrap_or(0),
                    ev.trigger.as_deref().unwrap_or("<none>"),
                    ev.count.unwrap_or(0)
                );
            }
            EventKind::PassCompleted => {
                println!(
                    "[sub] pass #{} completed: evaluated={}",
                    ev.pass.unwrap_or(0),
                    ev.count.unwrap_or(0)
                );
            }

            // === Cells ===
            EventKind::CellEvaluated => {
                println!("[sub]   evaluated: cell={name} v{}", ev.version.unwrap_or(0));
            }
            EventKind::CellFailed => {
                println!(
                    "[sub]   failed:    cell={name} reason={}",
                    ev.reason.as_deref().unwrap_or("<none>")
                );
            }
            EventKind::CellBlocked | EventKind::CellGated => {
                println!("[sub]   held:      cell={name} ({:?})", ev.kind);
            }

            // === Sources ===
            EventKind::ChannelArrival => {
                println!("[sub] arrival:   channel={name} pending={}", ev.count.unwrap_or(0));
            }
            EventKind::TimerFired => {
                let next = ev.delay_ms.map(|v| format!("{v}ms")).unwrap_or_default();
                println!("[sub] timer:     {name} fires={} next_in={next}", ev.count.unwrap_or(0));
            }
            EventKind::InputChanged => {
                println!(
                    "[sub] input:     {name} = {}",
                    ev.reason.as_deref().unwrap_or("<none>")
                );
            }

            // === Producers ===
            EventKind::ProducerStarted => println!("[sub] producer started: {name}"),
            EventKind::ProducerStopped => println!("[sub] producer stopped: {name}"),
            EventKind::ProducerFailed => {
                println!(
                    "[sub] producer failed:  {name} reason={}",
                    ev.reason.as_deref().unwrap_or("<none>")
                );
            }
            EventKind::ItemDropped => println!("[sub] item dropped: channel={name}"),

            // === Lifecycle ===
            EventKind::EngineStarted => {
                println!("[sub] engine started with {} nodes", ev.count.unwrap_or(0));
            }
            EventKind::ShutdownRequested => println!("[sub] shutdown requested"),
            EventKind::AllStoppedWithin => println!("[sub] all stopped within grace"),
            EventKind::GraceExceeded => println!("[sub] grace exceeded"),

            // === Ignored ===
            EventKind::SubscriberPanicked | EventKind::SubscriberOverflow => {}
        }
    }

    fn name(&self) -> &'static str {
        "console"
    }

    fn queue_capacity(&self) -> usize {
        1024
    }
}

/// Counts down from 3, then fails (to demonstrate ProducerFailed).
fn countdown() -> GenerateFn<impl FnMut() -> Result<i64, ProducerError> + Send + 'static> {
    let mut left = 4i64;
    GenerateFn::new(move || {
        left -= 1;
        if left < 0 {
            return Err(ProducerError::fail("countdown exhausted"));
        }
        Ok(left)
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    println!("custom_subscriber demo\n");

    let mut graph = Graph::new();
    graph.register_producer("countdown", countdown(), 2, Duration::from_millis(200))?;
    graph.declare_cell("inverse", &["countdown"], |i: &Inputs| {
        let n = i.f64("countdown")?;
        if n == 0.0 {
            return Err(CellError::fail("division by zero"));
        }
        Ok(Value::Float(1.0 / n))
    })?;
    graph.declare_cell("shout", &["inverse"], |i: &Inputs| {
        Ok(Value::from(format!("inverse is {}!", i.get("inverse")?)))
    })?;
    graph.declare_timer(
        "tick",
        Instant::now() + Duration::from_millis(350),
        Schedule::every(Duration::from_millis(350)),
    )?;
    let label = graph.declare_control("label", "ticks")?;
    graph.declare_cell("ticks", &["tick", "label"], |i: &Inputs| {
        Ok(Value::from(format!("{}: {}", i.get("label")?, i.i64("tick")?)))
    })?;

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(ConsoleSubscriber)];
    let engine = Engine::builder(EngineConfig::default())
        .with_subscribers(subs)
        .start(graph)
        .await?;

    tokio::time::sleep(Duration::from_millis(600)).await;
    label.set("timer");
    tokio::time::sleep(Duration::from_millis(600)).await;

    engine.shutdown().await?;
    println!("\nfinished: {:?}", engine.stats());
    Ok(())
}
