//! # cellvisor
//!
//! **Cellvisor** is a reactive dataflow engine for Rust.
//!
//! A host declares named *cells* (computations over other named values) and named
//! *sources* (bounded channels fed by producers, self-rescheduling timers, external
//! inputs). Whenever a source fires, every cell that transitively depends on it is
//! marked dirty and re-evaluated exactly once, in dependency order, in a single pass.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ ProducerTask │   │ ProducerTask │   │  host code   │
//!     │ (generator)  │   │ (generator)  │   │ Control::set │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼ put              ▼ put              ▼ notify
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │BoundedChannel│   │BoundedChannel│   │    input     │   │    timer     │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │  Driver (one task, owns the Graph)                                        │
//! │  - FuturesUnordered of armed sources                                      │
//! │  - firing ─► mark dirty downstream ─► one pass in topological order       │
//! │  - cells: Evaluated / Failed / Blocked / Gated                            │
//! └──────┬────────────────────────────────────────────────────────────┬───────┘
//!        │ CellHandle (watch)                                         │ publish
//!        ▼                                                            ▼
//!   host reads current_value()               ┌──────────────────────────────────┐
//!                                            │     Bus (broadcast channel)      │
//!                                            └────────────────┬─────────────────┘
//!                                                             ▼
//!                                                 engine listener
//!                                                 ├─► ProducerTracker
//!                                                 └─► SubscriberSet ─► workers ─► on_event()
//! ```
//!
//! ### Pass lifecycle
//! ```text
//! source fires
//!   ├─► source value updated (item taken / timer rescheduled / input re-read)
//!   ├─► every transitive reader marked DIRTY
//!   └─► dirty cells in topological order:
//!         ├─ gate falsy                  → Gated    (stays dirty)
//!         ├─ an upstream has no value    → Blocked  (stays dirty)
//!         ├─ computation Ok              → Evaluated, version += 1, CLEAN
//!         └─ computation Err / panic     → Failed   (value and version kept)
//! ```
//!
//! ## Features
//! | Area              | Description                                                     | Key types / traits                          |
//! |-------------------|-----------------------------------------------------------------|---------------------------------------------|
//! | **Graph**         | Declare cells, sources and gates; cycles rejected up front.     | [`Graph`], [`CellHandle`], [`Inputs`]       |
//! | **Sources**       | Channels, timers and inputs that fire passes.                   | [`ChannelHandle`], [`TimerHandle`], [`Control`] |
//! | **Producers**     | Cancellable generator loops feeding channels.                   | [`Generate`], [`GenerateFn`], [`ProducerTask`] |
//! | **Primitives**    | Bounded channel with overflow policies, rolling window.         | [`BoundedChannel`], [`RollingWindow`]       |
//! | **Engine**        | Runs a graph, fans out events, shuts down with grace.           | [`Engine`], [`EngineConfig`]                |
//! | **Subscriber API**| Hook into pass and producer events.                             | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | Typed errors for declaration, cells, producers and runtime.     | [`GraphError`], [`CellError`], [`RuntimeError`] |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] subscriber backed by `tracing`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use cellvisor::{Engine, EngineConfig, Graph, Inputs, ProducerError, GenerateFn, Value};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut graph = Graph::new();
//!
//!     let mut n = 0.0;
//!     let counter = GenerateFn::new(move || {
//!         n += 1.0;
//!         Ok::<_, ProducerError>(n)
//!     });
//!     let (_update, producer) =
//!         graph.register_producer("update", counter, 2, Duration::from_secs(1))?;
//!
//!     let gain = graph.declare_control("gain", 10.0)?;
//!     let scaled = graph.declare_cell("scaled", &["update", "gain"], |i: &Inputs| {
//!         Ok(Value::Float(i.f64("update")? * i.f64("gain")?))
//!     })?;
//!
//!     let engine = Engine::builder(EngineConfig::default()).start(graph).await?;
//!
//!     assert_eq!(scaled.wait_value().await?, Value::Float(10.0));
//!     gain.set(100.0);
//!
//!     producer.stop();
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod graph;
mod primitives;
mod producers;
mod subscribers;
mod triggers;
mod value;

// ---- Public re-exports ----

pub use core::{Engine, EngineBuilder, EngineConfig, EngineStats, Propagation, StatsSnapshot};
pub use error::{CellError, GraphError, ProducerError, RuntimeError};
pub use events::{Bus, Event, EventKind};
pub use graph::{
    CellHandle, CellSnapshot, CellState, ChannelHandle, Computation, Graph, Inputs, NodeId,
    Outcome, PassReport,
};
pub use primitives::{BoundedChannel, Delivery, OverflowPolicy, RollingWindow};
pub use producers::{Generate, GenerateFn, ProducerHandle, ProducerStatus, ProducerTask};
pub use subscribers::{Subscribe, SubscriberSet};
pub use triggers::{Control, InputHandle, Schedule, TimerHandle, TimerStatus, next_boundary};
pub use value::Value;

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
