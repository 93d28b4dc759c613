//! Runtime core: driving, lifecycle and configuration.
//!
//! The public API of this module is [`Engine`] (with its [`EngineBuilder`]),
//! [`EngineConfig`] and the [`EngineStats`] counters.
//!
//! Internal modules:
//! - [`driver`]: arms sources and turns each firing into one propagation pass;
//! - [`engine`]: spawns the driver and producers, fans out events, shuts down with grace;
//! - [`alive`]: tracks which producers are running, for the shutdown report;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod alive;
mod builder;
mod config;
mod driver;
mod engine;
mod shutdown;
mod stats;

pub use alive::ProducerTracker;
pub use builder::EngineBuilder;
pub use config::{EngineConfig, Propagation};
pub use engine::Engine;
pub use stats::{EngineStats, StatsSnapshot};
