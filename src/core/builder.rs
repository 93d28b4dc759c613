use std::sync::Arc;

use super::{Engine, EngineConfig};
use crate::error::RuntimeError;
use crate::events::Bus;
use crate::graph::Graph;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for constructing an [`Engine`] with optional subscribers.
pub struct EngineBuilder {
    cfg: EngineConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl EngineBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: EngineConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive engine events (passes, cell outcomes, producer lifecycle)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the engine without a graph.
    ///
    /// Initializes the event bus and spawns the subscriber workers, so it must be
    /// called inside a tokio runtime.
    pub fn build(self) -> Arc<Engine> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let set = SubscriberSet::new(self.subscribers, bus.clone());
        Arc::new(Engine::new_internal(self.cfg, set, bus))
    }

    /// Builds the engine and starts driving `graph`.
    pub async fn start(self, graph: Graph) -> Result<Arc<Engine>, RuntimeError> {
        let engine = self.build();
        engine.start(graph).await?;
        Ok(engine)
    }
}
