//! # Dependency graph construction.
//!
//! [`Graph`] owns every node: cells, channel/timer/input sources and placeholders for
//! names that are read before they are declared. Edges point from a node to the nodes
//! that read it.
//!
//! ```text
//!   source "update" ──► cell "walk" ──► window "history" ──► cell "plot"
//!   input  "shift"  ──┘                                     ▲
//!   input  "variance" ──────────────────────────────────────┘ (gate, optional)
//! ```
//!
//! ## Rules
//! - Declarations that would close a cycle are rejected with [`GraphError::Cycle`].
//! - A failed declaration leaves the graph exactly as it was.
//! - Cells without upstreams are evaluated once, eagerly, at declaration.
//! - Reading an undeclared name creates a placeholder; cells reading it stay blocked
//!   until a node with that name is declared.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use petgraph::algo::{astar, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use tokio::sync::{Notify, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::NodeId;
use super::cell::{Cell, CellHandle, Inputs};
use crate::core::EngineStats;
use crate::error::{CellError, GraphError};
use crate::primitives::{BoundedChannel, OverflowPolicy, RollingWindow};
use crate::producers::{Generate, ProducerHandle, ProducerTask};
use crate::triggers::{
    Control, InputHandle, ReadFn, Schedule, TimerHandle, TimerState, TriggerSource,
};
use crate::value::Value;

/// A source node: something that fires and exposes a value to its readers.
pub(crate) struct Source {
    pub(crate) trigger: TriggerSource,
    pub(crate) value: Option<Value>,
}

pub(crate) enum NodeKind {
    /// Read by some cell but not declared yet.
    Pending,
    Cell(Cell),
    Source(Source),
}

pub(crate) struct Node {
    pub(crate) name: Arc<str>,
    pub(crate) kind: NodeKind,
}

/// Handle to a declared channel.
///
/// The channel can be fed by registered producers or directly by the host.
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    pub(crate) id: NodeId,
    pub(crate) name: Arc<str>,
    pub(crate) channel: Arc<BoundedChannel<Value>>,
}

impl ChannelHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying channel (producer side).
    pub fn channel(&self) -> &Arc<BoundedChannel<Value>> {
        &self.channel
    }

    /// Items waiting to be taken by the engine.
    pub fn pending(&self) -> usize {
        self.channel.len()
    }
}

/// Producer registered on a graph, spawned when the engine starts.
pub(crate) struct PendingProducer {
    pub(crate) task: ProducerTask,
    pub(crate) stop: CancellationToken,
}

/// The reactive dependency graph under construction.
///
/// Built on the host side, then moved into an [`Engine`](crate::Engine) which drives it.
pub struct Graph {
    pub(crate) dag: DiGraph<Node, ()>,
    names: HashMap<Arc<str>, NodeIndex>,
    pub(crate) topo: Vec<NodeIndex>,
    pub(crate) producers: Vec<PendingProducer>,
    pub(crate) root: CancellationToken,
    stats: Arc<EngineStats>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self {
            dag: DiGraph::new(),
            names: HashMap::new(),
            topo: Vec::new(),
            producers: Vec::new(),
            root: CancellationToken::new(),
            stats: Arc::new(EngineStats::new()),
        }
    }

    /// Resource counters of the engine that will drive this graph.
    ///
    /// Cells may capture this to sample the engine's own usage.
    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    /// Number of declared nodes (placeholders excluded).
    pub fn len(&self) -> usize {
        self.dag
            .node_weights()
            .filter(|n| !matches!(n.kind, NodeKind::Pending))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if a node called `name` is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.names
            .get(name)
            .is_some_and(|&idx| !matches!(self.dag[idx].kind, NodeKind::Pending))
    }

    /// Names read by some cell but never declared.
    pub fn undeclared(&self) -> Vec<&str> {
        self.dag
            .node_weights()
            .filter(|n| matches!(n.kind, NodeKind::Pending))
            .map(|n| &*n.name)
            .collect()
    }

    /// Declares a channel fed by the host or by producers.
    pub fn declare_channel(
        &mut self,
        name: impl Into<Arc<str>>,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> Result<ChannelHandle, GraphError> {
        let name = name.into();
        let channel = Arc::new(BoundedChannel::with_policy(capacity, policy)?);
        let trigger = TriggerSource::ChannelArrival {
            channel: Arc::clone(&channel),
        };
        let idx = self.insert_source(&name, trigger, None)?;
        Ok(ChannelHandle {
            id: NodeId(idx),
            name,
            channel,
        })
    }

    /// Registers a producer feeding a new lossless channel of `capacity` items.
    ///
    /// The channel is a source named `name`; cells read the last item taken from it.
    /// The producer starts with the engine; the returned handle stops it.
    pub fn register_producer(
        &mut self,
        name: impl Into<Arc<str>>,
        generator: impl Generate,
        capacity: usize,
        period: Duration,
    ) -> Result<(ChannelHandle, ProducerHandle), GraphError> {
        self.register_producer_with_policy(name, generator, capacity, OverflowPolicy::Block, period)
    }

    /// Like [`register_producer`](Self::register_producer) with an explicit overflow policy.
    pub fn register_producer_with_policy(
        &mut self,
        name: impl Into<Arc<str>>,
        generator: impl Generate,
        capacity: usize,
        policy: OverflowPolicy,
        period: Duration,
    ) -> Result<(ChannelHandle, ProducerHandle), GraphError> {
        let channel = self.declare_channel(name, capacity, policy)?;
        let task = ProducerTask::new(
            Arc::clone(&channel.name),
            generator,
            Arc::clone(&channel.channel),
            period,
        );
        let stop = self.root.child_token();
        let handle = ProducerHandle {
            name: Arc::clone(&channel.name),
            stop: stop.clone(),
            status: task.status(),
        };
        self.producers.push(PendingProducer { task, stop });
        Ok((channel, handle))
    }

    /// Declares a timer first due at `first`, rescheduled by `schedule` after each firing.
    ///
    /// Cells read the number of firings so far (`Value::Int`, starting at 0).
    pub fn declare_timer(
        &mut self,
        name: impl Into<Arc<str>>,
        first: Instant,
        schedule: Schedule,
    ) -> Result<TimerHandle, GraphError> {
        let name = name.into();
        let (timer, status) = TimerState::new(first, schedule);
        let idx = self.insert_source(&name, TriggerSource::Timer(timer), Some(Value::Int(0)))?;
        Ok(TimerHandle {
            id: NodeId(idx),
            name,
            status,
        })
    }

    /// Declares an external input read through `read`.
    ///
    /// The value is read once now; afterwards it is re-read whenever the handle is notified.
    pub fn declare_input<F>(
        &mut self,
        name: impl Into<Arc<str>>,
        read: F,
    ) -> Result<InputHandle, GraphError>
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        let read: ReadFn = Arc::new(read);
        self.insert_input(name.into(), read)
    }

    /// Declares an input that stores its own value.
    pub fn declare_control(
        &mut self,
        name: impl Into<Arc<str>>,
        initial: impl Into<Value>,
    ) -> Result<Control, GraphError> {
        let (tx, _) = watch::channel(initial.into());
        let value = Arc::new(tx);
        let reader = Arc::clone(&value);
        let read: ReadFn = Arc::new(move || reader.borrow().clone());
        let input = self.insert_input(name.into(), read)?;
        Ok(Control { input, value })
    }

    fn insert_input(&mut self, name: Arc<str>, read: ReadFn) -> Result<InputHandle, GraphError> {
        let notify = Arc::new(Notify::new());
        let initial = read();
        let trigger = TriggerSource::InputChange {
            read,
            notify: Arc::clone(&notify),
        };
        let idx = self.insert_source(&name, trigger, Some(initial))?;
        Ok(InputHandle {
            id: NodeId(idx),
            name,
            notify,
        })
    }

    /// Declares a cell computing a value from the named upstreams.
    ///
    /// Upstreams may be cells, channels, timers or inputs, declared before or after this cell.
    /// A cell without upstreams is evaluated immediately.
    ///
    /// # Errors
    /// - [`GraphError::DuplicateName`] if `name` is taken
    /// - [`GraphError::Cycle`] if an upstream (transitively) reads `name`
    /// - [`GraphError::InitialEvaluation`] if an inputless computation fails
    ///
    /// # Example
    /// ```
    /// use cellvisor::{Graph, Inputs, Value};
    ///
    /// let mut graph = Graph::new();
    /// let answer = graph.declare_cell("answer", &[], |_: &Inputs| Ok(Value::Int(42))).unwrap();
    /// assert_eq!(answer.current_value(), Ok(Value::Int(42)));
    ///
    /// let err = graph.declare_cell("loop", &["loop"], |_: &Inputs| Ok(Value::Unit)).unwrap_err();
    /// assert_eq!(err.as_label(), "graph_cycle");
    /// ```
    pub fn declare_cell<F>(
        &mut self,
        name: impl Into<Arc<str>>,
        upstreams: &[&str],
        computation: F,
    ) -> Result<CellHandle, GraphError>
    where
        F: FnMut(&Inputs) -> Result<Value, CellError> + Send + 'static,
    {
        let name = name.into();
        let placeholder = match self.names.get(&name) {
            Some(&idx) if matches!(self.dag[idx].kind, NodeKind::Pending) => Some(idx),
            Some(_) => {
                return Err(GraphError::DuplicateName {
                    name: name.to_string(),
                });
            }
            None => None,
        };

        let mut reads: Vec<&str> = Vec::with_capacity(upstreams.len());
        for &upstream in upstreams {
            if !reads.contains(&upstream) {
                reads.push(upstream);
            }
        }
        self.check_acyclic(&name, placeholder, &reads)?;

        let mut cell = Cell::new(Box::new(computation));
        if reads.is_empty() {
            cell.evaluate(&Inputs::default())
                .map_err(|error| GraphError::InitialEvaluation {
                    cell: name.to_string(),
                    error,
                })?;
        }

        // Validated: from here on the graph is mutated.
        let idx = match placeholder {
            Some(idx) => idx,
            None => self.add_node(Arc::clone(&name), NodeKind::Pending),
        };
        for upstream in reads {
            let up = match self.names.get(upstream) {
                Some(&up) => up,
                None => self.add_node(upstream.into(), NodeKind::Pending),
            };
            self.dag.add_edge(up, idx, ());
            cell.upstreams.push(up);
        }
        let rx = cell.subscribe();
        self.dag[idx].kind = NodeKind::Cell(cell);
        self.refresh_order();

        tracing::debug!(cell = %name, upstreams = upstreams.len(), "cell declared");
        Ok(CellHandle {
            id: NodeId(idx),
            name,
            rx,
        })
    }

    /// Declares a cell owning a rolling window of `capacity` values.
    ///
    /// Each time it runs it appends the value of `upstream` and outputs the window
    /// contents, oldest first, as a `Value::List`.
    pub fn declare_window(
        &mut self,
        name: impl Into<Arc<str>>,
        upstream: &str,
        capacity: usize,
        seed: Option<Value>,
    ) -> Result<CellHandle, GraphError> {
        let mut window = match seed {
            Some(seed) => RollingWindow::with_seed(capacity, seed)?,
            None => RollingWindow::new(capacity)?,
        };
        let source: Arc<str> = upstream.into();
        self.declare_cell(name, &[upstream], move |inputs: &Inputs| {
            let value = inputs.get(&source)?.clone();
            window.append(value);
            Ok(Value::list(window.iter().cloned()))
        })
    }

    /// Makes `cell` honour its dirty flag only while `input` is truthy.
    ///
    /// While the input is falsy the cell stays dirty and its readers are blocked;
    /// switching the input back on re-runs it.
    pub fn gate(
        &mut self,
        cell: &CellHandle,
        input: impl AsRef<InputHandle>,
    ) -> Result<(), GraphError> {
        let input = input.as_ref();
        let unknown = |name: &str| GraphError::UnknownNode {
            name: name.to_string(),
        };
        let cell_idx = self.resolve(cell.id, cell.name()).ok_or_else(|| unknown(cell.name()))?;
        let input_idx = self
            .resolve(input.id, input.name())
            .ok_or_else(|| unknown(input.name()))?;
        let is_input = matches!(
            self.dag.node_weight(input_idx).map(|n| &n.kind),
            Some(NodeKind::Source(Source {
                trigger: TriggerSource::InputChange { .. },
                ..
            }))
        );
        if !is_input {
            return Err(unknown(input.name()));
        }
        match self.dag.node_weight_mut(cell_idx).map(|n| &mut n.kind) {
            Some(NodeKind::Cell(c)) => c.gate = Some(input_idx),
            _ => return Err(unknown(cell.name())),
        }
        self.dag.update_edge(input_idx, cell_idx, ());
        self.refresh_order();
        Ok(())
    }

    /// Index behind a handle, if the handle was issued by this graph.
    fn resolve(&self, id: NodeId, name: &str) -> Option<NodeIndex> {
        let idx = id.0;
        (self.names.get(name) == Some(&idx)).then_some(idx)
    }

    /// Rejects upstreams that already (transitively) read the cell being declared.
    fn check_acyclic(
        &self,
        name: &Arc<str>,
        placeholder: Option<NodeIndex>,
        reads: &[&str],
    ) -> Result<(), GraphError> {
        if reads.contains(&&**name) {
            return Err(GraphError::Cycle {
                cell: name.to_string(),
                path: vec![name.to_string(), name.to_string()],
            });
        }
        // A brand new node has no readers yet, so only a placeholder can close a cycle.
        let Some(start) = placeholder else {
            return Ok(());
        };
        for upstream in reads {
            let Some(&goal) = self.names.get(*upstream) else {
                continue;
            };
            if let Some((_, path)) = astar(&self.dag, start, |n| n == goal, |_| 1u32, |_| 0) {
                let mut names: Vec<String> =
                    path.iter().map(|&n| self.dag[n].name.to_string()).collect();
                names.push(name.to_string());
                return Err(GraphError::Cycle {
                    cell: name.to_string(),
                    path: names,
                });
            }
        }
        Ok(())
    }

    fn insert_source(
        &mut self,
        name: &Arc<str>,
        trigger: TriggerSource,
        value: Option<Value>,
    ) -> Result<NodeIndex, GraphError> {
        let kind = NodeKind::Source(Source { trigger, value });
        let idx = match self.names.get(name) {
            Some(&idx) if matches!(self.dag[idx].kind, NodeKind::Pending) => {
                self.dag[idx].kind = kind;
                idx
            }
            Some(_) => {
                return Err(GraphError::DuplicateName {
                    name: name.to_string(),
                });
            }
            None => self.add_node(Arc::clone(name), kind),
        };
        self.refresh_order();
        Ok(idx)
    }

    fn add_node(&mut self, name: Arc<str>, kind: NodeKind) -> NodeIndex {
        let idx = self.dag.add_node(Node {
            name: Arc::clone(&name),
            kind,
        });
        self.names.insert(name, idx);
        idx
    }

    fn refresh_order(&mut self) {
        match toposort(&self.dag, None) {
            Ok(order) => self.topo = order,
            Err(cycle) => {
                tracing::error!(node = %self.dag[cycle.node_id()].name, "dependency graph is cyclic");
            }
        }
    }

    // ---- driver-side accessors ----

    pub(crate) fn name_of(&self, idx: NodeIndex) -> Arc<str> {
        Arc::clone(&self.dag[idx].name)
    }

    pub(crate) fn source(&self, idx: NodeIndex) -> Option<&Source> {
        match &self.dag.node_weight(idx)?.kind {
            NodeKind::Source(source) => Some(source),
            _ => None,
        }
    }

    pub(crate) fn source_mut(&mut self, idx: NodeIndex) -> Option<&mut Source> {
        match &mut self.dag.node_weight_mut(idx)?.kind {
            NodeKind::Source(source) => Some(source),
            _ => None,
        }
    }

    /// Indices of all source nodes.
    pub(crate) fn sources(&self) -> Vec<NodeIndex> {
        self.dag
            .node_indices()
            .filter(|&idx| self.source(idx).is_some())
            .collect()
    }

    /// Reads every input again, so the first pass sees values current at start.
    pub(crate) fn reread_inputs(&mut self) {
        for node in self.dag.node_weights_mut() {
            if let NodeKind::Source(Source {
                trigger: TriggerSource::InputChange { read, .. },
                value,
            }) = &mut node.kind
            {
                *value = Some(read());
            }
        }
    }

    /// Producers registered on this graph; they are handed over exactly once.
    pub(crate) fn take_producers(&mut self) -> Vec<PendingProducer> {
        std::mem::take(&mut self.producers)
    }

    /// Approximate bytes held by all cached cell and source values.
    pub(crate) fn cached_bytes(&self) -> u64 {
        self.dag
            .node_weights()
            .map(|node| match &node.kind {
                NodeKind::Cell(cell) => cell.value.as_ref().map_or(0, Value::approx_bytes),
                NodeKind::Source(source) => source.value.as_ref().map_or(0, Value::approx_bytes),
                NodeKind::Pending => 0,
            })
            .sum::<usize>() as u64
    }
}
