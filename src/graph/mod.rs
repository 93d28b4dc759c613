//! # Reactive dependency graph.
//!
//! - [`Graph`]: declares cells, sources and gates, rejecting cycles at declaration
//! - [`CellHandle`]: read side of a cell, valid while the engine runs it
//! - scheduler: dirty marking and topologically ordered evaluation passes
//!
//! ```text
//!   sources (channel / timer / input) ──► cells ──► cells ...
//!        fire ──► mark dirty downstream ──► one pass in topological order
//! ```

mod cell;
#[allow(clippy::module_inception)]
mod graph;
mod scheduler;

use petgraph::graph::NodeIndex;

pub use cell::{CellHandle, CellSnapshot, CellState, Computation, Inputs};
pub use graph::{ChannelHandle, Graph};
pub use scheduler::{Outcome, PassReport};

pub(crate) use scheduler::Scope;

/// Stable identifier of a node within its graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) NodeIndex);

impl NodeId {
    /// Position of the node in declaration order.
    pub fn index(self) -> usize {
        self.0.index()
    }
}
