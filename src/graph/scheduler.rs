//! # Dirty propagation and evaluation passes.
//!
//! One firing produces one pass:
//! ```text
//! fire(source)
//!   └─► mark_dirty_from(source)      DFS over "is read by" edges → scope
//!         └─► run_pass(scope)        topological order, each scoped cell at most once
//!               ├─ gate falsy                       → Gated      (stays dirty)
//!               ├─ upstream dirty or without value  → Blocked    (stays dirty)
//!               ├─ nothing it reads changed (*)     → Unchanged  (clean, same version)
//!               ├─ computation Ok                   → Evaluated  (clean, version + 1)
//!               └─ computation Err / panic          → Failed     (stays dirty)
//!
//! (*) only with Propagation::ValueChanged
//! ```
//!
//! Cells outside the scope are never touched by a pass. A cell that failed, was blocked
//! or was gated keeps its previous value and is retried by the next firing that reaches it.

use std::collections::HashSet;
use std::sync::Arc;

use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::visit::Dfs;

use super::cell::{CellState, Inputs};
use super::graph::{Graph, NodeKind};
use crate::core::Propagation;
use crate::error::CellError;
use crate::value::Value;

/// Cells affected by one firing.
#[derive(Debug, Default)]
pub(crate) struct Scope {
    /// Every cell to consider in this pass.
    pub(crate) cells: HashSet<NodeIndex>,
    /// Cells that were clean before the firing reached them.
    pub(crate) fresh: HashSet<NodeIndex>,
}

impl Scope {
    pub(crate) fn len(&self) -> usize {
        self.cells.len()
    }
}

/// What happened to one cell during a pass.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// Computed successfully; carries the new version.
    Evaluated { version: u64 },
    /// The computation failed; value and version are unchanged.
    Failed(CellError),
    /// Some upstream had no valid value.
    Blocked,
    /// The gate input was falsy.
    Gated,
    /// Nothing the cell reads changed value; it was cleaned without running.
    Unchanged,
}

/// Per-cell outcomes of one pass, in evaluation order.
#[derive(Clone, Debug, Default)]
pub struct PassReport {
    pub outcomes: Vec<(Arc<str>, Outcome)>,
}

impl PassReport {
    /// Outcome for the cell called `name`, if it was in scope.
    pub fn outcome(&self, name: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, o)| o)
    }

    /// Names of the cells evaluated successfully, in order.
    pub fn evaluated(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, Outcome::Evaluated { .. }))
            .map(|(n, _)| &**n)
            .collect()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, Outcome::Failed(_)))
            .count()
    }
}

impl Graph {
    /// Marks every cell reachable from `source` dirty.
    pub(crate) fn mark_dirty_from(&mut self, source: NodeIndex) -> Scope {
        let mut scope = Scope::default();
        let mut dfs = Dfs::new(&self.dag, source);
        while let Some(idx) = dfs.next(&self.dag) {
            if let NodeKind::Cell(cell) = &mut self.dag[idx].kind {
                if cell.state == CellState::Clean {
                    scope.fresh.insert(idx);
                }
                cell.state = CellState::Dirty;
                scope.cells.insert(idx);
            }
        }
        scope
    }

    /// Scope of the startup pass: every cell that is still dirty.
    pub(crate) fn dirty_scope(&self) -> Scope {
        let cells = self
            .dag
            .node_indices()
            .filter(|&idx| {
                matches!(&self.dag[idx].kind, NodeKind::Cell(c) if c.state == CellState::Dirty)
            })
            .collect();
        Scope {
            cells,
            fresh: HashSet::new(),
        }
    }

    /// Evaluates the scoped dirty cells in topological order.
    ///
    /// `fired` is the source that triggered the pass, if any.
    pub(crate) fn run_pass(
        &mut self,
        scope: &Scope,
        fired: Option<NodeIndex>,
        propagation: Propagation,
    ) -> PassReport {
        let mut changed: HashSet<NodeIndex> = fired.into_iter().collect();
        let order: Vec<NodeIndex> = self
            .topo
            .iter()
            .copied()
            .filter(|idx| scope.cells.contains(idx))
            .collect();

        let mut report = PassReport::default();
        for idx in order {
            let outcome = self.step(idx, scope, &mut changed, propagation);
            report.outcomes.push((self.name_of(idx), outcome));
        }
        report
    }

    fn step(
        &mut self,
        idx: NodeIndex,
        scope: &Scope,
        changed: &mut HashSet<NodeIndex>,
        propagation: Propagation,
    ) -> Outcome {
        let NodeKind::Cell(cell) = &self.dag[idx].kind else {
            return Outcome::Blocked;
        };

        if let Some(gate) = cell.gate {
            if !self.ready_value(gate).is_some_and(Value::is_truthy) {
                return Outcome::Gated;
            }
        }

        let mut entries = Vec::with_capacity(cell.upstreams.len());
        for &up in &cell.upstreams {
            match self.ready_value(up) {
                Some(value) => entries.push((self.name_of(up), value.clone())),
                None => return Outcome::Blocked,
            }
        }

        let skip = propagation == Propagation::ValueChanged
            && scope.fresh.contains(&idx)
            && !self
                .dag
                .neighbors_directed(idx, Direction::Incoming)
                .any(|up| changed.contains(&up));

        let NodeKind::Cell(cell) = &mut self.dag[idx].kind else {
            return Outcome::Blocked;
        };
        if skip {
            cell.settle();
            return Outcome::Unchanged;
        }

        let previous = cell.value.clone();
        match cell.evaluate(&Inputs::new(entries)) {
            Ok(()) => {
                if propagation == Propagation::Conservative || cell.value != previous {
                    changed.insert(idx);
                }
                Outcome::Evaluated {
                    version: cell.version,
                }
            }
            Err(err) => Outcome::Failed(err),
        }
    }

    /// Value a reader may consume: a clean cell's output or a source's current value.
    fn ready_value(&self, idx: NodeIndex) -> Option<&Value> {
        match &self.dag[idx].kind {
            NodeKind::Cell(cell) if cell.state == CellState::Clean => cell.value.as_ref(),
            NodeKind::Cell(_) | NodeKind::Pending => None,
            NodeKind::Source(source) => source.value.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::OverflowPolicy;
    use crate::value::Value;

    /// Simulates a source firing with a new value.
    fn fire(graph: &mut Graph, source: NodeIndex, value: Value, propagation: Propagation) -> PassReport {
        if let Some(src) = graph.source_mut(source) {
            src.value = Some(value);
        }
        let scope = graph.mark_dirty_from(source);
        graph.run_pass(&scope, Some(source), propagation)
    }

    fn startup(graph: &mut Graph) -> PassReport {
        let scope = graph.dirty_scope();
        graph.run_pass(&scope, None, Propagation::Conservative)
    }

    fn sum(inputs: &Inputs) -> Result<Value, CellError> {
        Ok(Value::Float(inputs.f64("a")? + inputs.f64("b")?))
    }

    #[test]
    fn test_firing_reaches_exactly_the_dependents() {
        let mut graph = Graph::new();
        let a = graph.declare_input("a", || Value::Float(1.0)).unwrap();
        let b = graph.declare_input("b", || Value::Float(1.0)).unwrap();
        let total = graph.declare_cell("sum", &["a", "b"], sum).unwrap();
        graph
            .declare_cell("double", &["sum"], |i: &Inputs| {
                Ok(Value::Float(i.f64("sum")? * 2.0))
            })
            .unwrap();
        let only_b = graph
            .declare_cell("only_b", &["b"], |i: &Inputs| Ok(i.get("b")?.clone()))
            .unwrap();

        let report = startup(&mut graph);
        let mut evaluated = report.evaluated();
        evaluated.sort_unstable();
        assert_eq!(evaluated, vec!["double", "only_b", "sum"]);

        let report = fire(&mut graph, a.id.0, Value::Float(2.0), Propagation::Conservative);
        assert_eq!(report.evaluated(), vec!["sum", "double"]);
        assert_eq!(only_b.version(), 1);
        assert_eq!(total.current_value(), Ok(Value::Float(3.0)));

        let report = fire(&mut graph, b.id.0, Value::Float(3.0), Propagation::Conservative);
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.failed(), 0);
        assert_eq!(total.snapshot().map(|s| s.version), Some(3));
    }

    #[test]
    fn test_failure_blocks_descendants_only() {
        let mut graph = Graph::new();
        let x = graph.declare_input("x", || Value::Float(1.0)).unwrap();
        let ratio = graph
            .declare_cell("ratio", &["x"], |i: &Inputs| {
                let x = i.f64("x")?;
                if x == 0.0 {
                    return Err(CellError::fail("division by zero"));
                }
                Ok(Value::Float(1.0 / x))
            })
            .unwrap();
        let scaled = graph
            .declare_cell("scaled", &["ratio"], |i: &Inputs| {
                Ok(Value::Float(i.f64("ratio")? * 100.0))
            })
            .unwrap();
        let echo = graph
            .declare_cell("echo", &["x"], |i: &Inputs| Ok(i.get("x")?.clone()))
            .unwrap();
        startup(&mut graph);

        let report = fire(&mut graph, x.id.0, Value::Float(0.0), Propagation::Conservative);
        assert_eq!(
            report.outcome("ratio"),
            Some(&Outcome::Failed(CellError::fail("division by zero")))
        );
        assert_eq!(report.outcome("scaled"), Some(&Outcome::Blocked));
        assert_eq!(report.outcome("echo"), Some(&Outcome::Evaluated { version: 2 }));
        assert_eq!(ratio.version(), 1);
        assert_eq!(scaled.current_value(), Ok(Value::Float(100.0)));
        assert_eq!(echo.current_value(), Ok(Value::Float(0.0)));

        let report = fire(&mut graph, x.id.0, Value::Float(4.0), Propagation::Conservative);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.evaluated().len(), 3);
        assert_eq!(scaled.current_value(), Ok(Value::Float(25.0)));
        assert_eq!(ratio.version(), 2);
    }

    #[test]
    fn test_gated_cell_stays_dirty_and_blocks_readers() {
        let mut graph = Graph::new();
        let enabled = graph.declare_control("enabled", false).unwrap();
        graph.declare_input("level", || Value::Int(3)).unwrap();
        let heavy = graph
            .declare_cell("heavy", &["level"], |i: &Inputs| Ok(Value::Int(i.i64("level")? * 10)))
            .unwrap();
        let view = graph
            .declare_cell("view", &["heavy"], |i: &Inputs| Ok(i.get("heavy")?.clone()))
            .unwrap();
        graph.gate(&heavy, &enabled).unwrap();

        let report = startup(&mut graph);
        assert_eq!(report.outcome("heavy"), Some(&Outcome::Gated));
        assert_eq!(report.outcome("view"), Some(&Outcome::Blocked));

        let report = fire(&mut graph, enabled.handle().id.0, Value::Bool(true), Propagation::Conservative);
        assert_eq!(report.evaluated(), vec!["heavy", "view"]);
        assert_eq!(view.current_value(), Ok(Value::Int(30)));
    }

    #[test]
    fn test_value_changed_propagation_skips_unaffected_readers() {
        let mut graph = Graph::new();
        let x = graph.declare_input("x", || Value::Int(1)).unwrap();
        graph
            .declare_cell("positive", &["x"], |i: &Inputs| Ok(Value::Bool(i.i64("x")? > 0)))
            .unwrap();
        let label = graph
            .declare_cell("label", &["positive"], |i: &Inputs| {
                Ok(Value::from(if i.get("positive")?.is_truthy() { "up" } else { "down" }))
            })
            .unwrap();
        startup(&mut graph);

        let report = fire(&mut graph, x.id.0, Value::Int(2), Propagation::ValueChanged);
        assert_eq!(report.outcome("positive"), Some(&Outcome::Evaluated { version: 2 }));
        assert_eq!(report.outcome("label"), Some(&Outcome::Unchanged));
        assert_eq!(label.version(), 1);

        let report = fire(&mut graph, x.id.0, Value::Int(-1), Propagation::ValueChanged);
        assert_eq!(report.outcome("label"), Some(&Outcome::Evaluated { version: 2 }));
        assert_eq!(label.current_value(), Ok(Value::from("down")));

        let report = fire(&mut graph, x.id.0, Value::Int(-5), Propagation::Conservative);
        assert_eq!(report.outcome("label"), Some(&Outcome::Evaluated { version: 3 }));
    }

    #[test]
    fn test_window_cell_accumulates_channel_items() {
        let mut graph = Graph::new();
        let channel = graph.declare_channel("samples", 2, OverflowPolicy::Block).unwrap();
        let history = graph
            .declare_window("history", "samples", 3, Some(Value::Float(0.0)))
            .unwrap();

        // Nothing arrived yet: the window waits instead of appending a placeholder.
        let report = startup(&mut graph);
        assert_eq!(report.outcome("history"), Some(&Outcome::Blocked));

        for x in [0.5, -0.2, 1.1, 0.3] {
            fire(&mut graph, channel.id.0, Value::Float(x), Propagation::Conservative);
        }
        assert_eq!(
            history.current_value().map(|v| v.floats()),
            Ok(Some(vec![-0.2, 1.1, 0.3]))
        );
        assert_eq!(history.version(), 4);
    }

    #[test]
    fn test_placeholder_blocks_until_declared() {
        let mut graph = Graph::new();
        let late = graph
            .declare_cell("late", &["missing"], |i: &Inputs| Ok(i.get("missing")?.clone()))
            .unwrap();
        assert_eq!(startup(&mut graph).outcome("late"), Some(&Outcome::Blocked));

        let missing = graph.declare_input("missing", || Value::Int(9)).unwrap();
        fire(&mut graph, missing.id.0, Value::Int(9), Propagation::Conservative);
        assert_eq!(late.current_value(), Ok(Value::Int(9)));
    }

    proptest::proptest! {
        #[test]
        fn firing_evaluates_exactly_the_reachable_cells(
            reads in proptest::collection::vec(
                proptest::collection::vec(proptest::prelude::any::<proptest::sample::Index>(), 0..3),
                1..12,
            ),
            fired in 0usize..2,
        ) {
            let mut graph = Graph::new();
            let sources = [
                graph.declare_input("s0", || Value::Int(0)).unwrap(),
                graph.declare_input("s1", || Value::Int(0)).unwrap(),
            ];
            let mut names: Vec<String> = vec!["s0".into(), "s1".into()];
            let mut reachable = vec![fired == 0, fired == 1];
            let mut cells = Vec::new();

            for (n, picks) in reads.iter().enumerate() {
                let ups: Vec<&str> = picks.iter().map(|ix| names[ix.index(names.len())].as_str()).collect();
                let hit = picks.iter().any(|ix| reachable[ix.index(names.len())]);
                let name = format!("c{n}");
                let cell = graph
                    .declare_cell(name.as_str(), &ups, |inputs: &Inputs| Ok(Value::Int(inputs.len() as i64)))
                    .unwrap();
                cells.push(cell);
                names.push(name);
                reachable.push(hit);
            }

            startup(&mut graph);
            let before: Vec<u64> = cells.iter().map(|c| c.version()).collect();
            let report = fire(&mut graph, sources[fired].id.0, Value::Int(1), Propagation::Conservative);

            for (k, cell) in cells.iter().enumerate() {
                let runs = report.outcomes.iter().filter(|(name, _)| &**name == cell.name()).count();
                if reachable[k + 2] {
                    proptest::prop_assert_eq!(runs, 1);
                    proptest::prop_assert_eq!(cell.version(), before[k] + 1);
                } else {
                    proptest::prop_assert_eq!(runs, 0);
                    proptest::prop_assert_eq!(cell.version(), before[k]);
                }
            }
        }
    }
}
