//! # Reactive cells.
//!
//! A cell is a named computation over the values of its declared upstreams, with a
//! cached output, a version bumped on every successful evaluation and a dirty flag.
//!
//! ```text
//! CLEAN ──(upstream fired)──► DIRTY ──(evaluated Ok)──► CLEAN   (version += 1)
//!                               │
//!                               └──(failed / blocked / gated)──► stays DIRTY
//! ```
//!
//! The cached output is only replaced after the computation returned `Ok`, and the new
//! snapshot is published to [`CellHandle`]s in one step: readers never observe a torn value.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tokio::sync::watch;

use super::NodeId;
use crate::error::{CellError, RuntimeError, panic_message};
use crate::value::Value;

/// A cell computation: a function of the current upstream values.
pub type Computation = Box<dyn FnMut(&Inputs) -> Result<Value, CellError> + Send>;

/// Dirty flag of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellState {
    Clean,
    Dirty,
}

/// A published cell value together with the version that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct CellSnapshot {
    pub value: Value,
    pub version: u64,
}

/// The values a computation reads, in the order the upstreams were declared.
#[derive(Debug, Default)]
pub struct Inputs {
    entries: Vec<(Arc<str>, Value)>,
}

impl Inputs {
    pub(crate) fn new(entries: Vec<(Arc<str>, Value)>) -> Self {
        Self { entries }
    }

    /// Value of the upstream called `name`.
    pub fn get(&self, name: &str) -> Result<&Value, CellError> {
        self.entries
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| CellError::MissingInput { name: name.into() })
    }

    /// Value of the `index`-th declared upstream.
    pub fn at(&self, index: usize) -> Option<&Value> {
        self.entries.get(index).map(|(_, v)| v)
    }

    /// Numeric upstream, widening integers.
    pub fn f64(&self, name: &str) -> Result<f64, CellError> {
        let value = self.get(name)?;
        value.as_f64().ok_or_else(|| mismatch(name, "float", value))
    }

    pub fn i64(&self, name: &str) -> Result<i64, CellError> {
        let value = self.get(name)?;
        value.as_i64().ok_or_else(|| mismatch(name, "int", value))
    }

    pub fn list(&self, name: &str) -> Result<&[Value], CellError> {
        let value = self.get(name)?;
        value.as_list().ok_or_else(|| mismatch(name, "list", value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (&**n, v))
    }
}

fn mismatch(name: &str, expected: &'static str, found: &Value) -> CellError {
    CellError::TypeMismatch {
        name: name.into(),
        expected,
        found: found.type_name(),
    }
}

/// Driver-side state of one cell.
pub(crate) struct Cell {
    computation: Computation,
    pub(crate) upstreams: Vec<petgraph::graph::NodeIndex>,
    pub(crate) gate: Option<petgraph::graph::NodeIndex>,
    pub(crate) state: CellState,
    pub(crate) value: Option<Value>,
    pub(crate) version: u64,
    published: watch::Sender<Option<CellSnapshot>>,
}

impl Cell {
    pub(crate) fn new(computation: Computation) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            computation,
            upstreams: Vec::new(),
            gate: None,
            state: CellState::Dirty,
            value: None,
            version: 0,
            published,
        }
    }

    /// Runs the computation once. On success the value, version and published
    /// snapshot are replaced and the cell becomes clean; on failure nothing changes.
    pub(crate) fn evaluate(&mut self, inputs: &Inputs) -> Result<(), CellError> {
        let computation = &mut self.computation;
        let value = match std::panic::catch_unwind(AssertUnwindSafe(|| computation(inputs))) {
            Ok(result) => result?,
            Err(panic) => {
                return Err(CellError::Panicked {
                    info: panic_message(&*panic),
                });
            }
        };

        self.version += 1;
        self.state = CellState::Clean;
        self.published.send_replace(Some(CellSnapshot {
            value: value.clone(),
            version: self.version,
        }));
        self.value = Some(value);
        Ok(())
    }

    /// Marks the cell clean without evaluating it.
    pub(crate) fn settle(&mut self) {
        self.state = CellState::Clean;
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<CellSnapshot>> {
        self.published.subscribe()
    }
}

/// Read handle of a declared cell.
///
/// Handles stay valid after the graph moved into a running engine; they always see
/// the latest clean value.
#[derive(Clone, Debug)]
pub struct CellHandle {
    pub(crate) id: NodeId,
    pub(crate) name: Arc<str>,
    pub(crate) rx: watch::Receiver<Option<CellSnapshot>>,
}

impl CellHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latest clean value, or [`RuntimeError::NotReady`] before the first successful evaluation.
    pub fn current_value(&self) -> Result<Value, RuntimeError> {
        self.snapshot()
            .map(|s| s.value)
            .ok_or_else(|| RuntimeError::NotReady {
                cell: self.name.to_string(),
            })
    }

    pub fn snapshot(&self) -> Option<CellSnapshot> {
        self.rx.borrow().clone()
    }

    /// Number of successful evaluations so far.
    pub fn version(&self) -> u64 {
        self.rx.borrow().as_ref().map_or(0, |s| s.version)
    }

    /// Waits for the first clean value.
    ///
    /// Returns [`RuntimeError::EngineStopped`] if the graph is dropped before the cell ever ran.
    pub async fn wait_value(&self) -> Result<Value, RuntimeError> {
        self.wait_version(1).await.map(|s| s.value)
    }

    /// Waits until the cell reached at least version `min`.
    pub async fn wait_version(&self, min: u64) -> Result<CellSnapshot, RuntimeError> {
        let mut rx = self.rx.clone();
        let snapshot = rx
            .wait_for(|s| s.as_ref().is_some_and(|s| s.version >= min))
            .await
            .ok()
            .and_then(|s| (*s).clone());
        snapshot.ok_or(RuntimeError::EngineStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> Inputs {
        Inputs::new(vec![
            ("x".into(), Value::Int(2)),
            ("label".into(), Value::from("walk")),
        ])
    }

    #[test]
    fn test_inputs_lookup_and_types() {
        let inputs = inputs();
        assert_eq!(inputs.f64("x"), Ok(2.0));
        assert_eq!(inputs.at(1), Some(&Value::from("walk")));
        assert_eq!(
            inputs.get("y"),
            Err(CellError::MissingInput { name: "y".into() })
        );
        assert_eq!(
            inputs.f64("label"),
            Err(CellError::TypeMismatch {
                name: "label".into(),
                expected: "float",
                found: "text",
            })
        );
    }

    #[test]
    fn test_failed_evaluation_keeps_value_and_version() {
        let mut calls = 0;
        let mut cell = Cell::new(Box::new(move |inputs: &Inputs| {
            calls += 1;
            if calls == 2 {
                return Err(CellError::fail("second call fails"));
            }
            inputs.f64("x").map(|x| Value::Float(x * 10.0))
        }));
        let rx = cell.subscribe();

        cell.evaluate(&inputs()).unwrap();
        assert_eq!(cell.version, 1);
        assert_eq!(cell.state, CellState::Clean);

        cell.state = CellState::Dirty;
        assert!(cell.evaluate(&inputs()).is_err());
        assert_eq!(cell.version, 1);
        assert_eq!(cell.state, CellState::Dirty);
        assert_eq!(cell.value, Some(Value::Float(20.0)));
        assert_eq!(
            *rx.borrow(),
            Some(CellSnapshot {
                value: Value::Float(20.0),
                version: 1
            })
        );
    }

    #[test]
    fn test_panicking_computation_is_caught() {
        let mut cell = Cell::new(Box::new(|_: &Inputs| -> Result<Value, CellError> {
            panic!("division by zero")
        }));
        assert_eq!(
            cell.evaluate(&Inputs::default()),
            Err(CellError::Panicked {
                info: "division by zero".into()
            })
        );
        assert_eq!(cell.value, None);
    }
}
