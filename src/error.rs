//! Error types used by the engine, its cells and producers.
//!
//! - [`GraphError`]: declaration-time errors (cycles, capacities, names); fatal to that declaration only.
//! - [`CellError`]: a cell computation failed; isolated to the cell and its descendants for one pass.
//! - [`ProducerError`]: a generator failed; terminates that producer only.
//! - [`RuntimeError`]: errors raised by the running engine itself.
//!
//! Every type provides `as_label` (stable snake_case, for logs/metrics) and `as_message`.

use std::any::Any;
use std::time::Duration;
use thiserror::Error;

/// # Errors raised while declaring the dependency graph.
///
/// A declaration that fails leaves the graph exactly as it was before the call.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// The declared upstreams would make the graph cyclic.
    #[error("declaring {cell:?} would create a cycle: {}", path.join(" -> "))]
    Cycle {
        /// Cell being declared.
        cell: String,
        /// Names along the cycle, starting and ending at `cell`.
        path: Vec<String>,
    },

    /// A channel or window was configured with zero capacity.
    #[error("{what} capacity must be at least 1, got {capacity}")]
    Capacity {
        /// Kind of container ("channel" or "window").
        what: &'static str,
        /// Rejected capacity.
        capacity: usize,
    },

    /// A node with this name already exists.
    #[error("name {name:?} is already declared")]
    DuplicateName {
        /// Conflicting name.
        name: String,
    },

    /// A handle or name does not refer to a declared node of the expected kind.
    #[error("unknown node {name:?}")]
    UnknownNode {
        /// Name that could not be resolved.
        name: String,
    },

    /// A cell without upstreams failed its eager evaluation.
    #[error("initial evaluation of {cell:?} failed: {error}")]
    InitialEvaluation {
        /// Cell being declared.
        cell: String,
        /// Underlying evaluation error.
        #[source]
        error: CellError,
    },
}

impl GraphError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use cellvisor::GraphError;
    ///
    /// let err = GraphError::Capacity { what: "channel", capacity: 0 };
    /// assert_eq!(err.as_label(), "graph_capacity");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            GraphError::Cycle { .. } => "graph_cycle",
            GraphError::Capacity { .. } => "graph_capacity",
            GraphError::DuplicateName { .. } => "graph_duplicate_name",
            GraphError::UnknownNode { .. } => "graph_unknown_node",
            GraphError::InitialEvaluation { .. } => "graph_initial_evaluation",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// # Errors produced by a cell computation.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CellError {
    /// The computation reported a failure.
    #[error("evaluation failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The computation asked for an input it did not declare.
    #[error("missing input {name:?}")]
    MissingInput {
        /// Requested upstream name.
        name: String,
    },

    /// An input had an unexpected variant.
    #[error("input {name:?}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Upstream name.
        name: String,
        /// Expected variant.
        expected: &'static str,
        /// Actual variant.
        found: &'static str,
    },

    /// The computation panicked; the panic was caught by the scheduler.
    #[error("computation panicked: {info}")]
    Panicked {
        /// Panic payload, if it was a string.
        info: String,
    },
}

impl CellError {
    /// Shorthand for [`CellError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        CellError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CellError::Fail { .. } => "cell_failed",
            CellError::MissingInput { .. } => "cell_missing_input",
            CellError::TypeMismatch { .. } => "cell_type_mismatch",
            CellError::Panicked { .. } => "cell_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            CellError::Fail { error } => format!("error: {error}"),
            CellError::MissingInput { name } => format!("missing input: {name}"),
            CellError::TypeMismatch {
                name,
                expected,
                found,
            } => format!("type mismatch on {name}: expected {expected}, found {found}"),
            CellError::Panicked { info } => format!("panic: {info}"),
        }
    }
}

/// # Errors produced by a generator feeding a channel.
///
/// Producers are never restarted: any error is final for that producer.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProducerError {
    /// The generator reported a failure.
    #[error("generation failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The generator panicked.
    #[error("generator panicked: {info}")]
    Panicked {
        /// Panic payload, if it was a string.
        info: String,
    },
}

impl ProducerError {
    /// Shorthand for [`ProducerError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        ProducerError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use cellvisor::ProducerError;
    ///
    /// assert_eq!(ProducerError::fail("sensor offline").as_label(), "producer_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ProducerError::Fail { .. } => "producer_failed",
            ProducerError::Panicked { .. } => "producer_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ProducerError::Fail { error } => format!("error: {error}"),
            ProducerError::Panicked { info } => format!("panic: {info}"),
        }
    }
}

/// # Errors produced by the running engine.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// The cell has not produced its first value yet.
    #[error("cell {cell:?} has no value yet")]
    NotReady {
        /// Cell name.
        cell: String,
    },

    /// The engine driver is gone; no further values will be produced.
    #[error("engine stopped")]
    EngineStopped,

    /// `start` was called on an engine that already owns a graph.
    #[error("engine already started")]
    AlreadyStarted,

    /// Shutdown grace period was exceeded; some producers did not stop in time.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Producers that were still running.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use cellvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::NotReady { .. } => "runtime_not_ready",
            RuntimeError::EngineStopped => "runtime_engine_stopped",
            RuntimeError::AlreadyStarted => "runtime_already_started",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck producers={stuck:?}")
            }
            other => other.to_string(),
        }
    }
}

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = GraphError::Cycle {
            cell: "a".into(),
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(
            err.to_string(),
            "declaring \"a\" would create a cycle: a -> b -> a"
        );
    }

    #[test]
    fn test_panic_message_variants() {
        let s: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*s), "boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*owned), "bang");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*other), "unknown panic");
    }
}
