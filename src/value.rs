//! # Values flowing through the dependency graph.
//!
//! Every cell output, channel item, timer tick and input reading is a [`Value`].
//! Composite values share their storage (`Arc<[Value]>`, `Arc<str>`), so cloning a
//! value out of a cell or into a rolling window is cheap.
//!
//! ## Example
//! ```rust
//! use cellvisor::Value;
//!
//! let walk = Value::from(vec![0.0, 0.5, 0.3]);
//! assert_eq!(walk.as_list().map(|l| l.len()), Some(3));
//! assert_eq!(walk.floats(), Some(vec![0.0, 0.5, 0.3]));
//! assert_eq!(Value::Int(2).as_f64(), Some(2.0));
//! ```

use std::fmt;
use std::mem;
use std::sync::Arc;

/// Dynamically typed value stored in cells and sources.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    /// No value (e.g. a cell run only for its effect).
    #[default]
    Unit,
    /// Boolean flag (gate inputs, checkboxes).
    Bool(bool),
    /// Signed integer (timer tick counts, counters).
    Int(i64),
    /// Floating-point number (samples, slider positions).
    Float(f64),
    /// Shared text.
    Text(Arc<str>),
    /// Shared ordered sequence (window snapshots, plot series).
    List(Arc<[Value]>),
}

impl Value {
    /// Builds a list value from any iterator of values.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    /// Returns a short stable name of the variant (used in type mismatch errors).
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::List(_) => "list",
        }
    }

    /// Numeric view; integers are widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Collects a list of numbers; `None` if this is not a list or any element is non-numeric.
    pub fn floats(&self) -> Option<Vec<f64>> {
        self.as_list()?.iter().map(Value::as_f64).collect()
    }

    /// Truthiness used by cell gates.
    ///
    /// `Unit`, `false`, zero and empty text/lists are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Unit => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
        }
    }

    /// Rough number of bytes held by this value, including shared heap storage.
    ///
    /// Shared storage is counted once per holder, so the estimate is an upper bound.
    pub fn approx_bytes(&self) -> usize {
        let inline = mem::size_of::<Value>();
        match self {
            Value::Text(s) => inline + s.len(),
            Value::List(items) => inline + items.iter().map(Value::approx_bytes).sum::<usize>(),
            _ => inline,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(Arc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(Arc::from(items))
    }
}

impl From<Vec<f64>> for Value {
    fn from(items: Vec<f64>) -> Self {
        Value::list(items.into_iter().map(Value::Float))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_views() {
        assert_eq!(Value::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(Value::Int(-3).as_f64(), Some(-3.0));
        assert_eq!(Value::Bool(true).as_f64(), None);
        assert_eq!(Value::Float(1.0).as_i64(), None);
    }

    #[test]
    fn test_floats_rejects_mixed_lists() {
        let mixed = Value::list([Value::Float(1.0), Value::from("x")]);
        assert_eq!(mixed.floats(), None);
        assert_eq!(Value::from(vec![1.0, 2.0]).floats(), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Unit.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::list([]).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Float(0.1).is_truthy());
        assert!(Value::from("on").is_truthy());
    }

    #[test]
    fn test_approx_bytes_grows_with_list() {
        let small = Value::from(vec![1.0]);
        let large = Value::from(vec![1.0; 100]);
        assert!(large.approx_bytes() > small.approx_bytes());
        assert!(Value::Unit.approx_bytes() > 0);
    }

    #[test]
    fn test_display() {
        let v = Value::list([Value::Int(1), Value::Float(0.5), Value::from("a")]);
        assert_eq!(v.to_string(), "[1, 0.5, \"a\"]");
    }
}
