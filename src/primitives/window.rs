//! # Fixed-capacity rolling history.
//!
//! [`RollingWindow`] keeps the last `capacity` appended values in arrival order,
//! evicting from the head. It backs window cells (see
//! [`Graph::declare_window`](crate::Graph::declare_window)) and any cell that keeps
//! its own bounded history.
//!
//! ## Example
//! ```rust
//! use cellvisor::RollingWindow;
//!
//! let mut w = RollingWindow::with_seed(3, 0.0).unwrap();
//! for x in [0.5, -0.2, 1.1, 0.3] {
//!     w.append(x);
//! }
//! assert_eq!(w.snapshot(), vec![-0.2, 1.1, 0.3]);
//! ```

use std::collections::VecDeque;
use std::collections::vec_deque;

use crate::error::GraphError;

/// Append-only sequence holding at most `capacity` elements.
#[derive(Clone, Debug)]
pub struct RollingWindow<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingWindow<T> {
    /// Creates an empty window. Returns [`GraphError::Capacity`] when `capacity == 0`.
    pub fn new(capacity: usize) -> Result<Self, GraphError> {
        if capacity == 0 {
            return Err(GraphError::Capacity {
                what: "window",
                capacity,
            });
        }
        Ok(Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Creates a window holding one seed element, so readers of "the previous
    /// element" never observe an empty window.
    pub fn with_seed(capacity: usize, seed: T) -> Result<Self, GraphError> {
        let mut window = Self::new(capacity)?;
        window.items.push_back(seed);
        Ok(window)
    }

    /// Appends `value` at the tail, returning the evicted head if the window was full.
    pub fn append(&mut self, value: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(value);
        evicted
    }

    /// Newest element.
    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    /// Oldest element.
    pub fn first(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> vec_deque::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T: Clone> RollingWindow<T> {
    /// Owned copy of the contents, oldest first.
    ///
    /// The copy is isolated from later appends.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<'a, T> IntoIterator for &'a RollingWindow<T> {
    type Item = &'a T;
    type IntoIter = vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
