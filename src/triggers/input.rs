//! # External inputs and controls.
//!
//! An input is read synchronously through a caller-supplied function. The host calls
//! [`InputHandle::notify`] when the control *may* have changed; the driver then reads
//! the value and fires only if it differs from the last observed one.
//!
//! [`Control`] is a ready-made input that stores its own value: `set` stores and notifies.
//!
//! ```text
//! host ──► Control::set(v) ──► notify ──► driver reads read_fn()
//!                                              ├─ equal to last  → no firing
//!                                              └─ differs        → InputChanged + pass
//! ```

use std::sync::Arc;

use tokio::sync::{Notify, watch};

use crate::graph::NodeId;
use crate::value::Value;

/// Handle to a declared input source.
#[derive(Clone, Debug)]
pub struct InputHandle {
    pub(crate) id: NodeId,
    pub(crate) name: Arc<str>,
    pub(crate) notify: Arc<Notify>,
}

impl InputHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tells the engine the control may have changed.
    ///
    /// Notifications coalesce: several calls before the driver looks result in one read.
    pub fn notify(&self) {
        self.notify.notify_one();
    }
}

/// An input holding its own value.
#[derive(Clone, Debug)]
pub struct Control {
    pub(crate) input: InputHandle,
    pub(crate) value: Arc<watch::Sender<Value>>,
}

impl Control {
    /// Stores a new value and notifies the engine.
    pub fn set(&self, value: impl Into<Value>) {
        self.value.send_replace(value.into());
        self.input.notify();
    }

    /// Current stored value.
    pub fn get(&self) -> Value {
        self.value.borrow().clone()
    }

    /// The underlying input handle, e.g. for [`Graph::gate`](crate::Graph::gate).
    pub fn handle(&self) -> &InputHandle {
        &self.input
    }

    pub fn name(&self) -> &str {
        self.input.name()
    }
}

impl AsRef<InputHandle> for Control {
    fn as_ref(&self) -> &InputHandle {
        &self.input
    }
}

impl AsRef<InputHandle> for InputHandle {
    fn as_ref(&self) -> &InputHandle {
        self
    }
}
