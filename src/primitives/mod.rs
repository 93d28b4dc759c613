//! Containers shared between producers, triggers and cells.
//!
//! ## Contents
//! - [`BoundedChannel`] fixed-capacity FIFO between producer tasks and the engine driver
//! - [`RollingWindow`] fixed-capacity history with oldest-eviction

mod channel;
mod window;

pub use channel::{BoundedChannel, Delivery, OverflowPolicy};
pub use window::RollingWindow;
