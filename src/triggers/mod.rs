//! Trigger sources feeding the scheduler.
//!
//! - [`source`]: the `ChannelArrival | Timer | InputChange` variant and its armed futures;
//! - [`timer`]: [`Schedule`] and [`TimerHandle`];
//! - [`input`]: [`InputHandle`] and [`Control`].

mod input;
pub(crate) mod source;
mod timer;

pub use input::{Control, InputHandle};
pub use timer::{Schedule, TimerHandle, TimerStatus, next_boundary};

pub(crate) use source::{Firing, ReadFn, TriggerSource};
pub(crate) use timer::TimerState;
