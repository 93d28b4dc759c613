//! Background producers feeding bounded channels.
//!
//! - [`Generate`] / [`GenerateFn`]: where values come from;
//! - [`ProducerTask`]: the cancellable generate → put → sleep loop;
//! - [`ProducerHandle`]: the owner's stop handle returned by `Graph::register_producer`.

mod generate;
mod producer;

pub use generate::{Generate, GenerateFn};
pub use producer::{ProducerHandle, ProducerStatus, ProducerTask};
