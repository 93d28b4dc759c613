//! # Value generators.
//!
//! [`Generate`] is the async source of values behind a producer. [`GenerateFn`] wraps a
//! plain closure for the common case of a synchronous generator.
//!
//! ## Example
//! ```rust
//! use cellvisor::{GenerateFn, ProducerError, Value};
//!
//! let mut n = 0.0;
//! let counter = GenerateFn::new(move || {
//!     n += 1.0;
//!     Ok::<_, ProducerError>(Value::Float(n))
//! });
//! # let _ = counter;
//! ```

use async_trait::async_trait;

use crate::error::ProducerError;
use crate::value::Value;

/// # Asynchronous generator of values.
///
/// Called once per producer period. Returning an error (or panicking) terminates the producer.
///
/// ```
/// use async_trait::async_trait;
/// use cellvisor::{Generate, ProducerError, Value};
///
/// struct Sensor { reads: u64 }
///
/// #[async_trait]
/// impl Generate for Sensor {
///     async fn generate(&mut self) -> Result<Value, ProducerError> {
///         self.reads += 1;
///         if self.reads > 3 {
///             return Err(ProducerError::fail("sensor offline"));
///         }
///         Ok(Value::Int(self.reads as i64))
///     }
/// }
/// ```
#[async_trait]
pub trait Generate: Send + 'static {
    /// Produces the next value.
    async fn generate(&mut self) -> Result<Value, ProducerError>;
}

/// Closure-backed generator.
#[derive(Debug)]
pub struct GenerateFn<F> {
    f: F,
}

impl<F> GenerateFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, V> Generate for GenerateFn<F>
where
    F: FnMut() -> Result<V, ProducerError> + Send + 'static, // FnMut: generators keep state
    V: Into<Value> + Send + 'static,
{
    async fn generate(&mut self) -> Result<Value, ProducerError> {
        (self.f)().map(Into::into)
    }
}
