//! Caller-side access to model input and output tensors.
//!
//! Inputs and outputs are supplied by the caller of a model's entry point
//! and are never owned by the arenas. Steps reach them through these
//! traits so that tests can substitute in-memory mocks.

/// Read-only access to named input tensors.
pub trait TensorReader {
    /// Raw bytes of the named tensor.
    ///
    /// Returns `None` if no tensor with that name was supplied.
    fn tensor(&self, name: &str) -> Option<&[u8]>;
}

/// Mutable access to named output tensors.
pub trait TensorWriter {
    /// Mutable raw bytes of the named tensor.
    ///
    /// Returns `None` if no tensor with that name was supplied.
    fn tensor_mut(&mut self, name: &str) -> Option<&mut [u8]>;

    /// Whether a tensor with that name was supplied.
    fn contains(&self, name: &str) -> bool;
}
