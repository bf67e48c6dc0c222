//! Test utilities and mock types for kiln development.
//!
//! Provides mock implementations of the caller-side tensor traits
//! ([`TensorReader`], [`TensorWriter`]) and reusable step fixtures in
//! [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::collections::HashMap;

use kiln_core::{TensorReader, TensorWriter};

pub use fixtures::{
    BindBuffer, FailingEvaluation, IncrementThroughScratch, LateBind, LeakyEvaluation, LoadInput,
    StoreOutput,
};

/// Mock implementation of [`TensorReader`].
///
/// Backed by a `HashMap<String, Vec<u8>>`. Pre-populate tensors with
/// [`with_tensor`](MockTensorReader::with_tensor) or
/// [`set_tensor`](MockTensorReader::set_tensor).
pub struct MockTensorReader {
    tensors: HashMap<String, Vec<u8>>,
}

impl MockTensorReader {
    pub fn new() -> Self {
        Self {
            tensors: HashMap::new(),
        }
    }

    /// Builder form of [`set_tensor`](Self::set_tensor).
    pub fn with_tensor(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.set_tensor(name, data);
        self
    }

    /// Pre-populate a tensor with data for testing.
    pub fn set_tensor(&mut self, name: impl Into<String>, data: Vec<u8>) {
        self.tensors.insert(name.into(), data);
    }
}

impl Default for MockTensorReader {
    fn default() -> Self {
        Self::new()
    }
}

impl TensorReader for MockTensorReader {
    fn tensor(&self, name: &str) -> Option<&[u8]> {
        self.tensors.get(name).map(|v| v.as_slice())
    }
}

/// Mock implementation of [`TensorWriter`].
///
/// Pre-allocate zeroed output buffers with
/// [`with_tensor`](MockTensorWriter::with_tensor), pass to code under
/// test, then inspect results with [`get`](MockTensorWriter::get).
pub struct MockTensorWriter {
    tensors: HashMap<String, Vec<u8>>,
}

impl MockTensorWriter {
    pub fn new() -> Self {
        Self {
            tensors: HashMap::new(),
        }
    }

    /// Pre-allocate a zeroed output buffer of `len` bytes.
    pub fn with_tensor(mut self, name: impl Into<String>, len: usize) -> Self {
        self.tensors.insert(name.into(), vec![0; len]);
        self
    }

    /// Read back an output buffer for test assertions.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.tensors.get(name).map(|v| v.as_slice())
    }
}

impl Default for MockTensorWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl TensorWriter for MockTensorWriter {
    fn tensor_mut(&mut self, name: &str) -> Option<&mut [u8]> {
        self.tensors.get_mut(name).map(|v| v.as_mut_slice())
    }

    fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }
}
