//! Core types and traits for the kiln inference runtime.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the arena allocator, the step runtime and
//! the code generator: pool identity, arena instance IDs, tensor
//! descriptors and the caller-side tensor access traits.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod pool;
pub mod tensor;
pub mod traits;

pub use error::DescriptorError;
pub use id::ArenaId;
pub use pool::{PoolBytes, PoolKind};
pub use tensor::{DType, Shape, TensorDescriptor};
pub use traits::{TensorReader, TensorWriter};
