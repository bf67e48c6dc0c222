//! Emission of arena-backed C++ model containers.
//!
//! A [`ModelIr`] lists a model's placeholders, outputs, pool capacities
//! and three ordered snippet lists: global declarations, local
//! declarations and evaluations. [`render_container`] turns it into a
//! translation unit that installs two statically sized circular arenas
//! and runs every snippet inside a `compute_<model>` function.
//!
//! Operator snippets are built from [`OpInfo`] records by an
//! [`OperatorFactory`]; unknown operator types are rejected.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod container;
pub mod error;
pub mod ir;
pub mod ops;
pub mod snippet;

pub use container::{check_identifier, render_container};
pub use error::CodegenError;
pub use ir::{AttrValue, ModelIr, OpInfo, PoolBindings, QuantizeParams};
pub use ops::{Activation, DepthwiseSeparableConvSnippet, DwsConvParams, OperatorFactory, Padding};
pub use snippet::{OpSnippet, RamTensorSnippet, RawSnippet, Snippet};
