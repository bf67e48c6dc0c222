//! Declaration and evaluation step sequencing for generated models.
//!
//! A generated model is an ordered list of [`Declaration`] steps that
//! bind named buffers in the arenas, followed by an ordered list of
//! [`Evaluation`] steps that compute over those buffers using balanced
//! scratch space. [`Model::compute`] is the per-model entry point.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod context;
pub mod error;
pub mod model;
pub mod plan;
pub mod step;

pub use context::{Region, ScratchId, StepContext};
pub use error::{RunError, StepError};
pub use model::{Model, ModelConfig, RunReport};
pub use plan::{validate_model, ModelError, ModelPlan};
pub use step::{Declaration, Evaluation, TensorDeclaration};
