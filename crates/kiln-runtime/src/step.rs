//! The [`Declaration`] and [`Evaluation`] step traits.
//!
//! Generated models are sequences of opaque steps. Declarations run
//! first and bind named buffers for the rest of the run; evaluations run
//! after and may only use scratch space that they leave balanced.

use kiln_core::{PoolBytes, TensorDescriptor};

use crate::context::StepContext;
use crate::error::StepError;

/// A step that binds named buffers for the rest of the run.
///
/// # Contract
///
/// - `footprint()` is an upper bound on the bytes `declare()` consumes
///   in each pool, alignment padding included. It is summed into the
///   model plan at construction.
/// - `declare()` runs once per model run, before any evaluation.
///
/// # Object safety
///
/// This trait is object-safe; models store declarations as
/// `Vec<Box<dyn Declaration>>`.
pub trait Declaration: Send + 'static {
    /// Human-readable name for error reporting and tracing.
    fn name(&self) -> &str;

    /// Upper bound on bytes bound in each pool.
    fn footprint(&self) -> PoolBytes;

    /// Bind this step's buffers.
    fn declare(&self, ctx: &mut StepContext<'_, '_>) -> Result<(), StepError>;
}

/// A step that computes over bound buffers.
///
/// # Contract
///
/// - `scratch()` is an upper bound on the scratch bytes `evaluate()`
///   holds at once in each pool, alignment padding included.
/// - After `evaluate()` returns and its scratch is released, every
///   pool's high-water mark must equal its value before the step.
///   [`Model::compute`](crate::Model::compute) checks this.
///
/// # Examples
///
/// An evaluation that doubles every byte of a binding through scratch:
///
/// ```
/// use kiln_core::{PoolBytes, PoolKind};
/// use kiln_runtime::{Evaluation, Region, StepContext, StepError};
///
/// struct Double {
///     tensor: &'static str,
///     len: usize,
/// }
///
/// impl Evaluation for Double {
///     fn name(&self) -> &str { "double" }
///
///     fn scratch(&self) -> PoolBytes { PoolBytes::only(PoolKind::Ram, self.len) }
///
///     fn evaluate(&self, ctx: &mut StepContext<'_, '_>) -> Result<(), StepError> {
///         let tmp = ctx.scratch(PoolKind::Ram, self.len, 1)?;
///         let (src, dst) = ctx.split_mut(Region::Binding(self.tensor), Region::Scratch(tmp))?;
///         for (d, s) in dst.iter_mut().zip(src.iter()) {
///             *d = s.wrapping_mul(2);
///         }
///         let (dst, src) = ctx.split_mut(Region::Binding(self.tensor), Region::Scratch(tmp))?;
///         dst.copy_from_slice(src);
///         Ok(())
///     }
/// }
///
/// let step = Double { tensor: "x", len: 4 };
/// assert_eq!(step.scratch().ram, 4);
/// ```
pub trait Evaluation: Send + 'static {
    /// Human-readable name for error reporting and tracing.
    fn name(&self) -> &str;

    /// Upper bound on scratch bytes held at once in each pool.
    fn scratch(&self) -> PoolBytes {
        PoolBytes::ZERO
    }

    /// Run the computation.
    fn evaluate(&self, ctx: &mut StepContext<'_, '_>) -> Result<(), StepError>;
}

/// The standard local declaration: one named tensor bound in the ram
/// pool with its descriptor record in the metadata pool.
#[derive(Clone, Debug)]
pub struct TensorDeclaration {
    name: String,
    descriptor: TensorDescriptor,
}

impl TensorDeclaration {
    /// Declare `name` with the given element type and shape.
    pub fn new(name: impl Into<String>, descriptor: TensorDescriptor) -> Self {
        Self {
            name: name.into(),
            descriptor,
        }
    }

    /// The declared descriptor (offset unset).
    pub fn descriptor(&self) -> &TensorDescriptor {
        &self.descriptor
    }
}

impl Declaration for TensorDeclaration {
    fn name(&self) -> &str {
        &self.name
    }

    fn footprint(&self) -> PoolBytes {
        // An unrepresentable size saturates so plan validation rejects it.
        let ram = self
            .descriptor
            .byte_len()
            .map(|len| len.saturating_add(self.descriptor.dtype.align() - 1))
            .unwrap_or(usize::MAX);
        PoolBytes::new(
            TensorDescriptor::RECORD_BYTES + TensorDescriptor::RECORD_ALIGN - 1,
            ram,
        )
    }

    fn declare(&self, ctx: &mut StepContext<'_, '_>) -> Result<(), StepError> {
        ctx.bind_tensor(&self.name, &self.descriptor)
    }
}
