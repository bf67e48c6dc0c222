//! Step and run error types.

use std::error::Error;
use std::fmt;

use kiln_arena::ArenaError;
use kiln_core::{DescriptorError, PoolKind};

/// Errors from a single declaration or evaluation step.
///
/// Returned by [`Declaration::declare`](crate::Declaration::declare) and
/// [`Evaluation::evaluate`](crate::Evaluation::evaluate) and wrapped in
/// [`RunError::StepFailed`] by the model entry point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepError {
    /// An arena operation failed (most often `OutOfSpace`).
    Arena(ArenaError),
    /// A tensor descriptor record could not be encoded or decoded.
    Descriptor(DescriptorError),
    /// No binding with this name exists in the current run.
    UnknownBinding {
        /// The requested binding.
        name: String,
    },
    /// A binding with this name already exists in the current run.
    DuplicateBinding {
        /// The contested binding.
        name: String,
    },
    /// `bind` was called from an evaluation step.
    BindOutsideDeclaration {
        /// The binding that was attempted.
        name: String,
    },
    /// The binding was made without a descriptor record.
    MissingDescriptor {
        /// The binding without a descriptor.
        name: String,
    },
    /// No scratch allocation with this index exists in the current step.
    UnknownScratch {
        /// The requested index.
        index: usize,
    },
    /// The caller did not supply this input tensor.
    MissingInput {
        /// The missing input.
        name: String,
    },
    /// The caller did not supply this output tensor.
    MissingOutput {
        /// The missing output.
        name: String,
    },
    /// Source and destination sizes of a copy differ.
    SizeMismatch {
        /// The destination tensor or binding.
        name: String,
        /// Destination size in bytes.
        expected: usize,
        /// Source size in bytes.
        got: usize,
    },
    /// The step's own computation failed.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl StepError {
    /// Pool and requested size if this is an arena `OutOfSpace` failure.
    pub fn out_of_space(&self) -> Option<(PoolKind, usize)> {
        match self {
            Self::Arena(ArenaError::OutOfSpace {
                pool, requested, ..
            }) => Some((*pool, *requested)),
            _ => None,
        }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arena(e) => write!(f, "arena: {e}"),
            Self::Descriptor(e) => write!(f, "descriptor: {e}"),
            Self::UnknownBinding { name } => write!(f, "unknown binding '{name}'"),
            Self::DuplicateBinding { name } => write!(f, "binding '{name}' already exists"),
            Self::BindOutsideDeclaration { name } => {
                write!(f, "cannot bind '{name}' outside a declaration step")
            }
            Self::MissingDescriptor { name } => {
                write!(f, "binding '{name}' has no descriptor record")
            }
            Self::UnknownScratch { index } => write!(f, "unknown scratch allocation {index}"),
            Self::MissingInput { name } => write!(f, "input tensor '{name}' not supplied"),
            Self::MissingOutput { name } => write!(f, "output tensor '{name}' not supplied"),
            Self::SizeMismatch {
                name,
                expected,
                got,
            } => {
                write!(f, "'{name}' holds {expected} bytes, source has {got}")
            }
            Self::ExecutionFailed { reason } => write!(f, "execution failed: {reason}"),
        }
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Arena(e) => Some(e),
            Self::Descriptor(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArenaError> for StepError {
    fn from(e: ArenaError) -> Self {
        Self::Arena(e)
    }
}

impl From<DescriptorError> for StepError {
    fn from(e: DescriptorError) -> Self {
        Self::Descriptor(e)
    }
}

/// Errors from a whole model run via [`Model::compute`](crate::Model::compute).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunError {
    /// The installed arena has less free space than the model plan requires.
    ContextTooSmall {
        /// The undersized pool.
        pool: PoolKind,
        /// Bytes the plan requires.
        required: usize,
        /// Bytes free in the installed arena.
        available: usize,
    },
    /// The caller did not supply a declared input.
    MissingInput {
        /// The missing input.
        name: String,
    },
    /// The caller did not supply a declared output.
    MissingOutput {
        /// The missing output.
        name: String,
    },
    /// A step failed; the run was aborted.
    StepFailed {
        /// Name of the failing step.
        step: String,
        /// The underlying step error.
        reason: StepError,
    },
    /// An evaluation step left a pool's high-water mark moved.
    UnbalancedStep {
        /// Name of the offending step.
        step: String,
        /// The pool that moved.
        pool: PoolKind,
        /// High-water mark before the step.
        before: usize,
        /// High-water mark after the step and its scratch release.
        after: usize,
    },
    /// Restoring the pools to their entry marks failed.
    Unwind(ArenaError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContextTooSmall {
                pool,
                required,
                available,
            } => {
                write!(
                    f,
                    "{pool} pool has {available} bytes free, model requires {required}"
                )
            }
            Self::MissingInput { name } => write!(f, "input tensor '{name}' not supplied"),
            Self::MissingOutput { name } => write!(f, "output tensor '{name}' not supplied"),
            Self::StepFailed { step, reason } => write!(f, "step '{step}' failed: {reason}"),
            Self::UnbalancedStep {
                step,
                pool,
                before,
                after,
            } => {
                write!(
                    f,
                    "step '{step}' left the {pool} pool unbalanced ({before} -> {after})"
                )
            }
            Self::Unwind(e) => write!(f, "unwind failed: {e}"),
        }
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StepFailed { reason, .. } => Some(reason),
            Self::Unwind(e) => Some(e),
            _ => None,
        }
    }
}
