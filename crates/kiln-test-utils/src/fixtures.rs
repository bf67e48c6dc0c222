//! Reusable step fixtures.
//!
//! - [`BindBuffer`]: declares one raw buffer.
//! - [`LoadInput`] / [`StoreOutput`]: move bytes between caller tensors and bindings.
//! - [`IncrementThroughScratch`]: adds one to every byte of a binding via scratch.
//! - [`LeakyEvaluation`]: allocates without releasing.
//! - [`LateBind`]: tries to bind during evaluation.
//! - [`FailingEvaluation`]: fails deterministically after N calls.

use std::sync::atomic::{AtomicUsize, Ordering};

use kiln_core::{PoolBytes, PoolKind};
use kiln_runtime::{Declaration, Evaluation, Region, StepContext, StepError};

/// Declares `size` raw bytes in `pool` under `binding`.
pub struct BindBuffer {
    pub name: String,
    pub binding: String,
    pub pool: PoolKind,
    pub size: usize,
    pub align: usize,
}

impl BindBuffer {
    /// Byte-aligned ram buffer; the step is named after the binding.
    pub fn ram(binding: impl Into<String>, size: usize) -> Self {
        let binding = binding.into();
        Self {
            name: format!("declare_{binding}"),
            binding,
            pool: PoolKind::Ram,
            size,
            align: 1,
        }
    }
}

impl Declaration for BindBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn footprint(&self) -> PoolBytes {
        PoolBytes::only(self.pool, self.size + self.align - 1)
    }

    fn declare(&self, ctx: &mut StepContext<'_, '_>) -> Result<(), StepError> {
        ctx.bind(&self.binding, self.pool, self.size, self.align)
    }
}

/// Copies a caller input into a binding.
pub struct LoadInput {
    pub name: String,
    pub input: String,
    pub binding: String,
}

impl LoadInput {
    pub fn new(input: impl Into<String>, binding: impl Into<String>) -> Self {
        let input = input.into();
        Self {
            name: format!("load_{input}"),
            input,
            binding: binding.into(),
        }
    }
}

impl Evaluation for LoadInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, ctx: &mut StepContext<'_, '_>) -> Result<(), StepError> {
        ctx.load_input(&self.input, &self.binding)
    }
}

/// Copies a binding into a caller output.
pub struct StoreOutput {
    pub name: String,
    pub binding: String,
    pub output: String,
}

impl StoreOutput {
    pub fn new(binding: impl Into<String>, output: impl Into<String>) -> Self {
        let output = output.into();
        Self {
            name: format!("store_{output}"),
            binding: binding.into(),
            output,
        }
    }
}

impl Evaluation for StoreOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, ctx: &mut StepContext<'_, '_>) -> Result<(), StepError> {
        ctx.store_output(&self.binding, &self.output)
    }
}

/// Adds one (wrapping) to every byte of a binding, staging through
/// `len` bytes of scratch in `pool`.
pub struct IncrementThroughScratch {
    pub name: String,
    pub binding: String,
    pub pool: PoolKind,
    pub len: usize,
}

impl IncrementThroughScratch {
    pub fn new(name: impl Into<String>, binding: impl Into<String>, pool: PoolKind, len: usize) -> Self {
        Self {
            name: name.into(),
            binding: binding.into(),
            pool,
            len,
        }
    }
}

impl Evaluation for IncrementThroughScratch {
    fn name(&self) -> &str {
        &self.name
    }

    fn scratch(&self) -> PoolBytes {
        PoolBytes::only(self.pool, self.len)
    }

    fn evaluate(&self, ctx: &mut StepContext<'_, '_>) -> Result<(), StepError> {
        let tmp = ctx.scratch(self.pool, self.len, 1)?;
        let (src, staged) =
            ctx.split_mut(Region::Binding(&self.binding), Region::Scratch(tmp))?;
        if src.len() != staged.len() {
            return Err(StepError::SizeMismatch {
                name: self.binding.clone(),
                expected: staged.len(),
                got: src.len(),
            });
        }
        for (s, b) in staged.iter_mut().zip(src.iter()) {
            *s = b.wrapping_add(1);
        }
        let (dst, staged) =
            ctx.split_mut(Region::Binding(&self.binding), Region::Scratch(tmp))?;
        dst.copy_from_slice(staged);
        Ok(())
    }
}

/// Allocates `size` bytes straight from the arena and never releases them.
pub struct LeakyEvaluation {
    pub name: String,
    pub pool: PoolKind,
    pub size: usize,
}

impl Evaluation for LeakyEvaluation {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, ctx: &mut StepContext<'_, '_>) -> Result<(), StepError> {
        let _leaked = ctx.allocator(self.pool).allocate(self.size, 1)?;
        Ok(())
    }
}

/// Tries to bind a buffer from an evaluation step.
pub struct LateBind {
    pub name: String,
    pub binding: String,
}

impl Evaluation for LateBind {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, ctx: &mut StepContext<'_, '_>) -> Result<(), StepError> {
        ctx.bind(&self.binding, PoolKind::Ram, 1, 1)
    }
}

/// Succeeds for the first `succeed_count` calls, then fails.
pub struct FailingEvaluation {
    pub name: String,
    succeed_count: usize,
    calls: AtomicUsize,
}

impl FailingEvaluation {
    pub fn new(name: impl Into<String>, succeed_count: usize) -> Self {
        Self {
            name: name.into(),
            succeed_count,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times `evaluate` has been called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Evaluation for FailingEvaluation {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, _ctx: &mut StepContext<'_, '_>) -> Result<(), StepError> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        if n >= self.succeed_count {
            return Err(StepError::ExecutionFailed {
                reason: format!("failed after {} calls", self.succeed_count),
            });
        }
        Ok(())
    }
}
