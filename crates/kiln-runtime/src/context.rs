//! Execution context passed to declaration and evaluation steps.
//!
//! [`StepContext`] wraps the installed [`ExecutionContext`] with the
//! run's named bindings, a per-step scratch stack and the caller's input
//! and output tensors.

use indexmap::IndexMap;
use smallvec::SmallVec;

use kiln_arena::{AllocationHandle, Allocator, ArenaMark, ExecutionContext};
use kiln_core::{
    DescriptorError, PoolBytes, PoolKind, TensorDescriptor, TensorReader, TensorWriter,
};

use crate::error::StepError;

/// Index of a scratch allocation made by the current step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScratchId(usize);

impl ScratchId {
    /// Position on the step's scratch stack, in allocation order.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A buffer addressable through [`StepContext::split_mut`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region<'n> {
    /// A named binding's payload.
    Binding(&'n str),
    /// A scratch allocation of the current step.
    Scratch(ScratchId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Declare,
    Evaluate,
}

struct Binding {
    payload: AllocationHandle,
    descriptor: Option<AllocationHandle>,
}

/// Execution context passed to every step of a model run.
///
/// # Bindings and scratch
///
/// - **Bindings** are named buffers created by declaration steps via
///   [`bind`](Self::bind) or [`bind_tensor`](Self::bind_tensor). They
///   live until the run ends and are visible to every later step.
///
/// - **Scratch** allocations are made by evaluation steps via
///   [`scratch`](Self::scratch). They are released in reverse order
///   after each step, restoring the exact pre-step high-water mark.
///
/// Input tensors borrow the caller's reader for the whole run, so an
/// input slice can be held while a binding is written.
pub struct StepContext<'c, 'a> {
    exec: &'c mut ExecutionContext<'a>,
    inputs: &'c dyn TensorReader,
    outputs: &'c mut dyn TensorWriter,
    bindings: IndexMap<String, Binding>,
    scratch: SmallVec<[(ArenaMark, AllocationHandle); 4]>,
    phase: Phase,
    peak: PoolBytes,
}

fn resolve<'m>(
    bindings: &'m IndexMap<String, Binding>,
    scratch: &'m [(ArenaMark, AllocationHandle)],
    region: Region<'_>,
) -> Result<&'m AllocationHandle, StepError> {
    match region {
        Region::Binding(name) => bindings
            .get(name)
            .map(|b| &b.payload)
            .ok_or_else(|| StepError::UnknownBinding {
                name: name.to_owned(),
            }),
        Region::Scratch(id) => scratch
            .get(id.0)
            .map(|(_, h)| h)
            .ok_or(StepError::UnknownScratch { index: id.0 }),
    }
}

impl<'c, 'a> StepContext<'c, 'a> {
    /// Construct a step context in the declaration phase.
    ///
    /// Typically called by [`Model::compute`](crate::Model::compute).
    /// For testing, construct with mock readers and writers from
    /// `kiln-test-utils`.
    pub fn new(
        exec: &'c mut ExecutionContext<'a>,
        inputs: &'c dyn TensorReader,
        outputs: &'c mut dyn TensorWriter,
    ) -> Self {
        let peak = exec.usage();
        Self {
            exec,
            inputs,
            outputs,
            bindings: IndexMap::new(),
            scratch: SmallVec::new(),
            phase: Phase::Declare,
            peak,
        }
    }

    /// Switch to the evaluation phase. Further `bind` calls fail.
    pub fn begin_evaluation(&mut self) {
        self.phase = Phase::Evaluate;
    }

    /// Whether the context is in the evaluation phase.
    pub fn is_evaluating(&self) -> bool {
        self.phase == Phase::Evaluate
    }

    // ── Bindings ────────────────────────────────────────────────

    fn check_bindable(&self, name: &str) -> Result<(), StepError> {
        if self.phase != Phase::Declare {
            return Err(StepError::BindOutsideDeclaration {
                name: name.to_owned(),
            });
        }
        if self.bindings.contains_key(name) {
            return Err(StepError::DuplicateBinding {
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    /// Bind `size` raw bytes in `pool` under `name`.
    pub fn bind(
        &mut self,
        name: &str,
        pool: PoolKind,
        size: usize,
        align: usize,
    ) -> Result<(), StepError> {
        self.check_bindable(name)?;
        let payload = self.exec.allocate(pool, size, align)?;
        tracing::trace!(name, %pool, offset = payload.offset(), size, "bound buffer");
        self.bindings.insert(
            name.to_owned(),
            Binding {
                payload,
                descriptor: None,
            },
        );
        self.note_usage();
        Ok(())
    }

    /// Bind a tensor: its payload in the ram pool and its descriptor
    /// record in the metadata pool.
    ///
    /// The stored descriptor's `offset` is the payload's ram offset.
    pub fn bind_tensor(
        &mut self,
        name: &str,
        descriptor: &TensorDescriptor,
    ) -> Result<(), StepError> {
        self.check_bindable(name)?;
        if descriptor.shape.len() > TensorDescriptor::MAX_RANK {
            return Err(DescriptorError::RankTooLarge {
                rank: descriptor.shape.len(),
                max: TensorDescriptor::MAX_RANK,
            }
            .into());
        }
        let len = descriptor.byte_len()?;
        let payload = self
            .exec
            .allocate(PoolKind::Ram, len, descriptor.dtype.align())?;
        let record = match self.exec.allocate(
            PoolKind::Metadata,
            TensorDescriptor::RECORD_BYTES,
            TensorDescriptor::RECORD_ALIGN,
        ) {
            Ok(record) => record,
            Err(e) => {
                self.note_usage();
                self.exec.release(payload)?;
                return Err(e.into());
            }
        };

        let mut stored = descriptor.clone();
        // Offsets fit in u32: pool capacity is capped at u32::MAX.
        stored.offset = payload.offset() as u32;
        stored.encode_into(self.exec.bytes_mut(&record)?)?;
        tracing::trace!(
            name,
            offset = payload.offset(),
            len,
            record = record.offset(),
            "bound tensor"
        );
        self.bindings.insert(
            name.to_owned(),
            Binding {
                payload,
                descriptor: Some(record),
            },
        );
        self.note_usage();
        Ok(())
    }

    /// Whether a binding with this name exists.
    pub fn has_binding(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Number of bindings made so far in this run.
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Payload bytes of a binding.
    pub fn binding(&self, name: &str) -> Result<&[u8], StepError> {
        let b = self.lookup(name)?;
        Ok(self.exec.bytes(&b.payload)?)
    }

    /// Mutable payload bytes of a binding.
    pub fn binding_mut(&mut self, name: &str) -> Result<&mut [u8], StepError> {
        let b = self
            .bindings
            .get(name)
            .ok_or_else(|| StepError::UnknownBinding {
                name: name.to_owned(),
            })?;
        Ok(self.exec.bytes_mut(&b.payload)?)
    }

    /// Decode the descriptor record of a tensor binding.
    pub fn descriptor(&self, name: &str) -> Result<TensorDescriptor, StepError> {
        let b = self.lookup(name)?;
        let record = b
            .descriptor
            .as_ref()
            .ok_or_else(|| StepError::MissingDescriptor {
                name: name.to_owned(),
            })?;
        Ok(TensorDescriptor::decode(self.exec.bytes(record)?)?)
    }

    fn lookup(&self, name: &str) -> Result<&Binding, StepError> {
        self.bindings
            .get(name)
            .ok_or_else(|| StepError::UnknownBinding {
                name: name.to_owned(),
            })
    }

    // ── Scratch ─────────────────────────────────────────────────

    /// Allocate scratch space that lives until the end of the current step.
    pub fn scratch(
        &mut self,
        pool: PoolKind,
        size: usize,
        align: usize,
    ) -> Result<ScratchId, StepError> {
        let mark = self.exec.allocator_ref(pool).mark();
        let handle = self.exec.allocate(pool, size, align)?;
        self.scratch.push((mark, handle));
        self.note_usage();
        Ok(ScratchId(self.scratch.len() - 1))
    }

    /// Bytes of a scratch allocation.
    pub fn scratch_bytes(&self, id: ScratchId) -> Result<&[u8], StepError> {
        let (_, h) = self
            .scratch
            .get(id.0)
            .ok_or(StepError::UnknownScratch { index: id.0 })?;
        Ok(self.exec.bytes(h)?)
    }

    /// Mutable bytes of a scratch allocation.
    pub fn scratch_mut(&mut self, id: ScratchId) -> Result<&mut [u8], StepError> {
        let (_, h) = self
            .scratch
            .get(id.0)
            .ok_or(StepError::UnknownScratch { index: id.0 })?;
        Ok(self.exec.bytes_mut(h)?)
    }

    /// Number of live scratch allocations.
    pub fn scratch_len(&self) -> usize {
        self.scratch.len()
    }

    /// Release every scratch allocation in reverse order, restoring each
    /// pool's pre-allocation mark.
    ///
    /// Called by the model after every step. The stack is emptied and
    /// every mark restored even on error; the first error is returned.
    pub fn release_scratch(&mut self) -> Result<(), StepError> {
        let mut first = None;
        while let Some((mark, handle)) = self.scratch.pop() {
            let pool = handle.pool();
            let released = self.exec.release(handle);
            let unwound = self.exec.allocator(pool).unwind_to(mark);
            if let Err(e) = released.and(unwound) {
                first.get_or_insert(e);
            }
        }
        match first {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    // ── Region pairs ────────────────────────────────────────────

    /// Mutable bytes of two distinct regions at once, in argument order.
    ///
    /// Regions may live in different pools.
    pub fn split_mut(
        &mut self,
        a: Region<'_>,
        b: Region<'_>,
    ) -> Result<(&mut [u8], &mut [u8]), StepError> {
        let ha = resolve(&self.bindings, &self.scratch, a)?;
        let hb = resolve(&self.bindings, &self.scratch, b)?;
        if ha.pool() == hb.pool() {
            return Ok(self.exec.allocator(ha.pool()).split_mut(ha, hb)?);
        }
        let (meta, ram) = self.exec.pools_mut();
        if ha.pool() == PoolKind::Metadata {
            Ok((meta.bytes_mut(ha)?, ram.bytes_mut(hb)?))
        } else {
            Ok((ram.bytes_mut(ha)?, meta.bytes_mut(hb)?))
        }
    }

    // ── Caller tensors ──────────────────────────────────────────

    /// Bytes of a caller-supplied input tensor.
    pub fn input(&self, name: &str) -> Result<&'c [u8], StepError> {
        let inputs: &'c dyn TensorReader = self.inputs;
        inputs
            .tensor(name)
            .ok_or_else(|| StepError::MissingInput {
                name: name.to_owned(),
            })
    }

    /// Mutable bytes of a caller-supplied output tensor.
    pub fn output_mut(&mut self, name: &str) -> Result<&mut [u8], StepError> {
        self.outputs
            .tensor_mut(name)
            .ok_or_else(|| StepError::MissingOutput {
                name: name.to_owned(),
            })
    }

    /// Copy an input tensor into a binding of the same size.
    pub fn load_input(&mut self, input: &str, binding: &str) -> Result<(), StepError> {
        let src = self.input(input)?;
        let dst = self.binding_mut(binding)?;
        if dst.len() != src.len() {
            return Err(StepError::SizeMismatch {
                name: binding.to_owned(),
                expected: dst.len(),
                got: src.len(),
            });
        }
        dst.copy_from_slice(src);
        Ok(())
    }

    /// Copy a binding into an output tensor of the same size.
    pub fn store_output(&mut self, binding: &str, output: &str) -> Result<(), StepError> {
        let b = self
            .bindings
            .get(binding)
            .ok_or_else(|| StepError::UnknownBinding {
                name: binding.to_owned(),
            })?;
        let src = self.exec.bytes(&b.payload)?;
        let dst = self
            .outputs
            .tensor_mut(output)
            .ok_or_else(|| StepError::MissingOutput {
                name: output.to_owned(),
            })?;
        if dst.len() != src.len() {
            return Err(StepError::SizeMismatch {
                name: output.to_owned(),
                expected: dst.len(),
                got: src.len(),
            });
        }
        dst.copy_from_slice(src);
        Ok(())
    }

    // ── Raw access ──────────────────────────────────────────────

    /// The arena bound to `pool`, for steps that manage their own
    /// allocations. Such steps must leave the pool balanced.
    pub fn allocator(&mut self, pool: PoolKind) -> &mut dyn Allocator {
        self.exec.allocator(pool)
    }

    /// Current high-water mark of each pool.
    pub fn usage(&self) -> PoolBytes {
        self.exec.usage()
    }

    /// Highest usage observed by this context.
    pub fn peak(&self) -> PoolBytes {
        self.peak
    }

    /// Fold the current usage into [`peak`](Self::peak).
    pub fn note_usage(&mut self) {
        self.peak = self.peak.max(self.exec.usage());
    }
}
