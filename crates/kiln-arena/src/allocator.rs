//! The object-safe [`Allocator`] trait.
//!
//! The execution context stores arenas as `&mut dyn Allocator`, so the
//! same step logic runs unchanged against arenas of any capacity.

use kiln_core::{ArenaId, PoolKind};

use crate::error::ArenaError;
use crate::handle::{AllocationHandle, ArenaMark};

/// Occupancy state of an arena, derived from its high-water mark.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArenaState {
    /// High-water mark is zero.
    Empty,
    /// High-water mark is strictly between zero and capacity.
    Active,
    /// High-water mark equals capacity.
    Full,
}

/// A fixed-capacity stack-discipline byte allocator.
///
/// # Contract
///
/// - `allocate` rounds the high-water mark up to `align`, reserves
///   `size` bytes there and never mutates anything on failure.
/// - `release` accepts only the most recent live allocation, by issue
///   order rather than by offset, and moves the high-water mark back to
///   that allocation's start offset.
/// - `reset` moves the high-water mark to zero, invalidating every
///   outstanding handle and mark. A handle issued before a reset never
///   aliases one issued after it.
/// - Allocated bytes are uninitialized by contract.
///
/// # Object safety
///
/// This trait is object-safe; the execution context holds
/// `&mut dyn Allocator` for each pool.
pub trait Allocator {
    /// Unique identity of this arena instance.
    fn id(&self) -> ArenaId;

    /// The pool this arena serves.
    fn pool(&self) -> PoolKind;

    /// Total capacity in bytes.
    fn capacity(&self) -> usize;

    /// Current high-water mark.
    fn high_water(&self) -> usize;

    /// Largest high-water mark observed since construction.
    fn peak(&self) -> usize;

    /// Reserve `size` bytes aligned to `align` (a non-zero power of two).
    fn allocate(&mut self, size: usize, align: usize) -> Result<AllocationHandle, ArenaError>;

    /// Release the most recent live allocation.
    fn release(&mut self, handle: AllocationHandle) -> Result<(), ArenaError>;

    /// Move the high-water mark back to zero.
    fn reset(&mut self);

    /// Snapshot the current high-water mark.
    fn mark(&self) -> ArenaMark;

    /// Check that `mark` could be restored by [`unwind_to`](Self::unwind_to)
    /// without changing anything.
    ///
    /// Fails with [`ArenaError::ForeignHandle`] for another arena's mark,
    /// [`ArenaError::StaleMark`] if a release, unwind or reset has since
    /// discarded state the mark depends on, and
    /// [`ArenaError::InvalidUnwind`] if it lies above the high-water mark.
    fn validate_mark(&self, mark: &ArenaMark) -> Result<(), ArenaError>;

    /// Restore the arena to an earlier snapshot, invalidating every
    /// handle and mark issued after it.
    ///
    /// Fails, leaving the arena unchanged, wherever
    /// [`validate_mark`](Self::validate_mark) fails.
    fn unwind_to(&mut self, mark: ArenaMark) -> Result<(), ArenaError>;

    /// Bytes covered by a live handle.
    fn bytes(&self, handle: &AllocationHandle) -> Result<&[u8], ArenaError>;

    /// Mutable bytes covered by a live handle.
    fn bytes_mut(&mut self, handle: &AllocationHandle) -> Result<&mut [u8], ArenaError>;

    /// Mutable bytes of two distinct live handles at once, in argument order.
    fn split_mut(
        &mut self,
        a: &AllocationHandle,
        b: &AllocationHandle,
    ) -> Result<(&mut [u8], &mut [u8]), ArenaError>;

    /// Bytes left above the high-water mark.
    fn remaining(&self) -> usize {
        self.capacity() - self.high_water()
    }

    /// Occupancy state.
    fn state(&self) -> ArenaState {
        match self.high_water() {
            0 => ArenaState::Empty,
            h if h == self.capacity() => ArenaState::Full,
            _ => ArenaState::Active,
        }
    }
}
