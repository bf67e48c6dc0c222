//! Scoped scratch acquisition with guaranteed reverse-order release.
//!
//! [`ScratchScope`] holds the arena's `&mut` borrow for its whole
//! lifetime, so nothing outside the scope can allocate from (or release
//! into) the arena while it is alive. When the scope is dropped or
//! finished the arena unwinds to the mark taken when the scope was
//! opened, alignment padding included, which discards everything the
//! scope issued at once.

use std::sync::atomic::{AtomicU64, Ordering};

use kiln_core::PoolKind;
use smallvec::SmallVec;

use crate::allocator::Allocator;
use crate::error::ArenaError;
use crate::handle::{AllocationHandle, ArenaMark};

/// Counter for unique scope tags.
static SCOPE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// An allocation within one [`ScratchScope`].
///
/// Carries the tag of the scope that issued it; any other scope refuses
/// it, even one whose own slots share the index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScratchSlot {
    scope: u64,
    index: usize,
}

/// A LIFO group of scratch allocations from one arena.
///
/// ```
/// use kiln_arena::{Allocator, CircularArena, ScratchScope};
/// use kiln_core::PoolKind;
///
/// let mut ram = CircularArena::<256>::new(PoolKind::Ram).unwrap();
/// {
///     let mut scope = ScratchScope::new(&mut ram);
///     let acc = scope.allocate(16, 4).unwrap();
///     scope.bytes_mut(acc).unwrap().fill(0);
/// }
/// assert_eq!(ram.high_water(), 0);
/// ```
pub struct ScratchScope<'a> {
    allocator: &'a mut dyn Allocator,
    tag: u64,
    mark: ArenaMark,
    handles: SmallVec<[AllocationHandle; 4]>,
}

impl<'a> ScratchScope<'a> {
    /// Open a scope at the arena's current high-water mark.
    pub fn new(allocator: &'a mut dyn Allocator) -> Self {
        let mark = allocator.mark();
        Self {
            allocator,
            tag: SCOPE_COUNTER.fetch_add(1, Ordering::Relaxed),
            mark,
            handles: SmallVec::new(),
        }
    }

    /// Allocate `size` bytes aligned to `align` within this scope.
    pub fn allocate(&mut self, size: usize, align: usize) -> Result<ScratchSlot, ArenaError> {
        let handle = self.allocator.allocate(size, align)?;
        self.handles.push(handle);
        Ok(ScratchSlot {
            scope: self.tag,
            index: self.handles.len() - 1,
        })
    }

    /// Look up a slot among `handles`, refusing slots of other scopes.
    fn lookup<'h>(
        handles: &'h [AllocationHandle],
        tag: u64,
        pool: PoolKind,
        slot: ScratchSlot,
    ) -> Result<&'h AllocationHandle, ArenaError> {
        if slot.scope != tag {
            return Err(ArenaError::ForeignHandle { pool });
        }
        handles
            .get(slot.index)
            .ok_or(ArenaError::ForeignHandle { pool })
    }

    /// Bytes of a slot issued by this scope.
    pub fn bytes(&self, slot: ScratchSlot) -> Result<&[u8], ArenaError> {
        let handle = Self::lookup(&self.handles, self.tag, self.allocator.pool(), slot)?;
        self.allocator.bytes(handle)
    }

    /// Mutable bytes of a slot issued by this scope.
    pub fn bytes_mut(&mut self, slot: ScratchSlot) -> Result<&mut [u8], ArenaError> {
        let handle = Self::lookup(&self.handles, self.tag, self.allocator.pool(), slot)?;
        self.allocator.bytes_mut(handle)
    }

    /// Mutable bytes of two distinct slots at once, in argument order.
    pub fn pair_mut(
        &mut self,
        a: ScratchSlot,
        b: ScratchSlot,
    ) -> Result<(&mut [u8], &mut [u8]), ArenaError> {
        let pool = self.allocator.pool();
        let ha = Self::lookup(&self.handles, self.tag, pool, a)?;
        let hb = Self::lookup(&self.handles, self.tag, pool, b)?;
        self.allocator.split_mut(ha, hb)
    }

    /// Open a nested scope on the same arena.
    ///
    /// The outer scope is unusable until the nested one is dropped,
    /// which keeps release order strictly LIFO.
    pub fn nested(&mut self) -> ScratchScope<'_> {
        ScratchScope::new(&mut *self.allocator)
    }

    /// Bytes consumed above the scope's opening mark, padding included.
    pub fn used(&self) -> usize {
        self.allocator.high_water() - self.mark.offset()
    }

    /// Number of live allocations in this scope.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the scope has issued no allocations.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Unwind to the opening mark and close the scope, surfacing any
    /// failure.
    pub fn finish(mut self) -> Result<(), ArenaError> {
        self.unwind()
    }

    fn unwind(&mut self) -> Result<(), ArenaError> {
        self.handles.clear();
        self.allocator.unwind_to(self.mark)
    }
}

impl Drop for ScratchScope<'_> {
    fn drop(&mut self) {
        let result = self.unwind();
        debug_assert!(
            result.is_ok(),
            "scratch scope failed to unwind: {result:?}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::CircularArena;

    fn ram() -> CircularArena<256> {
        CircularArena::<256>::new(PoolKind::Ram).unwrap()
    }

    #[test]
    fn drop_restores_opening_mark_including_padding() {
        let mut arena = ram();
        let _base = arena.allocate(3, 1).unwrap();
        {
            let mut scope = ScratchScope::new(&mut arena);
            scope.allocate(10, 8).unwrap();
            scope.allocate(7, 16).unwrap();
            assert_eq!(scope.len(), 2);
            assert_eq!(scope.used(), 32 + 7 - 3);
        }
        assert_eq!(arena.high_water(), 3);
        assert!(arena.allocate(1, 1).is_ok());
    }

    #[test]
    fn finish_with_padded_slots_succeeds() {
        let mut arena = ram();
        let _base = arena.allocate(3, 1).unwrap();
        let mut scope = ScratchScope::new(&mut arena);
        scope.allocate(10, 8).unwrap();
        scope.allocate(7, 16).unwrap();
        scope.finish().unwrap();
        assert_eq!(arena.high_water(), 3);
    }

    #[test]
    fn finish_reports_success() {
        let mut arena = ram();
        let mut scope = ScratchScope::new(&mut arena);
        scope.allocate(64, 4).unwrap();
        scope.finish().unwrap();
        assert_eq!(arena.high_water(), 0);
    }

    #[test]
    fn out_of_space_inside_scope_still_unwinds() {
        let mut arena = ram();
        {
            let mut scope = ScratchScope::new(&mut arena);
            scope.allocate(200, 1).unwrap();
            let err = scope.allocate(100, 1).unwrap_err();
            assert!(matches!(err, ArenaError::OutOfSpace { requested: 100, .. }));
        }
        assert_eq!(arena.high_water(), 0);
    }

    #[test]
    fn nested_scopes_release_inner_first() {
        let mut arena = ram();
        let mut outer = ScratchScope::new(&mut arena);
        let a = outer.allocate(8, 1).unwrap();
        {
            let mut inner = outer.nested();
            inner.allocate(16, 1).unwrap();
            assert_eq!(inner.used(), 16);
        }
        assert_eq!(outer.used(), 8);
        outer.bytes_mut(a).unwrap().fill(9);
        assert_eq!(outer.bytes(a).unwrap(), &[9; 8]);
        outer.finish().unwrap();
        assert_eq!(arena.high_water(), 0);
    }

    #[test]
    fn pair_mut_gives_two_buffers() {
        let mut arena = ram();
        let mut scope = ScratchScope::new(&mut arena);
        let a = scope.allocate(4, 1).unwrap();
        let b = scope.allocate(4, 1).unwrap();
        let (x, y) = scope.pair_mut(a, b).unwrap();
        x.copy_from_slice(&[1, 2, 3, 4]);
        y.copy_from_slice(x);
        assert_eq!(scope.bytes(b).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn slot_from_another_scope_is_rejected() {
        let mut other_arena = ram();
        let foreign = {
            let mut other = ScratchScope::new(&mut other_arena);
            other.allocate(1, 1).unwrap();
            let slot = other.allocate(1, 1).unwrap();
            slot
        };
        let mut arena = ram();
        let scope = ScratchScope::new(&mut arena);
        assert!(matches!(
            scope.bytes(foreign),
            Err(ArenaError::ForeignHandle { .. })
        ));
    }

    #[test]
    fn slot_from_inner_scope_is_rejected_by_outer() {
        let mut arena = ram();
        let mut outer = ScratchScope::new(&mut arena);
        let inner_slot = {
            let mut inner = outer.nested();
            inner.allocate(4, 1).unwrap()
        };
        let own = outer.allocate(8, 1).unwrap();
        assert_eq!(own.index, inner_slot.index);
        assert!(matches!(
            outer.bytes(inner_slot),
            Err(ArenaError::ForeignHandle { .. })
        ));
        assert!(matches!(
            outer.pair_mut(own, inner_slot),
            Err(ArenaError::ForeignHandle { .. })
        ));
        assert_eq!(outer.bytes(own).unwrap().len(), 8);
    }

    #[test]
    fn slot_with_smaller_index_from_same_arena_is_rejected() {
        let mut arena = ram();
        let earlier = {
            let mut first = ScratchScope::new(&mut arena);
            first.allocate(2, 1).unwrap()
        };
        let mut second = ScratchScope::new(&mut arena);
        second.allocate(2, 1).unwrap();
        second.allocate(2, 1).unwrap();
        assert!(matches!(
            second.bytes_mut(earlier),
            Err(ArenaError::ForeignHandle { .. })
        ));
    }
}
