//! The circular bump arena.
//!
//! A [`CircularArena`] is a `[u8; CAPACITY]` buffer with a single
//! high-water mark. Allocation bumps the mark; release and unwind move
//! it back. Liveness is tracked with an epoch, a monotonic issue clock,
//! the current stack top and one interval of discarded issue numbers,
//! so allocate and release are O(1) with O(1) space overhead.

use std::fmt;

use kiln_core::{ArenaId, PoolKind};

use crate::allocator::Allocator;
use crate::config::validate_capacity;
use crate::error::ArenaError;
use crate::handle::{AllocationHandle, ArenaMark, StackTop, Stamp};

/// Round `value` up to the next multiple of `align` (a power of two).
///
/// Returns `None` on overflow.
fn align_up(value: usize, align: usize) -> Option<usize> {
    let mask = align - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

/// Fixed-capacity arena with bump allocation and stack-order release.
///
/// `CAPACITY` is the pool size chosen offline. The buffer is inline, so
/// large arenas should live in a `static`-like owner or a `Box` rather
/// than on a small stack.
///
/// ```
/// use kiln_arena::{Allocator, CircularArena};
/// use kiln_core::PoolKind;
///
/// let mut ram = CircularArena::<1024>::new(PoolKind::Ram).unwrap();
/// let a = ram.allocate(100, 8).unwrap();
/// let b = ram.allocate(50, 8).unwrap();
/// assert_eq!(b.offset(), 104);
/// ram.release(b).unwrap();
/// ram.release(a).unwrap();
/// assert_eq!(ram.high_water(), 0);
/// ```
pub struct CircularArena<const CAPACITY: usize> {
    id: ArenaId,
    pool: PoolKind,
    buf: [u8; CAPACITY],
    /// Bump pointer: first byte above every live allocation.
    high_water: usize,
    peak: usize,
    /// Bumped by every reset.
    epoch: u32,
    /// Next issue number. Also ticks on release and unwind so that marks
    /// taken afterwards never fall inside `dead`.
    clock: u64,
    top: StackTop,
    /// Half-open range of issue numbers discarded in this epoch.
    dead: (u64, u64),
}

impl<const CAPACITY: usize> CircularArena<CAPACITY> {
    /// Create an empty arena serving `pool`.
    ///
    /// Fails with [`ArenaError::Configuration`] if `CAPACITY` is zero or
    /// above [`MAX_POOL_CAPACITY`](crate::MAX_POOL_CAPACITY).
    pub fn new(pool: PoolKind) -> Result<Self, ArenaError> {
        validate_capacity(pool, CAPACITY)?;
        Ok(Self {
            id: ArenaId::next(),
            pool,
            buf: [0; CAPACITY],
            high_water: 0,
            peak: 0,
            epoch: 0,
            clock: 0,
            top: StackTop::EMPTY,
            dead: (0, 0),
        })
    }

    fn check_owner(&self, arena: ArenaId) -> Result<(), ArenaError> {
        if arena != self.id {
            return Err(ArenaError::ForeignHandle { pool: self.pool });
        }
        Ok(())
    }

    fn is_dead(&self, seq: u64) -> bool {
        self.dead.0 <= seq && seq < self.dead.1
    }

    fn stale(&self, handle: &AllocationHandle) -> ArenaError {
        ArenaError::StaleHandle {
            pool: self.pool,
            handle_end: handle.end(),
            high_water: self.high_water,
        }
    }

    /// Owner, epoch and issue number checks shared by release and access.
    fn check_issued(&self, handle: &AllocationHandle) -> Result<(), ArenaError> {
        self.check_owner(handle.arena())?;
        if handle.stamp.epoch != self.epoch || self.is_dead(handle.stamp.seq) {
            return Err(self.stale(handle));
        }
        Ok(())
    }

    fn check_live(&self, handle: &AllocationHandle) -> Result<(), ArenaError> {
        self.check_issued(handle)?;
        if handle.end() > self.high_water {
            return Err(self.stale(handle));
        }
        Ok(())
    }

    /// Discard issue numbers `from..clock`, then tick the clock.
    fn bury(&mut self, from: u64) {
        self.dead = if from <= self.dead.1 {
            (self.dead.0.min(from), self.clock)
        } else {
            (from, self.clock)
        };
        self.clock += 1;
    }
}

impl<const CAPACITY: usize> Allocator for CircularArena<CAPACITY> {
    fn id(&self) -> ArenaId {
        self.id
    }

    fn pool(&self) -> PoolKind {
        self.pool
    }

    fn capacity(&self) -> usize {
        CAPACITY
    }

    fn high_water(&self) -> usize {
        self.high_water
    }

    fn peak(&self) -> usize {
        self.peak
    }

    fn allocate(&mut self, size: usize, align: usize) -> Result<AllocationHandle, ArenaError> {
        if align == 0 || !align.is_power_of_two() {
            return Err(ArenaError::InvalidAlignment { align });
        }
        let out_of_space = || ArenaError::OutOfSpace {
            pool: self.pool,
            requested: size,
            align,
            high_water: self.high_water,
            capacity: CAPACITY,
        };
        let start = align_up(self.high_water, align).ok_or_else(out_of_space)?;
        let end = start
            .checked_add(size)
            .filter(|&end| end <= CAPACITY)
            .ok_or_else(|| {
                let err = out_of_space();
                tracing::debug!(pool = %self.pool, size, align, high_water = self.high_water, "arena out of space");
                err
            })?;

        let stamp = Stamp {
            epoch: self.epoch,
            seq: self.clock,
        };
        self.clock += 1;
        self.high_water = end;
        self.peak = self.peak.max(end);
        // start <= end <= CAPACITY <= u32::MAX, checked at construction.
        let handle = AllocationHandle::new(
            self.id,
            self.pool,
            start as u32,
            size as u32,
            stamp,
            self.top,
        );
        self.top = StackTop {
            seq: Some(stamp.seq),
            end: end as u32,
        };
        Ok(handle)
    }

    fn release(&mut self, handle: AllocationHandle) -> Result<(), ArenaError> {
        self.check_issued(&handle)?;
        if self.top.seq != Some(handle.stamp.seq) {
            return Err(ArenaError::InvalidRelease {
                pool: self.pool,
                expected_end: self.top.end as usize,
                handle_end: handle.end(),
            });
        }
        self.high_water = handle.offset();
        self.top = handle.below;
        self.bury(handle.stamp.seq);
        Ok(())
    }

    fn reset(&mut self) {
        self.high_water = 0;
        self.epoch = self.epoch.wrapping_add(1);
        self.top = StackTop::EMPTY;
        self.dead = (0, 0);
    }

    fn mark(&self) -> ArenaMark {
        ArenaMark::new(self.id, self.high_water, self.epoch, self.clock, self.top)
    }

    fn validate_mark(&self, mark: &ArenaMark) -> Result<(), ArenaError> {
        self.check_owner(mark.arena())?;
        let discarded = self.dead.0 < mark.clock && mark.clock <= self.dead.1;
        if mark.epoch != self.epoch || discarded {
            return Err(ArenaError::StaleMark {
                pool: self.pool,
                mark: mark.offset(),
            });
        }
        if mark.offset() > self.high_water {
            return Err(ArenaError::InvalidUnwind {
                pool: self.pool,
                mark: mark.offset(),
                high_water: self.high_water,
            });
        }
        Ok(())
    }

    fn unwind_to(&mut self, mark: ArenaMark) -> Result<(), ArenaError> {
        self.validate_mark(&mark)?;
        self.bury(mark.clock);
        self.high_water = mark.offset();
        self.top = mark.top;
        Ok(())
    }

    fn bytes(&self, handle: &AllocationHandle) -> Result<&[u8], ArenaError> {
        self.check_live(handle)?;
        Ok(&self.buf[handle.offset()..handle.end()])
    }

    fn bytes_mut(&mut self, handle: &AllocationHandle) -> Result<&mut [u8], ArenaError> {
        self.check_live(handle)?;
        Ok(&mut self.buf[handle.offset()..handle.end()])
    }

    fn split_mut(
        &mut self,
        a: &AllocationHandle,
        b: &AllocationHandle,
    ) -> Result<(&mut [u8], &mut [u8]), ArenaError> {
        self.check_live(a)?;
        self.check_live(b)?;
        if a.overlaps(b) {
            return Err(ArenaError::AliasedHandles { pool: self.pool });
        }
        // An empty range may start inside or at the start of the other
        // range, so it never picks the split point.
        let empty: &mut [u8] = &mut [];
        if a.size() == 0 {
            return Ok((empty, &mut self.buf[b.offset()..b.end()]));
        }
        if b.size() == 0 {
            return Ok((&mut self.buf[a.offset()..a.end()], empty));
        }
        let (first, second, swapped) = if a.offset() < b.offset() {
            (a, b, false)
        } else {
            (b, a, true)
        };
        let (lo, hi) = self.buf.split_at_mut(second.offset());
        let first_bytes = &mut lo[first.offset()..first.end()];
        let second_bytes = &mut hi[..second.size()];
        if swapped {
            Ok((second_bytes, first_bytes))
        } else {
            Ok((first_bytes, second_bytes))
        }
    }
}

impl<const CAPACITY: usize> fmt::Debug for CircularArena<CAPACITY> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircularArena")
            .field("id", &self.id)
            .field("pool", &self.pool)
            .field("capacity", &CAPACITY)
            .field("high_water", &self.high_water)
            .field("peak", &self.peak)
            .field("epoch", &self.epoch)
            .finish()
    }
}
