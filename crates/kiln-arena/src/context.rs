//! The execution context: the binding from pool to active arena.
//!
//! [`ExecutionContext`] replaces a process-wide default allocator with a
//! value threaded explicitly through calls. Both pools are installed
//! together and replaced together; a half-installed context cannot be
//! observed. Exclusive `&mut` access enforces the single-owner,
//! no-reentry assumption at compile time.

use std::fmt;

use kiln_core::{PoolBytes, PoolKind};

use crate::allocator::Allocator;
use crate::config::PoolCapacities;
use crate::error::ArenaError;
use crate::handle::{AllocationHandle, ArenaMark};
use crate::scoped::ScratchScope;

/// High-water marks of both pools, restorable with
/// [`ExecutionContext::unwind_to`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextMark {
    /// Metadata pool mark.
    pub metadata: ArenaMark,
    /// Ram pool mark.
    pub ram: ArenaMark,
}

impl ContextMark {
    /// Mark of the given pool.
    pub fn for_pool(&self, pool: PoolKind) -> ArenaMark {
        match pool {
            PoolKind::Metadata => self.metadata,
            PoolKind::Ram => self.ram,
        }
    }
}

/// Active metadata and ram arenas for one model evaluation.
pub struct ExecutionContext<'a> {
    metadata: &'a mut dyn Allocator,
    ram: &'a mut dyn Allocator,
}

fn check_pool(expected: PoolKind, arena: &dyn Allocator) -> Result<(), ArenaError> {
    if arena.pool() != expected {
        return Err(ArenaError::PoolMismatch {
            expected,
            found: arena.pool(),
        });
    }
    Ok(())
}

impl<'a> ExecutionContext<'a> {
    /// Install a metadata arena and a ram arena.
    ///
    /// Fails with [`ArenaError::PoolMismatch`] if either arena serves the
    /// wrong pool.
    pub fn new(
        metadata: &'a mut dyn Allocator,
        ram: &'a mut dyn Allocator,
    ) -> Result<Self, ArenaError> {
        check_pool(PoolKind::Metadata, metadata)?;
        check_pool(PoolKind::Ram, ram)?;
        tracing::debug!(
            metadata_capacity = metadata.capacity(),
            ram_capacity = ram.capacity(),
            "installed arena pair"
        );
        Ok(Self { metadata, ram })
    }

    /// Replace both arenas at once.
    ///
    /// Both are validated before either binding changes, so on error the
    /// previous pair stays installed.
    pub fn install(
        &mut self,
        metadata: &'a mut dyn Allocator,
        ram: &'a mut dyn Allocator,
    ) -> Result<(), ArenaError> {
        check_pool(PoolKind::Metadata, metadata)?;
        check_pool(PoolKind::Ram, ram)?;
        tracing::debug!(
            metadata_capacity = metadata.capacity(),
            ram_capacity = ram.capacity(),
            "replaced arena pair"
        );
        self.metadata = metadata;
        self.ram = ram;
        Ok(())
    }

    /// The arena bound to `pool`.
    pub fn allocator(&mut self, pool: PoolKind) -> &mut dyn Allocator {
        match pool {
            PoolKind::Metadata => &mut *self.metadata,
            PoolKind::Ram => &mut *self.ram,
        }
    }

    /// Shared view of the arena bound to `pool`.
    pub fn allocator_ref(&self, pool: PoolKind) -> &dyn Allocator {
        match pool {
            PoolKind::Metadata => &*self.metadata,
            PoolKind::Ram => &*self.ram,
        }
    }

    /// Both arenas at once: `(metadata, ram)`.
    pub fn pools_mut(&mut self) -> (&mut dyn Allocator, &mut dyn Allocator) {
        (&mut *self.metadata, &mut *self.ram)
    }

    /// Allocate from the arena bound to `pool`.
    pub fn allocate(
        &mut self,
        pool: PoolKind,
        size: usize,
        align: usize,
    ) -> Result<AllocationHandle, ArenaError> {
        self.allocator(pool).allocate(size, align)
    }

    /// Release a handle into the arena of its pool.
    pub fn release(&mut self, handle: AllocationHandle) -> Result<(), ArenaError> {
        self.allocator(handle.pool()).release(handle)
    }

    /// Bytes of a live handle.
    pub fn bytes(&self, handle: &AllocationHandle) -> Result<&[u8], ArenaError> {
        self.allocator_ref(handle.pool()).bytes(handle)
    }

    /// Mutable bytes of a live handle.
    pub fn bytes_mut(&mut self, handle: &AllocationHandle) -> Result<&mut [u8], ArenaError> {
        self.allocator(handle.pool()).bytes_mut(handle)
    }

    /// Open a scratch scope on the arena bound to `pool`.
    pub fn scratch(&mut self, pool: PoolKind) -> ScratchScope<'_> {
        ScratchScope::new(self.allocator(pool))
    }

    /// Current marks of both pools.
    pub fn mark(&self) -> ContextMark {
        ContextMark {
            metadata: self.metadata.mark(),
            ram: self.ram.mark(),
        }
    }

    /// Restore both pools to an earlier [`ContextMark`].
    ///
    /// Both marks are checked before either pool moves.
    pub fn unwind_to(&mut self, mark: ContextMark) -> Result<(), ArenaError> {
        for pool in PoolKind::ALL {
            self.allocator_ref(pool).validate_mark(&mark.for_pool(pool))?;
        }
        self.metadata.unwind_to(mark.metadata)?;
        self.ram.unwind_to(mark.ram)
    }

    /// Reset both pools to empty.
    pub fn reset_all(&mut self) {
        self.metadata.reset();
        self.ram.reset();
    }

    /// Current high-water mark of each pool.
    pub fn usage(&self) -> PoolBytes {
        PoolBytes::new(self.metadata.high_water(), self.ram.high_water())
    }

    /// Lifetime peak of each pool.
    pub fn peak(&self) -> PoolBytes {
        PoolBytes::new(self.metadata.peak(), self.ram.peak())
    }

    /// Capacity of each installed arena.
    pub fn capacities(&self) -> PoolCapacities {
        PoolCapacities::new(self.metadata.capacity(), self.ram.capacity())
    }
}

impl fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("usage", &self.usage())
            .field("capacities", &self.capacities())
            .finish()
    }
}
