//! Allocation handles and arena marks.
//!
//! An [`AllocationHandle`] is the caller's exclusive claim on a byte
//! range. It is neither `Copy` nor `Clone`: releasing consumes it, so a
//! range cannot be released twice through the same handle.

use std::fmt;

use kiln_core::{ArenaId, PoolKind};

/// Where an allocation sits in its arena's issue history.
///
/// `epoch` changes on every reset; `seq` is drawn from the arena's
/// monotonic clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Stamp {
    pub(crate) epoch: u32,
    pub(crate) seq: u64,
}

/// The most recent live allocation of an arena: its issue sequence
/// (`None` when the stack is empty) and its end offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct StackTop {
    pub(crate) seq: Option<u64>,
    pub(crate) end: u32,
}

impl StackTop {
    pub(crate) const EMPTY: Self = Self { seq: None, end: 0 };
}

/// Exclusive claim on `[offset, offset + size)` within one arena.
///
/// Carries the issuing arena's [`ArenaId`] so that a handle presented
/// to a different arena is rejected, plus its issue stamp and the stack
/// top it was pushed onto, so that release can be checked against the
/// allocation order rather than against offsets.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a handle without releasing it leaks the range until the arena is unwound or reset"]
pub struct AllocationHandle {
    arena: ArenaId,
    pool: PoolKind,
    offset: u32,
    size: u32,
    pub(crate) stamp: Stamp,
    pub(crate) below: StackTop,
}

impl AllocationHandle {
    pub(crate) fn new(
        arena: ArenaId,
        pool: PoolKind,
        offset: u32,
        size: u32,
        stamp: Stamp,
        below: StackTop,
    ) -> Self {
        Self {
            arena,
            pool,
            offset,
            size,
            stamp,
            below,
        }
    }

    /// The arena that issued this handle.
    pub fn arena(&self) -> ArenaId {
        self.arena
    }

    /// The pool this handle belongs to.
    pub fn pool(&self) -> PoolKind {
        self.pool
    }

    /// Start offset of the range (already aligned).
    pub fn offset(&self) -> usize {
        self.offset as usize
    }

    /// Size of the range in bytes.
    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// One past the last byte of the range.
    pub fn end(&self) -> usize {
        self.offset() + self.size()
    }

    /// Whether two handles' ranges share at least one byte.
    pub fn overlaps(&self, other: &AllocationHandle) -> bool {
        self.arena == other.arena && self.offset() < other.end() && other.offset() < self.end()
    }
}

impl fmt::Display for AllocationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AllocationHandle({}#{}, [{}, {}))",
            self.pool,
            self.arena,
            self.offset,
            self.end()
        )
    }
}

/// A saved arena state, restorable with
/// [`Allocator::unwind_to`](crate::Allocator::unwind_to).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaMark {
    pub(crate) arena: ArenaId,
    pub(crate) offset: u32,
    pub(crate) epoch: u32,
    /// Arena clock when the mark was taken.
    pub(crate) clock: u64,
    pub(crate) top: StackTop,
}

impl ArenaMark {
    pub(crate) fn new(arena: ArenaId, offset: usize, epoch: u32, clock: u64, top: StackTop) -> Self {
        Self {
            arena,
            offset: offset as u32,
            epoch,
            clock,
            top,
        }
    }

    /// The arena this mark was taken from.
    pub fn arena(&self) -> ArenaId {
        self.arena
    }

    /// The recorded high-water mark.
    pub fn offset(&self) -> usize {
        self.offset as usize
    }
}
