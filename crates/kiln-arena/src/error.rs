//! Arena-specific error types.

use std::error::Error;
use std::fmt;

use kiln_core::PoolKind;

/// Errors that can occur during arena operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// Pool capacity is zero or above [`MAX_POOL_CAPACITY`](crate::MAX_POOL_CAPACITY).
    ///
    /// Detected at construction; not recoverable.
    Configuration {
        /// The pool being configured.
        pool: PoolKind,
        /// The rejected capacity in bytes.
        capacity: usize,
        /// The largest accepted capacity in bytes.
        max: usize,
    },
    /// Alignment is zero or not a power of two.
    InvalidAlignment {
        /// The rejected alignment.
        align: usize,
    },
    /// The request does not fit between the aligned high-water mark and capacity.
    OutOfSpace {
        /// The pool that ran out.
        pool: PoolKind,
        /// Number of bytes requested.
        requested: usize,
        /// Requested alignment.
        align: usize,
        /// High-water mark at the time of the request.
        high_water: usize,
        /// Total pool capacity in bytes.
        capacity: usize,
    },
    /// A release that is not the most recent live allocation.
    InvalidRelease {
        /// The pool the handle belongs to.
        pool: PoolKind,
        /// End offset a valid release must have (the current high-water mark).
        expected_end: usize,
        /// End offset of the presented handle.
        handle_end: usize,
    },
    /// A handle, mark or slot issued by a different arena or scope.
    ForeignHandle {
        /// The pool of the arena that rejected it.
        pool: PoolKind,
    },
    /// A handle that is no longer live: released, unwound past, or
    /// issued before the last reset.
    StaleHandle {
        /// The pool the handle belongs to.
        pool: PoolKind,
        /// End offset of the handle.
        handle_end: usize,
        /// Current high-water mark.
        high_water: usize,
    },
    /// A mark whose state was discarded by a later release, unwind or
    /// reset.
    StaleMark {
        /// The pool the mark belongs to.
        pool: PoolKind,
        /// Offset recorded in the mark.
        mark: usize,
    },
    /// Unwinding to a mark above the current high-water mark.
    InvalidUnwind {
        /// The pool being unwound.
        pool: PoolKind,
        /// Offset recorded in the mark.
        mark: usize,
        /// Current high-water mark.
        high_water: usize,
    },
    /// Two handles passed where distinct ranges were required overlap.
    AliasedHandles {
        /// The pool both handles belong to.
        pool: PoolKind,
    },
    /// An arena was installed for the wrong pool.
    PoolMismatch {
        /// The pool the binding slot expects.
        expected: PoolKind,
        /// The pool the arena serves.
        found: PoolKind,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration {
                pool,
                capacity,
                max,
            } => {
                write!(
                    f,
                    "{pool} pool capacity {capacity} bytes is invalid (must be 1..={max})"
                )
            }
            Self::InvalidAlignment { align } => {
                write!(f, "alignment {align} is not a non-zero power of two")
            }
            Self::OutOfSpace {
                pool,
                requested,
                align,
                high_water,
                capacity,
            } => {
                write!(
                    f,
                    "{pool} pool out of space: requested {requested} bytes (align {align}) \
                     at high-water {high_water}, capacity {capacity} bytes"
                )
            }
            Self::InvalidRelease {
                pool,
                expected_end,
                handle_end,
            } => {
                write!(
                    f,
                    "{pool} pool release out of order: handle ends at {handle_end}, \
                     most recent allocation ends at {expected_end}"
                )
            }
            Self::ForeignHandle { pool } => {
                write!(f, "handle was not issued by this {pool} arena")
            }
            Self::StaleHandle {
                pool,
                handle_end,
                high_water,
            } => {
                write!(
                    f,
                    "stale {pool} handle: ends at {handle_end}, high-water {high_water}"
                )
            }
            Self::StaleMark { pool, mark } => {
                write!(f, "stale {pool} mark at {mark}: the arena moved below it")
            }
            Self::InvalidUnwind {
                pool,
                mark,
                high_water,
            } => {
                write!(
                    f,
                    "cannot unwind {pool} pool to {mark}: above high-water {high_water}"
                )
            }
            Self::AliasedHandles { pool } => {
                write!(f, "overlapping {pool} handles passed as distinct ranges")
            }
            Self::PoolMismatch { expected, found } => {
                write!(f, "expected a {expected} arena, got a {found} arena")
            }
        }
    }
}

impl Error for ArenaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_space_names_pool_and_size() {
        let err = ArenaError::OutOfSpace {
            pool: PoolKind::Ram,
            requested: 30,
            align: 1,
            high_water: 1004,
            capacity: 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("ram"));
        assert!(msg.contains("30 bytes"));
    }
}
